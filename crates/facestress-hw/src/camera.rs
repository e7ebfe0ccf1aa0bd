//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, FrameError};
use facestress_core::media::{CameraConstraints, DeviceError, FacingMode, MediaDevices, MediaStream};
use image::RgbImage;
use std::io;
use std::path::Path;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Frames skipped for being dark before a capture settles for the last one.
const MAX_DARK_SKIPS: usize = 8;
/// Fraction of near-black pixels that makes a frame dark.
const DARK_THRESHOLD: f32 = 0.95;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl From<CameraError> for DeviceError {
    fn from(e: CameraError) -> Self {
        match e {
            CameraError::DeviceNotFound(p) => DeviceError::NotFound(p),
            CameraError::PermissionDenied(p) => DeviceError::PermissionDenied(p),
            CameraError::DeviceBusy => DeviceError::Busy,
            CameraError::FormatNegotiationFailed(m) => DeviceError::FormatNegotiation(m),
            CameraError::StreamingNotSupported => {
                DeviceError::FormatNegotiation("device cannot capture video".into())
            }
            CameraError::CaptureFailed(m) => DeviceError::Capture(m),
            CameraError::Frame(f) => DeviceError::Capture(f.to_string()),
        }
    }
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed.
    Yuyv,
    /// Motion-JPEG, one JPEG per buffer.
    Mjpeg,
    /// 8-bit grayscale.
    Grey,
    /// 16-bit little-endian grayscale.
    Y16,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"MJPG" => Some(Self::Mjpeg),
            b"GREY" => Some(Self::Grey),
            b"Y16 " | b"Y16\0" => Some(Self::Y16),
            _ => None,
        }
    }
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 device and negotiate a format as close to `width`x`height` as the driver allows.
    pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => {
                CameraError::PermissionDenied(format!("{device_path}: {e}"))
            }
            _ if e.raw_os_error() == Some(libc::EBUSY) => CameraError::DeviceBusy,
            _ => CameraError::DeviceNotFound(format!("{device_path}: {e}")),
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = PixelFormat::from_fourcc(fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, MJPG, GREY, or Y16)"
            ))
        })?;

        tracing::info!(
            requested_width = width,
            requested_height = height,
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device,
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            fourcc,
            pixel_format,
        })
    }

    fn stream(&self) -> Result<MmapStream<'_>, CameraError> {
        MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4)
            .map_err(|e| CameraError::CaptureFailed(format!("failed to create mmap stream: {e}")))
    }

    /// Dequeue and discard `count` frames so exposure can settle.
    fn warmup(&self, stream: &mut MmapStream<'_>, count: usize) -> Result<(), CameraError> {
        for _ in 0..count {
            stream
                .next()
                .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
        }
        tracing::debug!(count, "discarded warmup frames");
        Ok(())
    }

    /// Capture one RGB frame from the running stream, skipping dark frames.
    fn capture_rgb(&self, stream: &mut MmapStream<'_>) -> Result<RgbImage, CameraError> {
        first_lit_frame(MAX_DARK_SKIPS, || {
            let (buf, meta) = stream
                .next()
                .map_err(|e| CameraError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;
            let sequence = meta.sequence;
            let rgb = self.buf_to_rgb(buf)?;
            tracing::trace!(seq = sequence, "frame dequeued");
            Ok(rgb)
        })
    }

    fn buf_to_rgb(&self, buf: &[u8]) -> Result<RgbImage, CameraError> {
        let (w, h) = (self.width, self.height);
        match self.pixel_format {
            PixelFormat::Yuyv => Ok(frame::yuyv_to_rgb(buf, w, h)?),
            PixelFormat::Grey => Ok(frame::grayscale_to_rgb(buf, w, h)?),
            PixelFormat::Y16 => {
                let gray = frame::y16_to_grayscale(buf, w, h)?;
                Ok(frame::grayscale_to_rgb(&gray, w, h)?)
            }
            PixelFormat::Mjpeg => {
                let decoded = image::load_from_memory_with_format(buf, image::ImageFormat::Jpeg)
                    .map_err(|e| CameraError::CaptureFailed(format!("MJPG decode failed: {e}")))?
                    .to_rgb8();
                if decoded.dimensions() != (w, h) {
                    return Err(CameraError::CaptureFailed(format!(
                        "MJPG frame is {}x{}, expected {w}x{h}",
                        decoded.width(),
                        decoded.height()
                    )));
                }
                Ok(decoded)
            }
        }
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

/// Pull frames until one is not dark, allowing `max_skips` dark ones.
///
/// When every frame is dark the last one is returned; the service decides
/// whether a face is visible.
fn first_lit_frame(
    max_skips: usize,
    mut next: impl FnMut() -> Result<RgbImage, CameraError>,
) -> Result<RgbImage, CameraError> {
    let mut skipped = 0usize;
    loop {
        let rgb = next()?;
        if !frame::is_dark_frame(&frame::luma(&rgb), DARK_THRESHOLD) {
            if skipped > 0 {
                tracing::debug!(skipped, "skipped dark frames");
            }
            return Ok(rgb);
        }
        if skipped == max_skips {
            tracing::warn!(skipped, "every frame was dark; using the last one");
            return Ok(rgb);
        }
        skipped += 1;
    }
}

/// Opens a fixed V4L2 device for every live-video request.
pub struct V4lMediaDevices {
    device_path: String,
    warmup_frames: usize,
}

impl V4lMediaDevices {
    pub fn new(device_path: impl Into<String>, warmup_frames: usize) -> Self {
        Self {
            device_path: device_path.into(),
            warmup_frames,
        }
    }
}

impl MediaDevices for V4lMediaDevices {
    type Stream = V4lStream;

    async fn open_video(&mut self, constraints: &CameraConstraints) -> Result<V4lStream, DeviceError> {
        if constraints.facing != FacingMode::User {
            tracing::debug!(
                facing = ?constraints.facing,
                device = %self.device_path,
                "V4L2 has no facing mode; using configured device"
            );
        }
        V4lStream::spawn(
            self.device_path.clone(),
            (constraints.ideal_width, constraints.ideal_height),
            self.warmup_frames,
        )
        .await
    }
}

/// Messages sent from the async side to the camera thread.
struct GrabRequest {
    reply: oneshot::Sender<Result<RgbImage, CameraError>>,
}

/// A live V4L2 handle. The device is owned by a dedicated thread that keeps
/// one mmap stream running from warmup until the handle is stopped.
pub struct V4lStream {
    tx: Option<mpsc::Sender<GrabRequest>>,
    thread: Option<std::thread::JoinHandle<()>>,
    resolution: (u32, u32),
    device_path: String,
}

impl V4lStream {
    /// Open the camera on its own thread and wait until warmup is done.
    async fn spawn(
        device_path: String,
        (width, height): (u32, u32),
        warmup_frames: usize,
    ) -> Result<Self, DeviceError> {
        let (tx, rx) = mpsc::channel::<GrabRequest>(1);
        let (ready_tx, ready_rx) = oneshot::channel();

        let thread_path = device_path.clone();
        let thread = std::thread::Builder::new()
            .name("facestress-camera".into())
            .spawn(move || camera_thread(&thread_path, width, height, warmup_frames, ready_tx, rx))
            .map_err(|e| DeviceError::Capture(format!("failed to spawn camera thread: {e}")))?;

        let resolution = ready_rx
            .await
            .map_err(|_| DeviceError::Capture("camera thread exited during startup".into()))??;

        Ok(Self {
            tx: Some(tx),
            thread: Some(thread),
            resolution,
            device_path,
        })
    }
}

/// Body of the camera thread: open, warm up, then serve grabs until the
/// request channel closes. The device closes when this returns.
fn camera_thread(
    device_path: &str,
    width: u32,
    height: u32,
    warmup_frames: usize,
    ready: oneshot::Sender<Result<(u32, u32), CameraError>>,
    mut rx: mpsc::Receiver<GrabRequest>,
) {
    let camera = match Camera::open(device_path, width, height) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let started = camera.stream().and_then(|mut stream| {
        camera.warmup(&mut stream, warmup_frames)?;
        Ok(stream)
    });
    let mut stream = match started {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    if ready.send(Ok((camera.width, camera.height))).is_err() {
        return;
    }

    tracing::debug!(device = device_path, "camera thread started");
    while let Some(GrabRequest { reply }) = rx.blocking_recv() {
        let _ = reply.send(camera.capture_rgb(&mut stream));
    }
    tracing::debug!(device = device_path, "camera thread exiting");
}

impl MediaStream for V4lStream {
    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn track_count(&self) -> usize {
        usize::from(self.tx.is_some())
    }

    fn is_live(&self) -> bool {
        self.tx.is_some()
    }

    async fn grab_frame(&mut self) -> Result<RgbImage, DeviceError> {
        let tx = self.tx.as_ref().ok_or(DeviceError::Released)?;
        let (reply, rx) = oneshot::channel();
        tx.send(GrabRequest { reply })
            .await
            .map_err(|_| DeviceError::Released)?;
        Ok(rx.await.map_err(|_| DeviceError::Released)??)
    }

    fn stop_tracks(&mut self) {
        // Closing the channel ends the thread; joining means the device is
        // closed by the time this returns.
        self.tx = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!(device = %self.device_path, "camera thread panicked");
            }
            tracing::debug!(device = %self.device_path, "camera device closed");
        }
    }
}
