//! Host media-capture interface and the camera session that wraps it.
//!
//! The controller never touches a device directly: it asks a
//! [`MediaDevices`] implementation for a [`MediaStream`] and holds it in a
//! [`CameraSession`], which guarantees every track is stopped on release or
//! drop.

use crate::types::DataUri;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::future::Future;
use thiserror::Error;

/// JPEG quality for captured stills (0.95 on a 0–1 scale).
pub const CAPTURE_JPEG_QUALITY: u8 = 95;

pub const IDEAL_WIDTH: u32 = 1280;
pub const IDEAL_HEIGHT: u32 = 720;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("device not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device busy")]
    Busy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiation(String),
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("camera session already released")]
    Released,
}

/// Which way the requested camera should face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

impl std::str::FromStr for FacingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" | "front" => Ok(Self::User),
            "environment" | "back" | "rear" => Ok(Self::Environment),
            other => Err(format!("unknown facing mode: {other}")),
        }
    }
}

/// Advisory constraints for a live video request. Devices may ignore them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraConstraints {
    pub facing: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for CameraConstraints {
    fn default() -> Self {
        Self {
            facing: FacingMode::User,
            ideal_width: IDEAL_WIDTH,
            ideal_height: IDEAL_HEIGHT,
        }
    }
}

/// Source of live video handles (the host's camera stack).
pub trait MediaDevices {
    type Stream: MediaStream;

    /// Request a live video stream. Denial or device failure is an error.
    fn open_video(
        &mut self,
        constraints: &CameraConstraints,
    ) -> impl Future<Output = Result<Self::Stream, DeviceError>>;
}

/// A live video handle with one or more underlying device tracks.
pub trait MediaStream {
    /// Intrinsic frame dimensions reported by the device.
    fn resolution(&self) -> (u32, u32);
    fn track_count(&self) -> usize;
    fn is_live(&self) -> bool;
    /// Read the current frame. Device I/O must not block the caller's executor.
    fn grab_frame(&mut self) -> impl Future<Output = Result<RgbImage, DeviceError>>;
    /// Stop every track. Must be idempotent.
    fn stop_tracks(&mut self);
}

/// Exclusive owner of one live stream.
pub struct CameraSession<S: MediaStream> {
    stream: Option<S>,
}

impl<S: MediaStream> CameraSession<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    pub fn is_live(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_live())
    }

    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.stream.as_ref().map(|s| s.resolution())
    }

    /// Grab a frame at the stream's intrinsic dimensions.
    pub async fn grab_frame(&mut self) -> Result<RgbImage, DeviceError> {
        let stream = self.stream.as_mut().ok_or(DeviceError::Released)?;
        let (width, height) = stream.resolution();
        let frame = stream.grab_frame().await?;
        if frame.dimensions() != (width, height) {
            return Err(DeviceError::Capture(format!(
                "frame is {}x{}, device reports {width}x{height}",
                frame.width(),
                frame.height()
            )));
        }
        Ok(frame)
    }

    /// Stop every track and discard the handle.
    pub fn release(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            tracing::debug!(tracks = stream.track_count(), "stopping camera tracks");
            stream.stop_tracks();
        }
    }
}

impl<S: MediaStream> Drop for CameraSession<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Encode a frame as a JPEG data URI.
pub fn encode_still(frame: &RgbImage, quality: u8) -> Result<DataUri, image::ImageError> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality).encode_image(frame)?;
    Ok(DataUri::encode("image/jpeg", &jpeg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeStream, TrackCounter};

    #[test]
    fn test_release_stops_all_tracks() {
        let counter = TrackCounter::default();
        let session = CameraSession::new(FakeStream::new(64, 48, 2, counter.clone()));
        assert!(session.is_live());
        session.release();
        assert_eq!(counter.live_tracks(), 0);
    }

    #[test]
    fn test_drop_stops_all_tracks() {
        let counter = TrackCounter::default();
        {
            let _session = CameraSession::new(FakeStream::new(64, 48, 3, counter.clone()));
            assert_eq!(counter.live_tracks(), 3);
        }
        assert_eq!(counter.live_tracks(), 0);
    }

    #[tokio::test]
    async fn test_grab_frame_rejects_dimension_mismatch() {
        let counter = TrackCounter::default();
        let mut stream = FakeStream::new(64, 48, 1, counter);
        stream.frame_size = Some((32, 32));
        let mut session = CameraSession::new(stream);
        assert!(matches!(session.grab_frame().await, Err(DeviceError::Capture(_))));
    }

    #[tokio::test]
    async fn test_grab_frame_after_stop_is_released() {
        let counter = TrackCounter::default();
        let mut session = CameraSession::new(FakeStream::new(64, 48, 1, counter.clone()));
        session.stop();
        assert!(matches!(session.grab_frame().await, Err(DeviceError::Released)));
        assert_eq!(counter.live_tracks(), 0);
    }

    #[test]
    fn test_encode_still_is_jpeg_data_uri() {
        let frame = RgbImage::from_pixel(16, 8, image::Rgb([200, 120, 90]));
        let uri = encode_still(&frame, CAPTURE_JPEG_QUALITY).unwrap();
        assert_eq!(uri.media_type(), "image/jpeg");

        let bytes = uri.decode().unwrap();
        assert_eq!(&bytes[..2], &[0xff, 0xd8]);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn test_facing_mode_parse() {
        assert_eq!("user".parse::<FacingMode>().unwrap(), FacingMode::User);
        assert_eq!("Environment".parse::<FacingMode>().unwrap(), FacingMode::Environment);
        assert!("sideways".parse::<FacingMode>().is_err());
    }
}
