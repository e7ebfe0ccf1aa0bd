//! Input source state machine: placeholder, still preview, or live camera.

use crate::media::{
    encode_still, CameraConstraints, CameraSession, DeviceError, MediaDevices, CAPTURE_JPEG_QUALITY,
};
use crate::types::{CandidateImage, InputMode, SelectedFile, MAX_UPLOAD_BYTES};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("please select a valid image file (got {media_type})")]
    NotAnImage { media_type: String },
    #[error("file size must be less than 16MB (got {size} bytes)")]
    TooLarge { size: u64 },
    #[error("could not read {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to access camera ({0}); please ensure camera permissions are granted")]
    Camera(#[source] DeviceError),
    #[error("unable to capture photo ({0})")]
    Capture(#[source] DeviceError),
    #[error("could not encode captured frame: {0}")]
    Encode(#[from] image::ImageError),
}

impl InputError {
    /// Bad input the user can correct by choosing another file.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::NotAnImage { .. } | Self::TooLarge { .. } | Self::Read { .. }
        )
    }
}

/// Owns the input mode, the optional camera session and the current candidate.
///
/// Invariants held across every operation:
/// - a camera session exists iff the mode is [`InputMode::CameraLive`];
/// - the analysis trigger is enabled iff the mode is [`InputMode::StaticPreview`].
pub struct InputSourceController<D: MediaDevices> {
    devices: D,
    constraints: CameraConstraints,
    mode: InputMode,
    camera: Option<CameraSession<D::Stream>>,
    candidate: Option<CandidateImage>,
    generation: Arc<AtomicU64>,
}

impl<D: MediaDevices> InputSourceController<D> {
    pub fn new(devices: D) -> Self {
        Self::with_constraints(devices, CameraConstraints::default())
    }

    pub fn with_constraints(devices: D, constraints: CameraConstraints) -> Self {
        Self {
            devices,
            constraints,
            mode: InputMode::Empty,
            camera: None,
            candidate: None,
            generation: Arc::default(),
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn candidate(&self) -> Option<&CandidateImage> {
        self.candidate.as_ref()
    }

    /// Bumped every time a new candidate is adopted.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Shared counter, readable after the controller has moved on.
    pub(crate) fn generation_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.generation)
    }

    pub fn trigger_enabled(&self) -> bool {
        self.mode == InputMode::StaticPreview
    }

    pub fn camera_active(&self) -> bool {
        self.camera.as_ref().is_some_and(CameraSession::is_live)
    }

    pub fn camera_resolution(&self) -> Option<(u32, u32)> {
        self.camera.as_ref().and_then(|c| c.resolution())
    }

    /// Adopt a user-chosen file as the candidate.
    ///
    /// Validation failures leave every piece of state untouched. On success
    /// any live camera is released before the file becomes the preview.
    pub async fn select_file(&mut self, file: SelectedFile) -> Result<(), InputError> {
        if !file.is_image() {
            return Err(InputError::NotAnImage {
                media_type: file.media_type,
            });
        }
        if file.size > MAX_UPLOAD_BYTES {
            return Err(InputError::TooLarge { size: file.size });
        }

        let name = file.name.clone();
        let media_type = file.media_type.clone();
        let bytes = file
            .read()
            .await
            .map_err(|source| InputError::Read {
                name: name.clone(),
                source,
            })?;

        self.stop_camera();

        tracing::info!(file = %name, media_type = %media_type, bytes = bytes.len(), "file selected");
        self.adopt(CandidateImage::Blob {
            file_name: name,
            media_type,
            bytes,
        });
        Ok(())
    }

    /// Acquire a live camera. No-op if one is already live.
    pub async fn start_camera(&mut self) -> Result<(), InputError> {
        if self.mode == InputMode::CameraLive {
            tracing::debug!("camera already live");
            return Ok(());
        }

        let stream = self.devices.open_video(&self.constraints).await.map_err(|e| {
            tracing::warn!(error = %e, "camera request failed");
            InputError::Camera(e)
        })?;

        let session = CameraSession::new(stream);
        if let Some((width, height)) = session.resolution() {
            tracing::info!(width, height, "camera live");
        }
        self.camera = Some(session);
        self.candidate = None;
        self.mode = InputMode::CameraLive;
        Ok(())
    }

    /// Capture the current frame as the candidate and release the camera.
    ///
    /// Returns `Ok(false)` without effect when no camera session exists.
    /// A failed grab leaves the camera live.
    pub async fn capture_photo(&mut self) -> Result<bool, InputError> {
        let Some(session) = self.camera.as_mut() else {
            return Ok(false);
        };

        let frame = session.grab_frame().await.map_err(|e| {
            tracing::warn!(error = %e, "frame grab failed");
            InputError::Capture(e)
        })?;
        let (width, height) = frame.dimensions();
        let uri = tokio::task::spawn_blocking(move || encode_still(&frame, CAPTURE_JPEG_QUALITY))
            .await
            .map_err(|e| InputError::Capture(DeviceError::Capture(format!("encoder task failed: {e}"))))??;
        tracing::info!(width, height, encoded = uri.as_str().len(), "photo captured");

        self.stop_camera();
        self.adopt(CandidateImage::DataUri(uri));
        Ok(true)
    }

    /// Release the camera if one is held. Safe to call at any time.
    pub fn stop_camera(&mut self) {
        if let Some(session) = self.camera.take() {
            session.release();
            tracing::info!("camera stopped");
        }
        if self.mode == InputMode::CameraLive {
            self.mode = if self.candidate.is_some() {
                InputMode::StaticPreview
            } else {
                InputMode::Empty
            };
        }
    }

    fn adopt(&mut self, candidate: CandidateImage) {
        self.candidate = Some(candidate);
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.mode = InputMode::StaticPreview;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeDevices, TrackCounter};

    fn controller() -> (InputSourceController<FakeDevices>, TrackCounter) {
        let devices = FakeDevices::new(64, 48);
        let counter = devices.counter.clone();
        (InputSourceController::new(devices), counter)
    }

    fn assert_invariants(c: &InputSourceController<FakeDevices>) {
        assert_eq!(c.camera_active(), c.mode() == InputMode::CameraLive);
        assert_eq!(c.trigger_enabled(), c.mode() == InputMode::StaticPreview);
    }

    fn png(size: usize) -> SelectedFile {
        SelectedFile::from_bytes("face.png", "image/png", vec![7u8; size])
    }

    #[test]
    fn test_initial_state() {
        let (c, _) = controller();
        assert_eq!(c.mode(), InputMode::Empty);
        assert!(c.candidate().is_none());
        assert!(!c.trigger_enabled());
        assert_invariants(&c);
    }

    #[tokio::test]
    async fn test_non_image_rejected_without_state_change() {
        let (mut c, _) = controller();
        for media_type in ["text/plain", "application/pdf", "video/mp4", ""] {
            let file = SelectedFile::from_bytes("x", media_type, vec![1, 2, 3]);
            let err = c.select_file(file).await.unwrap_err();
            assert!(err.is_validation());
            assert!(matches!(err, InputError::NotAnImage { .. }));
            assert_eq!(c.mode(), InputMode::Empty);
            assert!(c.candidate().is_none());
        }
    }

    #[tokio::test]
    async fn test_image_within_limit_becomes_preview() {
        let (mut c, _) = controller();
        c.select_file(png(1024)).await.unwrap();
        assert_eq!(c.mode(), InputMode::StaticPreview);
        assert!(c.trigger_enabled());
        assert!(matches!(c.candidate(), Some(CandidateImage::Blob { bytes, .. }) if bytes.len() == 1024));
        assert_invariants(&c);
    }

    #[tokio::test]
    async fn test_exact_limit_accepted() {
        let (mut c, _) = controller();
        c.select_file(png(MAX_UPLOAD_BYTES as usize)).await.unwrap();
        assert_eq!(c.mode(), InputMode::StaticPreview);
    }

    #[tokio::test]
    async fn test_oversized_rejected_keeps_previous_candidate() {
        let (mut c, _) = controller();
        c.select_file(png(10)).await.unwrap();
        let before = c.candidate().cloned();

        let err = c
            .select_file(png(MAX_UPLOAD_BYTES as usize + 1))
            .await
            .unwrap_err();
        assert!(matches!(err, InputError::TooLarge { .. }));
        assert_eq!(c.mode(), InputMode::StaticPreview);
        assert_eq!(c.candidate().cloned(), before);

        // Wrong media type and too large: still a validation failure.
        let big_text = SelectedFile::from_bytes("x", "text/plain", vec![0; MAX_UPLOAD_BYTES as usize + 1]);
        assert!(c.select_file(big_text).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_select_file_releases_live_camera() {
        let (mut c, counter) = controller();
        c.start_camera().await.unwrap();
        assert_eq!(counter.live_tracks(), 1);

        c.select_file(png(8)).await.unwrap();
        assert_eq!(counter.live_tracks(), 0);
        assert!(!c.camera_active());
        assert_eq!(c.mode(), InputMode::StaticPreview);
        assert_invariants(&c);
    }

    #[tokio::test]
    async fn test_rejected_file_keeps_camera_live() {
        let (mut c, counter) = controller();
        c.start_camera().await.unwrap();
        let _ = c
            .select_file(SelectedFile::from_bytes("x", "text/plain", vec![1]))
            .await;
        assert_eq!(c.mode(), InputMode::CameraLive);
        assert_eq!(counter.live_tracks(), 1);
    }

    #[tokio::test]
    async fn test_start_camera_clears_candidate_and_disables_trigger() {
        let (mut c, _) = controller();
        c.select_file(png(8)).await.unwrap();
        c.start_camera().await.unwrap();
        assert_eq!(c.mode(), InputMode::CameraLive);
        assert!(c.candidate().is_none());
        assert!(!c.trigger_enabled());
        assert_invariants(&c);
    }

    #[tokio::test]
    async fn test_start_camera_twice_keeps_one_session() {
        let (mut c, counter) = controller();
        c.start_camera().await.unwrap();
        c.start_camera().await.unwrap();
        assert_eq!(counter.opened(), 1);
        assert_eq!(counter.live_tracks(), 1);
    }

    #[tokio::test]
    async fn test_camera_denied_leaves_state_unchanged() {
        let mut devices = FakeDevices::new(64, 48);
        devices.deny = true;
        let mut c = InputSourceController::new(devices);
        c.select_file(png(8)).await.unwrap();

        let err = c.start_camera().await.unwrap_err();
        assert!(matches!(err, InputError::Camera(DeviceError::PermissionDenied(_))));
        assert!(err.to_string().contains("camera permissions"));
        assert_eq!(c.mode(), InputMode::StaticPreview);
        assert!(c.trigger_enabled());
        assert!(c.candidate().is_some());
        assert_invariants(&c);
    }

    #[tokio::test]
    async fn test_capture_without_session_is_noop() {
        let (mut c, _) = controller();
        assert!(!c.capture_photo().await.unwrap());
        assert_eq!(c.mode(), InputMode::Empty);
        assert!(c.candidate().is_none());
    }

    #[tokio::test]
    async fn test_capture_releases_camera_and_previews() {
        let (mut c, counter) = controller();
        c.start_camera().await.unwrap();
        assert!(c.capture_photo().await.unwrap());

        assert_eq!(counter.live_tracks(), 0);
        assert!(!c.camera_active());
        assert_eq!(c.mode(), InputMode::StaticPreview);
        assert!(c.trigger_enabled());
        match c.candidate() {
            Some(CandidateImage::DataUri(uri)) => {
                assert_eq!(uri.media_type(), "image/jpeg");
                let decoded = image::load_from_memory(&uri.decode().unwrap()).unwrap();
                assert_eq!((decoded.width(), decoded.height()), (64, 48));
            }
            other => panic!("expected data URI candidate, got {other:?}"),
        }
        assert_invariants(&c);
    }

    #[tokio::test]
    async fn test_failed_grab_keeps_camera_live() {
        let devices = FakeDevices::new(64, 48);
        let counter = devices.counter.clone();
        let mut c = InputSourceController::new(devices);
        c.start_camera().await.unwrap();
        counter.fail_grabs(true);

        let err = c.capture_photo().await.unwrap_err();
        assert!(matches!(err, InputError::Capture(DeviceError::Capture(_))));
        assert!(err.to_string().starts_with("unable to capture photo"));
        assert!(!err.to_string().contains("permissions"));
        assert_eq!(c.mode(), InputMode::CameraLive);
        assert_eq!(counter.live_tracks(), 1);
        assert_invariants(&c);
    }

    #[tokio::test]
    async fn test_stop_camera_returns_to_empty() {
        let (mut c, counter) = controller();
        c.start_camera().await.unwrap();
        c.stop_camera();
        assert_eq!(c.mode(), InputMode::Empty);
        assert_eq!(counter.live_tracks(), 0);
        assert_invariants(&c);
    }

    #[tokio::test]
    async fn test_stop_camera_idempotent() {
        let (mut c, _) = controller();
        c.stop_camera();
        c.stop_camera();
        assert_eq!(c.mode(), InputMode::Empty);

        c.select_file(png(8)).await.unwrap();
        c.stop_camera();
        assert_eq!(c.mode(), InputMode::StaticPreview);
        assert!(c.candidate().is_some());
    }

    #[tokio::test]
    async fn test_generation_bumps_per_candidate() {
        let (mut c, _) = controller();
        assert_eq!(c.generation(), 0);
        c.select_file(png(8)).await.unwrap();
        c.start_camera().await.unwrap();
        c.capture_photo().await.unwrap();
        assert_eq!(c.generation(), 2);
    }

    #[tokio::test]
    async fn test_invariants_over_transition_sequences() {
        #[derive(Clone, Copy, Debug)]
        enum Op {
            File,
            BadFile,
            Start,
            Capture,
            Stop,
        }
        let ops = [Op::File, Op::BadFile, Op::Start, Op::Capture, Op::Stop];

        // Every sequence of length 4 over the five operations.
        for n in 0..ops.len().pow(4) {
            let (mut c, counter) = controller();
            let mut idx = n;
            for _ in 0..4 {
                let op = ops[idx % ops.len()];
                idx /= ops.len();
                match op {
                    Op::File => c.select_file(png(4)).await.unwrap(),
                    Op::BadFile => {
                        let _ = c
                            .select_file(SelectedFile::from_bytes("x", "text/plain", vec![1]))
                            .await;
                    }
                    Op::Start => c.start_camera().await.unwrap(),
                    Op::Capture => {
                        c.capture_photo().await.unwrap();
                    }
                    Op::Stop => c.stop_camera(),
                }
                assert_invariants(&c);
                assert_eq!(counter.live_tracks() > 0, c.camera_active(), "after {op:?}");
            }
        }
    }
}
