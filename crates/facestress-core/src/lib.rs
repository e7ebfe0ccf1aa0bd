//! facestress-core — input acquisition and analysis request orchestration.
//!
//! Tracks which input source is active (placeholder, still preview, live
//! camera), owns the camera session lifecycle, and sequences requests to a
//! remote facial stress analysis service.

pub mod controller;
pub mod keyboard;
pub mod media;
pub mod orchestrator;
pub mod presentation;
pub mod service;
pub mod types;
pub mod workbench;

#[cfg(test)]
pub(crate) mod test_support;

pub use controller::{InputError, InputSourceController};
pub use media::{CameraConstraints, CameraSession, DeviceError, FacingMode, MediaDevices, MediaStream};
pub use orchestrator::AnalysisOrchestrator;
pub use presentation::{Presenter, ResultView, SharedPresenter};
pub use service::{AnalysisError, AnalysisService, HttpAnalysisService, ServiceHealth, TransportError};
pub use types::{AnalysisOutcome, AnalysisResult, AuValue, CandidateImage, DataUri, InputMode, SelectedFile};
pub use workbench::Workbench;
