//! One owned session: controller, orchestrator and presenter wired together.

use crate::controller::{InputError, InputSourceController};
use crate::keyboard::{self, Key, Shortcut, ShortcutContext};
use crate::media::{CameraConstraints, MediaDevices};
use crate::orchestrator::AnalysisOrchestrator;
use crate::presentation::{Presenter, SharedPresenter};
use crate::service::AnalysisService;
use crate::types::{AnalysisOutcome, CandidateImage, InputMode, SelectedFile};
use std::future::Future;
use std::sync::atomic::Ordering;
use std::sync::MutexGuard;

pub struct Workbench<D: MediaDevices, S, P> {
    controller: InputSourceController<D>,
    orchestrator: AnalysisOrchestrator<S>,
    presenter: SharedPresenter<P>,
}

impl<D, S, P> Workbench<D, S, P>
where
    D: MediaDevices,
    S: AnalysisService,
    P: Presenter,
{
    pub fn new(devices: D, constraints: CameraConstraints, service: S, presenter: P) -> Self {
        Self {
            controller: InputSourceController::with_constraints(devices, constraints),
            orchestrator: AnalysisOrchestrator::new(service),
            presenter: SharedPresenter::new(presenter),
        }
    }

    pub fn mode(&self) -> InputMode {
        self.controller.mode()
    }

    pub fn candidate(&self) -> Option<&CandidateImage> {
        self.controller.candidate()
    }

    pub fn camera_resolution(&self) -> Option<(u32, u32)> {
        self.controller.camera_resolution()
    }

    pub fn is_busy(&self) -> bool {
        self.orchestrator.is_busy()
    }

    /// Enabled in preview mode while no request is in flight.
    pub fn trigger_enabled(&self) -> bool {
        self.controller.trigger_enabled() && !self.orchestrator.is_busy()
    }

    pub fn presenter(&self) -> MutexGuard<'_, P> {
        self.presenter.lock()
    }

    pub async fn select_file(&mut self, file: SelectedFile) -> Result<(), InputError> {
        let result = self.controller.select_file(file).await;
        self.settle(result)
    }

    pub async fn start_camera(&mut self) -> Result<(), InputError> {
        let result = self.controller.start_camera().await;
        self.settle(result)
    }

    /// Returns `Ok(false)` when there was no camera to capture from.
    pub async fn capture_photo(&mut self) -> Result<bool, InputError> {
        let result = self.controller.capture_photo().await;
        self.settle(result)
    }

    pub fn stop_camera(&mut self) {
        let before = self.controller.mode();
        self.controller.stop_camera();
        if self.controller.mode() != before {
            self.presenter.show_surface(self.controller.mode());
        }
    }

    /// Request analysis of the current candidate.
    ///
    /// The returned future does not borrow the workbench, so input operations
    /// keep working while it is pending. Switching source does not cancel it:
    /// its outcome is still presented, with a warning logged when the
    /// candidate it was issued for has been replaced. Resolves to `None` if a
    /// request was already in flight.
    pub fn analysis(&self) -> impl Future<Output = Option<AnalysisOutcome>> {
        let orchestrator = self.orchestrator.clone();
        let mut presenter = self.presenter.clone();
        let candidate = self.controller.candidate().cloned();
        let issued_for = self.controller.generation();
        let generation = self.controller.generation_counter();

        async move {
            let outcome = orchestrator.analyze(candidate.as_ref(), &mut presenter).await;
            let current = generation.load(Ordering::Acquire);
            if outcome.is_some() && current != issued_for {
                tracing::warn!(
                    issued_for,
                    current,
                    "analysis result belongs to a superseded image"
                );
            }
            outcome
        }
    }

    /// Analyze the current candidate and wait for the outcome.
    pub async fn analyze(&self) -> Option<AnalysisOutcome> {
        self.analysis().await
    }

    /// The shortcut `key` is bound to in the current state, if any.
    pub fn shortcut(&self, key: Key, text_input_focused: bool) -> Option<Shortcut> {
        let ctx = ShortcutContext {
            trigger_enabled: self.trigger_enabled(),
            text_input_focused,
            camera_live: self.controller.camera_active(),
        };
        let shortcut = keyboard::resolve(key, ctx);
        tracing::debug!(?key, ?shortcut, "key pressed");
        shortcut
    }

    /// Release the camera before the host goes away.
    pub fn shutdown(&mut self) {
        self.stop_camera();
    }

    /// Route a controller result: surface change on success, error otherwise.
    fn settle<T>(&mut self, result: Result<T, InputError>) -> Result<T, InputError> {
        match &result {
            Ok(_) => self.presenter.show_surface(self.controller.mode()),
            Err(err) => {
                if err.is_validation() {
                    tracing::debug!(error = %err, "input rejected");
                } else {
                    tracing::warn!(error = %err, "input operation failed");
                }
                self.presenter.show_error(&err.to_string());
            }
        }
        result
    }
}
