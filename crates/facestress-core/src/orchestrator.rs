use crate::presentation::{Presenter, ResultView};
use crate::service::{AnalysisError, AnalysisService};
use crate::types::{AnalysisOutcome, CandidateImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Clone-safe handle that runs at most one analysis request at a time.
pub struct AnalysisOrchestrator<S> {
    service: Arc<S>,
    busy: Arc<AtomicBool>,
}

impl<S> Clone for AnalysisOrchestrator<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            busy: Arc::clone(&self.busy),
        }
    }
}

impl<S: AnalysisService> AnalysisOrchestrator<S> {
    pub fn new(service: S) -> Self {
        Self {
            service: Arc::new(service),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Submit `candidate` and hand the outcome to `presenter`.
    ///
    /// Returns `None` without doing anything if a request is already in
    /// flight. Otherwise the presenter sees `set_busy(true)`, then the result
    /// or error, then `set_busy(false)`.
    pub async fn analyze<P: Presenter + ?Sized>(
        &self,
        candidate: Option<&CandidateImage>,
        presenter: &mut P,
    ) -> Option<AnalysisOutcome> {
        if self.is_busy() {
            tracing::debug!("analysis already in flight; ignoring trigger");
            return None;
        }

        let Some(candidate) = candidate else {
            let err = AnalysisError::NoImage;
            presenter.show_error(&err.to_string());
            return Some(AnalysisOutcome::Failure(err.to_string()));
        };

        let mut guard = BusyGuard::engage(&self.busy, presenter)?;

        tracing::info!(
            kind = candidate.kind(),
            media_type = candidate.media_type(),
            "dispatching analysis request"
        );
        let outcome = match self.service.analyze(candidate).await {
            Ok(result) => {
                tracing::info!(
                    score = result.score,
                    au_count = result.au_values.len(),
                    "analysis succeeded"
                );
                guard.presenter().show_result(&ResultView::from(&result));
                AnalysisOutcome::Success(result)
            }
            Err(err) => {
                match &err {
                    AnalysisError::Transport(cause) => {
                        tracing::error!(error = %cause, "analysis transport failure")
                    }
                    other => tracing::warn!(error = %other, "analysis rejected"),
                }
                let reason = err.to_string();
                guard.presenter().show_error(&reason);
                AnalysisOutcome::Failure(reason)
            }
        };

        Some(outcome)
    }
}

/// Holds the busy flag; clearing it and the presenter's loading state on drop.
struct BusyGuard<'a, P: Presenter + ?Sized> {
    busy: &'a AtomicBool,
    presenter: &'a mut P,
}

impl<'a, P: Presenter + ?Sized> BusyGuard<'a, P> {
    fn engage(busy: &'a AtomicBool, presenter: &'a mut P) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        presenter.set_busy(true);
        Some(Self { busy, presenter })
    }

    fn presenter(&mut self) -> &mut P {
        self.presenter
    }
}

impl<P: Presenter + ?Sized> Drop for BusyGuard<'_, P> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
        self.presenter.set_busy(false);
    }
}
