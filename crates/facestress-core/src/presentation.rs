//! Rendering boundary: display-ready result formatting and the presenter trait.

use crate::types::{AnalysisResult, InputMode, SCORE_MAX};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A result formatted for display.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultView {
    /// Score rounded to one decimal, e.g. `"7.3"`.
    pub score_display: String,
    /// Score as a percentage of [`SCORE_MAX`], clamped to 0–100.
    pub progress_percent: f64,
    pub interpretation: String,
    /// `(name, value)` pairs in service order, values at four decimals.
    pub entries: Vec<(String, String)>,
}

impl From<&AnalysisResult> for ResultView {
    fn from(result: &AnalysisResult) -> Self {
        Self {
            score_display: fixed(result.score, 1),
            progress_percent: (result.score / SCORE_MAX * 100.0).clamp(0.0, 100.0),
            interpretation: result.interpretation.clone(),
            entries: result
                .au_values
                .iter()
                .map(|au| (au.name.clone(), fixed(au.value, 4)))
                .collect(),
        }
    }
}

/// Format with `places` decimals the way JavaScript's `toFixed` does.
///
/// The exact binary value is rounded, so `1.45` (really 1.4499...) becomes
/// `"1.4"`. Only exact ties such as `7.25` round away from zero, where
/// `format!` alone would pick the even digit.
fn fixed(value: f64, places: usize) -> String {
    if is_exact_tie(value, places) {
        let scale = 10f64.powi(places as i32);
        let rounded = (value * scale).round() / scale;
        return format!("{rounded:.places$}");
    }
    format!("{value:.places$}")
}

/// True when `value` is exactly `(2k + 1) / (2 * 10^places)`.
fn is_exact_tie(value: f64, places: usize) -> bool {
    if !value.is_finite() || value == 0.0 {
        return false;
    }
    let bits = value.abs().to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i64;
    let fraction = bits & ((1u64 << 52) - 1);
    let (mantissa, exponent) = if biased == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u64 << 52), biased - 1075)
    };
    // value * 2 * 10^places = odd * 5^places * 2^(tz + exponent + 1 + places),
    // an odd integer only when the power of two vanishes.
    i64::from(mantissa.trailing_zeros()) + exponent + 1 + places as i64 == 0
}

/// Receives everything the user should see.
pub trait Presenter {
    /// The authoritative surface changed.
    fn show_surface(&mut self, mode: InputMode);
    /// Loading indicator on/off. The trigger is disabled while busy.
    fn set_busy(&mut self, busy: bool);
    fn show_result(&mut self, view: &ResultView);
    fn show_error(&mut self, message: &str);
}

/// A presenter shared by the owning session and any request in flight.
///
/// The lock is only held for the duration of one presenter call.
pub struct SharedPresenter<P>(Arc<Mutex<P>>);

impl<P> Clone for SharedPresenter<P> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<P> SharedPresenter<P> {
    pub fn new(presenter: P) -> Self {
        Self(Arc::new(Mutex::new(presenter)))
    }

    pub fn lock(&self) -> MutexGuard<'_, P> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P: Presenter> Presenter for SharedPresenter<P> {
    fn show_surface(&mut self, mode: InputMode) {
        self.lock().show_surface(mode);
    }

    fn set_busy(&mut self, busy: bool) {
        self.lock().set_busy(busy);
    }

    fn show_result(&mut self, view: &ResultView) {
        self.lock().show_result(view);
    }

    fn show_error(&mut self, message: &str) {
        self.lock().show_error(message);
    }
}
