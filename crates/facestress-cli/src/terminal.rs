//! Terminal rendering of surfaces, results and errors.

use facestress_core::{InputMode, Presenter, ResultView};
use std::io::Write;

const BAR_WIDTH: usize = 40;

/// Writes results to `out` and status/errors to `err`.
pub struct TerminalPresenter<O: Write, E: Write> {
    out: O,
    err: E,
}

impl TerminalPresenter<std::io::Stdout, std::io::Stderr> {
    pub fn stdio() -> Self {
        Self {
            out: std::io::stdout(),
            err: std::io::stderr(),
        }
    }
}

#[cfg(test)]
impl<O: Write, E: Write> TerminalPresenter<O, E> {
    fn new(out: O, err: E) -> Self {
        Self { out, err }
    }

    fn into_parts(self) -> (O, E) {
        (self.out, self.err)
    }
}

/// `[#########...............]` filled to `percent` of the bar.
fn progress_bar(percent: f64) -> String {
    let filled = ((percent / 100.0) * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    format!("[{}{}]", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

impl<O: Write, E: Write> Presenter for TerminalPresenter<O, E> {
    fn show_surface(&mut self, mode: InputMode) {
        let line = match mode {
            InputMode::Empty => "no image selected",
            InputMode::StaticPreview => "image ready; press space or type `analyze`",
            InputMode::CameraLive => "camera live; type `capture` to take a photo, `esc` to cancel",
        };
        let _ = writeln!(self.err, "{line}");
    }

    fn set_busy(&mut self, busy: bool) {
        if busy {
            let _ = writeln!(self.err, "analyzing...");
        }
    }

    fn show_result(&mut self, view: &ResultView) {
        let name_width = view.entries.iter().map(|(n, _)| n.len()).max().unwrap_or(0);
        let _ = writeln!(self.out, "Score: {} / 10", view.score_display);
        let _ = writeln!(
            self.out,
            "{} {:.1}%",
            progress_bar(view.progress_percent),
            view.progress_percent
        );
        let _ = writeln!(self.out, "{}", view.interpretation);
        if !view.entries.is_empty() {
            let _ = writeln!(self.out, "Action units:");
            for (name, value) in &view.entries {
                let _ = writeln!(self.out, "  {name:<name_width$}  {value}");
            }
        }
        let _ = self.out.flush();
    }

    fn show_error(&mut self, message: &str) {
        let _ = writeln!(self.err, "Error: {message}");
    }
}
