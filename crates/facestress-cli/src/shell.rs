//! Line-driven interactive session.

use anyhow::Result;
use facestress_core::keyboard::{Key, Shortcut};
use facestress_core::{
    AnalysisOutcome, AnalysisService, InputMode, MediaDevices, Presenter, SelectedFile, Workbench,
};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::io::{AsyncBufReadExt, BufReader};

/// An analysis request running alongside the command loop.
type InFlight = Pin<Box<dyn Future<Output = Option<AnalysisOutcome>>>>;

const HELP: &str = "\
commands:
  open <path>   select an image file
  camera        start the camera
  capture       take a photo from the live camera
  stop          stop the camera (or `esc`)
  analyze       analyze the current image (or a line with a single space)
  status        show the current state
  quit          leave";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Open(PathBuf),
    Camera,
    Capture,
    Stop,
    Analyze,
    Status,
    Help,
    Quit,
    Key(Key),
    Unknown(String),
}

pub fn parse(line: &str) -> Option<Command> {
    // A lone space is the Space key; anything else is trimmed first.
    if line == " " {
        return Some(Command::Key(Key::Space));
    }
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(w, r)| (w, r.trim()));

    Some(match word.to_ascii_lowercase().as_str() {
        "open" if !rest.is_empty() => Command::Open(PathBuf::from(rest)),
        "camera" | "cam" => Command::Camera,
        "capture" | "snap" => Command::Capture,
        "stop" => Command::Stop,
        "analyze" | "a" => Command::Analyze,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        "esc" | "\u{1b}" => Command::Key(Key::Escape),
        _ => Command::Unknown(line.to_string()),
    })
}

/// Read commands from stdin until `quit` or end of input.
///
/// An analysis runs concurrently with the command loop, so the source can be
/// switched or the camera stopped while a request is pending.
pub async fn run<D, S, P>(bench: &mut Workbench<D, S, P>) -> Result<()>
where
    D: MediaDevices + 'static,
    S: AnalysisService + 'static,
    P: Presenter + 'static,
{
    eprintln!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight: Option<InFlight> = None;

    let finish_pending = loop {
        tokio::select! {
            outcome = settled(&mut in_flight) => {
                in_flight = None;
                tracing::debug!(
                    success = outcome.as_ref().is_some_and(AnalysisOutcome::is_success),
                    "analysis finished"
                );
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break true;
                };
                let Some(command) = parse(&line) else {
                    continue;
                };
                if !dispatch(bench, command, &mut in_flight).await {
                    break false;
                }
            }
        }
    };

    match in_flight.take() {
        // Input ended with a request still running: let it report.
        Some(request) if finish_pending => {
            request.await;
        }
        Some(_) => tracing::debug!("abandoning analysis in flight"),
        None => {}
    }
    bench.shutdown();
    Ok(())
}

/// Resolves with the outcome of the request in flight; pending while idle.
async fn settled(in_flight: &mut Option<InFlight>) -> Option<AnalysisOutcome> {
    match in_flight {
        Some(request) => request.await,
        None => std::future::pending().await,
    }
}

/// Run one command. Returns `false` to leave the shell.
async fn dispatch<D, S, P>(
    bench: &mut Workbench<D, S, P>,
    command: Command,
    in_flight: &mut Option<InFlight>,
) -> bool
where
    D: MediaDevices + 'static,
    S: AnalysisService + 'static,
    P: Presenter + 'static,
{
    match command {
        Command::Open(path) => match SelectedFile::from_path(&path).await {
            // Errors are already shown by the presenter.
            Ok(file) => {
                let _ = bench.select_file(file).await;
            }
            Err(e) => eprintln!("Error: cannot open {}: {e}", path.display()),
        },
        Command::Camera => {
            let _ = bench.start_camera().await;
        }
        Command::Capture => match bench.capture_photo().await {
            Ok(false) => eprintln!("camera is not running"),
            Ok(true) | Err(_) => {}
        },
        Command::Stop => bench.stop_camera(),
        Command::Analyze => launch(bench, in_flight),
        Command::Key(key) => match bench.shortcut(key, false) {
            Some(Shortcut::Analyze) => launch(bench, in_flight),
            Some(Shortcut::StopCamera) => bench.stop_camera(),
            None => {}
        },
        Command::Status => print_status(bench),
        Command::Help => eprintln!("{HELP}"),
        Command::Quit => return false,
        Command::Unknown(text) => eprintln!("unknown command: {text} (try `help`)"),
    }
    true
}

fn launch<D, S, P>(bench: &Workbench<D, S, P>, in_flight: &mut Option<InFlight>)
where
    D: MediaDevices + 'static,
    S: AnalysisService + 'static,
    P: Presenter + 'static,
{
    if bench.mode() == InputMode::CameraLive {
        eprintln!("capture a photo first");
    } else if in_flight.is_some() {
        eprintln!("analysis already in progress");
    } else {
        *in_flight = Some(Box::pin(bench.analysis()));
    }
}

fn print_status<D: MediaDevices, S: AnalysisService, P: Presenter>(bench: &Workbench<D, S, P>) {
    let mode = match bench.mode() {
        InputMode::Empty => "empty".to_string(),
        InputMode::StaticPreview => {
            let media_type = bench.candidate().map_or("?", |c| c.media_type());
            format!("preview ({media_type})")
        }
        InputMode::CameraLive => match bench.camera_resolution() {
            Some((w, h)) => format!("camera live ({w}x{h})"),
            None => "camera live".to_string(),
        },
    };
    let busy = if bench.is_busy() { "; analysis in progress" } else { "" };
    eprintln!(
        "mode: {mode}; analyze {}{busy}",
        if bench.trigger_enabled() { "enabled" } else { "disabled" }
    );
}
