//! In-memory fakes for the device, service and presentation seams.

use crate::media::{CameraConstraints, DeviceError, MediaDevices, MediaStream};
use crate::presentation::{Presenter, ResultView};
use crate::service::{AnalysisError, AnalysisService};
use crate::types::{AnalysisResult, AuValue, CandidateImage, InputMode};
use image::RgbImage;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Shared view into fake device state, kept by the test after the devices move.
#[derive(Clone, Default)]
pub struct TrackCounter {
    live: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
    fail_grabs: Arc<AtomicBool>,
}

impl TrackCounter {
    pub fn live_tracks(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn fail_grabs(&self, fail: bool) {
        self.fail_grabs.store(fail, Ordering::SeqCst);
    }
}

pub struct FakeStream {
    width: u32,
    height: u32,
    tracks: usize,
    stopped: bool,
    /// Overrides the size of grabbed frames.
    pub frame_size: Option<(u32, u32)>,
    counter: TrackCounter,
}

impl FakeStream {
    pub fn new(width: u32, height: u32, tracks: usize, counter: TrackCounter) -> Self {
        counter.live.fetch_add(tracks, Ordering::SeqCst);
        counter.opened.fetch_add(1, Ordering::SeqCst);
        Self {
            width,
            height,
            tracks,
            stopped: false,
            frame_size: None,
            counter,
        }
    }
}

impl MediaStream for FakeStream {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn track_count(&self) -> usize {
        self.tracks
    }

    fn is_live(&self) -> bool {
        !self.stopped
    }

    async fn grab_frame(&mut self) -> Result<RgbImage, DeviceError> {
        if self.stopped {
            return Err(DeviceError::Released);
        }
        if self.counter.fail_grabs.load(Ordering::SeqCst) {
            return Err(DeviceError::Capture("no buffer".into()));
        }
        let (w, h) = self.frame_size.unwrap_or((self.width, self.height));
        Ok(RgbImage::from_fn(w, h, |x, y| {
            image::Rgb([(x * 3) as u8, (y * 5) as u8, 128])
        }))
    }

    fn stop_tracks(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.counter.live.fetch_sub(self.tracks, Ordering::SeqCst);
        }
    }
}

pub struct FakeDevices {
    width: u32,
    height: u32,
    pub deny: bool,
    pub counter: TrackCounter,
}

impl FakeDevices {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            deny: false,
            counter: TrackCounter::default(),
        }
    }
}

impl MediaDevices for FakeDevices {
    type Stream = FakeStream;

    async fn open_video(&mut self, _constraints: &CameraConstraints) -> Result<FakeStream, DeviceError> {
        if self.deny {
            return Err(DeviceError::PermissionDenied("user dismissed prompt".into()));
        }
        Ok(FakeStream::new(self.width, self.height, 1, self.counter.clone()))
    }
}

pub fn sample_result() -> AnalysisResult {
    AnalysisResult {
        score: 7.25,
        interpretation: "Moderate".into(),
        au_values: vec![
            AuValue { name: "AU1".into(), value: 0.1234 },
            AuValue { name: "AU2".into(), value: 0.5 },
        ],
    }
}

/// Canned reply for [`FakeService`].
#[derive(Clone)]
pub enum Reply {
    Ok(AnalysisResult),
    Service(Option<String>),
    Transport,
}

/// Service fake that records calls and can be held open until released.
#[derive(Clone)]
pub struct FakeService {
    reply: Reply,
    pub calls: Arc<Mutex<Vec<CandidateImage>>>,
    gate: Option<Arc<Notify>>,
    pub entered: Arc<Notify>,
}

impl FakeService {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply,
            calls: Arc::default(),
            gate: None,
            entered: Arc::new(Notify::new()),
        }
    }

    /// Block every call until `gate.notify_one()`.
    pub fn gated(reply: Reply, gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(reply)
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl AnalysisService for FakeService {
    async fn analyze(&self, candidate: &CandidateImage) -> Result<AnalysisResult, AnalysisError> {
        self.calls.lock().unwrap().push(candidate.clone());
        self.entered.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match &self.reply {
            Reply::Ok(result) => Ok(result.clone()),
            Reply::Service(message) => Err(AnalysisError::service(message.clone())),
            Reply::Transport => Err(AnalysisError::malformed("connection reset")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Surface(InputMode),
    Busy(bool),
    Result(ResultView),
    Error(String),
}

#[derive(Default)]
pub struct RecordingPresenter {
    pub events: Vec<Event>,
}

impl RecordingPresenter {
    pub fn errors(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Error(m) => Some(m.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn results(&self) -> Vec<&ResultView> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Result(r) => Some(r),
                _ => None,
            })
            .collect()
    }
}

impl Presenter for RecordingPresenter {
    fn show_surface(&mut self, mode: InputMode) {
        self.events.push(Event::Surface(mode));
    }

    fn set_busy(&mut self, busy: bool) {
        self.events.push(Event::Busy(busy));
    }

    fn show_result(&mut self, view: &ResultView) {
        self.events.push(Event::Result(view.clone()));
    }

    fn show_error(&mut self, message: &str) {
        self.events.push(Event::Error(message.to_string()));
    }
}
