use anyhow::{Context, Result};
use facestress_core::media::{IDEAL_HEIGHT, IDEAL_WIDTH};
use facestress_core::{CameraConstraints, FacingMode};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// CLI configuration: defaults, then an optional TOML file, then `FACESTRESS_*` variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base URL of the analysis service (default: http://localhost:5000).
    pub service_url: String,
    /// Timeout in seconds for one analysis request.
    pub request_timeout_secs: u64,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Frames discarded after opening the camera (AGC/AE stabilization).
    pub warmup_frames: usize,
    /// `user` or `environment`. Advisory.
    pub facing_mode: String,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:5000".to_string(),
            request_timeout_secs: 30,
            camera_device: "/dev/video0".to_string(),
            warmup_frames: 4,
            facing_mode: "user".to_string(),
            ideal_width: IDEAL_WIDTH,
            ideal_height: IDEAL_HEIGHT,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut config = match config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Override fields from `FACESTRESS_*` variables. Unparseable numbers keep the current value.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("FACESTRESS_SERVICE_URL") {
            self.service_url = v;
        }
        if let Some(v) = var("FACESTRESS_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = var("FACESTRESS_FACING_MODE") {
            self.facing_mode = v;
        }
        self.request_timeout_secs = parsed(&var, "FACESTRESS_REQUEST_TIMEOUT_SECS", self.request_timeout_secs);
        self.warmup_frames = parsed(&var, "FACESTRESS_WARMUP_FRAMES", self.warmup_frames);
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn constraints(&self) -> Result<CameraConstraints> {
        let facing: FacingMode = self
            .facing_mode
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        Ok(CameraConstraints {
            facing,
            ideal_width: self.ideal_width,
            ideal_height: self.ideal_height,
        })
    }
}

fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> T {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(current)
}

fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("FACESTRESS_CONFIG") {
        return Some(PathBuf::from(path));
    }
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok()?;
    Some(base.join("facestress").join("config.toml"))
}
