use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Largest file accepted by [`crate::InputSourceController::select_file`] (16 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 16 * 1024 * 1024;

/// Upper bound of the analysis score scale.
pub const SCORE_MAX: f64 = 10.0;

/// Which visual surface is authoritative. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InputMode {
    /// Placeholder, nothing selected.
    #[default]
    Empty,
    /// A still image (uploaded file or captured frame) is shown.
    StaticPreview,
    /// The live camera feed is shown.
    CameraLive,
}

/// A file the user picked, validated before its bytes are read.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    /// Declared media type, e.g. `image/png`.
    pub media_type: String,
    pub size: u64,
    source: FileSource,
}

#[derive(Debug, Clone)]
enum FileSource {
    Path(PathBuf),
    Memory(Vec<u8>),
}

impl SelectedFile {
    /// Describe a file on disk. The media type is declared from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let meta = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            name,
            media_type: media_type_for_path(path),
            size: meta.len(),
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// Wrap bytes already in memory, with an explicitly declared media type.
    pub fn from_bytes(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            size: bytes.len() as u64,
            source: FileSource::Memory(bytes),
        }
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    pub(crate) async fn read(self) -> std::io::Result<Vec<u8>> {
        match self.source {
            FileSource::Path(path) => tokio::fs::read(path).await,
            FileSource::Memory(bytes) => Ok(bytes),
        }
    }
}

/// Media type declared by a path's extension, `application/octet-stream` if unknown.
pub fn media_type_for_path(path: &Path) -> String {
    image::ImageFormat::from_path(path)
        .map(|f| f.to_mime_type().to_string())
        .unwrap_or_else(|_| "application/octet-stream".to_string())
}

/// A `data:<mime>;base64,<payload>` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri(String);

impl DataUri {
    pub fn encode(media_type: &str, bytes: &[u8]) -> Self {
        let payload = base64::engine::general_purpose::STANDARD.encode(bytes);
        Self(format!("data:{media_type};base64,{payload}"))
    }

    pub fn media_type(&self) -> &str {
        let header = self.0.split_once(',').map_or("", |(h, _)| h);
        header
            .trim_start_matches("data:")
            .trim_end_matches(";base64")
    }

    #[cfg(test)]
    pub(crate) fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        let payload = self.0.split_once(',').map_or("", |(_, p)| p);
        base64::engine::general_purpose::STANDARD.decode(payload)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The single image currently eligible for submission.
#[derive(Debug, Clone, PartialEq)]
pub enum CandidateImage {
    /// An uploaded file, sent as multipart.
    Blob {
        file_name: String,
        media_type: String,
        bytes: Vec<u8>,
    },
    /// A captured camera frame, sent as JSON.
    DataUri(DataUri),
}

impl CandidateImage {
    pub fn media_type(&self) -> &str {
        match self {
            Self::Blob { media_type, .. } => media_type,
            Self::DataUri(uri) => uri.media_type(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Blob { .. } => "blob",
            Self::DataUri(_) => "data-uri",
        }
    }
}

/// One named Action Unit intensity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuValue {
    pub name: String,
    pub value: f64,
}

/// Validated success payload from the analysis service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Score in `[0, SCORE_MAX]`.
    pub score: f64,
    pub interpretation: String,
    /// Unique names, in the order the service sent them.
    pub au_values: Vec<AuValue>,
}

/// Result of one analysis request.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Success(AnalysisResult),
    Failure(String),
}

impl AnalysisOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}
