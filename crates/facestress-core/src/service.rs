//! Remote analysis service: contract, response validation, HTTP client.

use crate::types::{AnalysisResult, AuValue, CandidateImage, SCORE_MAX};
use reqwest::multipart;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Multipart field carrying an uploaded file.
pub const IMAGE_FIELD: &str = "image";
/// JSON field carrying a captured data URI.
pub const IMAGE_DATA_FIELD: &str = "imageData";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("no image to analyze")]
    NoImage,
    /// The service answered and said no.
    #[error("{0}")]
    Service(String),
    /// The service could not be reached or answered with garbage.
    #[error("error analyzing image, please try again")]
    Transport(#[source] TransportError),
}

impl AnalysisError {
    pub fn service(message: Option<String>) -> Self {
        match message {
            Some(m) if !m.trim().is_empty() => Self::Service(m),
            _ => Self::Service("analysis failed".into()),
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::Transport(TransportError::Malformed(detail.into()))
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for AnalysisError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.into())
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(e: serde_json::Error) -> Self {
        Self::Transport(e.into())
    }
}

/// One round trip to the analysis backend.
pub trait AnalysisService: Send + Sync {
    fn analyze(
        &self,
        candidate: &CandidateImage,
    ) -> impl Future<Output = Result<AnalysisResult, AnalysisError>> + Send;
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    success: bool,
    score: Option<f64>,
    interpretation: Option<String>,
    au_values: Option<serde_json::Map<String, serde_json::Value>>,
    /// Usually a string; anything else gets the generic message.
    error: Option<serde_json::Value>,
}

/// Validate a service response body.
///
/// `success:false` becomes [`AnalysisError::Service`]. A success payload with
/// missing or out-of-range fields is treated as a transport failure.
pub fn parse_response(body: &str) -> Result<AnalysisResult, AnalysisError> {
    let wire: WireResponse = serde_json::from_str(body)?;

    if !wire.success {
        let message = wire.error.as_ref().and_then(|e| e.as_str()).map(str::to_owned);
        return Err(AnalysisError::service(message));
    }

    let score = wire
        .score
        .ok_or_else(|| AnalysisError::malformed("missing score"))?;
    if !score.is_finite() || !(0.0..=SCORE_MAX).contains(&score) {
        return Err(AnalysisError::malformed(format!(
            "score {score} outside 0..={SCORE_MAX}"
        )));
    }

    let interpretation = wire
        .interpretation
        .ok_or_else(|| AnalysisError::malformed("missing interpretation"))?;

    let raw = wire
        .au_values
        .ok_or_else(|| AnalysisError::malformed("missing au_values"))?;
    let mut au_values = Vec::with_capacity(raw.len());
    for (name, value) in raw {
        let value = value
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| AnalysisError::malformed(format!("{name} is not a number")))?;
        au_values.push(AuValue { name, value });
    }

    Ok(AnalysisResult {
        score,
        interpretation,
        au_values,
    })
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    #[serde(default)]
    pub model_loaded: bool,
}

/// reqwest-backed client for a `POST /analyze` endpoint.
#[derive(Clone)]
pub struct HttpAnalysisService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAnalysisService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn analyze_url(&self) -> String {
        format!("{}/analyze", self.base_url)
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }

    pub async fn health(&self) -> Result<ServiceHealth, TransportError> {
        let body = self.client.get(self.health_url()).send().await?.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    fn build_request(&self, candidate: &CandidateImage) -> Result<reqwest::RequestBuilder, AnalysisError> {
        let request = self.client.post(self.analyze_url());
        Ok(match candidate {
            CandidateImage::Blob {
                file_name,
                media_type,
                bytes,
            } => {
                let part = multipart::Part::bytes(bytes.clone())
                    .file_name(file_name.clone())
                    .mime_str(media_type)?;
                request.multipart(multipart::Form::new().part(IMAGE_FIELD, part))
            }
            CandidateImage::DataUri(uri) => request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .json(&serde_json::json!({ IMAGE_DATA_FIELD: uri.as_str() })),
        })
    }
}

impl AnalysisService for HttpAnalysisService {
    async fn analyze(&self, candidate: &CandidateImage) -> Result<AnalysisResult, AnalysisError> {
        let start = std::time::Instant::now();
        let response = self.build_request(candidate)?.send().await?;
        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(
            status = %status,
            bytes = body.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "analysis response received"
        );

        // The service reports its own failures as JSON on 4xx/5xx.
        parse_response(&body)
    }
}
