use std::path::Path;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::api::client::{ApiClient, MultipartBody, RequestBody};
use crate::api::error::{ApiError, DomainError};
use crate::api::types::Recording;

const CONTENT_FLAG_MARKER: &str = "Content Flagged";
const ANALYZE_FAILED: &str = "Failed to analyze recording. Please try again.";

/// Audio file attached to an analysis request.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime: String,
}

impl AudioUpload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            file_name: "recording.m4a".to_string(),
            mime: "audio/m4a".to_string(),
        }
    }

    /// Reads a recording from disk. Accepts plain paths and `file://` URIs.
    pub async fn from_path(location: &str) -> crate::error::Result<Self> {
        let path = Path::new(location.strip_prefix("file://").unwrap_or(location));
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::new(bytes))
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }
}

pub struct RecordingsApi {
    client: Arc<ApiClient>,
}

impl RecordingsApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// Uploads audio for analysis. Billing and moderation refusals come back
    /// as their own [`DomainError`] variants.
    pub async fn analyze_recording(&self, audio: AudioUpload, duration: f64) -> Result<Recording, DomainError> {
        info!("Submitting {} bytes of audio ({}s) for analysis", audio.bytes.len(), duration);

        let body = MultipartBody::new()
            .file("audio", audio.file_name, audio.mime, audio.bytes)
            .text("duration", duration.to_string());

        self.client
            .post::<Recording>("/speech/analyze", RequestBody::Multipart(body))
            .await
            .map_err(classify_analyze_error)
    }

    pub async fn get_recordings(&self) -> Result<Vec<Recording>, DomainError> {
        self.client
            .get("/speech/recordings")
            .await
            .map_err(|e| DomainError::request_failed(e, "Failed to fetch recordings"))
    }

    pub async fn get_recording(&self, id: &str) -> Result<Recording, DomainError> {
        self.client
            .get(&format!("/speech/recordings/{}", id))
            .await
            .map_err(|e| DomainError::request_failed(e, "Failed to fetch recording"))
    }

    pub async fn delete_recording(&self, id: &str) -> Result<(), DomainError> {
        self.client
            .delete::<Value>(&format!("/speech/recordings/{}", id))
            .await
            .map(|_| ())
            .map_err(|e| DomainError::request_failed(e, "Failed to delete recording"))
    }
}

fn classify_analyze_error(err: ApiError) -> DomainError {
    match err.status {
        Some(402) => {
            let required = decimal_field(&err, "required");
            let balance = decimal_field(&err, "balance");
            match (required, balance) {
                (Some(required), Some(balance)) => {
                    warn!("Analysis refused: {} required, balance {}", required, balance);
                    return DomainError::InsufficientBalance { required, balance };
                }
                _ => warn!("402 response without required/balance fields"),
            }
        }
        Some(400) => {
            if let Some(message) = err.backend_message().filter(|m| m.contains(CONTENT_FLAG_MARKER)) {
                warn!("Recording rejected by moderation: {}", message);
                return DomainError::ContentModerationRejected {
                    reason: moderation_reason(&message),
                };
            }
        }
        _ => {}
    }

    error!("Error analyzing recording: {}", err);
    DomainError::request_failed(err, ANALYZE_FAILED)
}

fn decimal_field(err: &ApiError, field: &str) -> Option<Decimal> {
    let value = err.detail(field)?;
    serde_json::from_value(value.clone()).ok()
}

fn moderation_reason(message: &str) -> String {
    message
        .split_once(&format!("{}:", CONTENT_FLAG_MARKER))
        .map(|(_, reason)| reason.trim())
        .filter(|reason| !reason.is_empty())
        .unwrap_or(message)
        .to_string()
}
