use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

pub const DEFAULT_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Coarse classification of a failed gateway call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoConnectivity,
    Timeout,
    ConnectionError,
    NetworkError,
    ClientError,
    ServerError,
    ParseError,
    CredentialError,
    UnknownError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NoConnectivity => "NO_CONNECTIVITY",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::ConnectionError => "CONNECTION_ERROR",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::ClientError => "CLIENT_ERROR",
            ErrorCode::ServerError => "SERVER_ERROR",
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::CredentialError => "CREDENTIAL_ERROR",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Transient transport failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::Timeout | ErrorCode::ConnectionError | ErrorCode::NetworkError
        )
    }

    pub fn from_status(status: u16) -> Self {
        match status {
            400..=499 => ErrorCode::ClientError,
            500..=599 => ErrorCode::ServerError,
            _ => ErrorCode::UnknownError,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized failure of a gateway call.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    /// HTTP status when the backend answered.
    pub status: Option<u16>,
    /// Raw backend payload, for domain-specific inspection.
    pub details: Option<Value>,
    /// Network attempts made before giving up.
    pub attempts: u32,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            details: None,
            attempts: 0,
        }
    }

    pub fn no_connectivity() -> Self {
        Self::new(ErrorCode::NoConnectivity, "No internet connection")
    }

    pub fn credential(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::CredentialError, msg)
    }

    pub fn parse(msg: impl Into<String>, raw: Option<String>) -> Self {
        Self {
            details: raw.map(Value::String),
            ..Self::new(ErrorCode::ParseError, msg)
        }
    }

    /// Builds the error for a well-formed non-2xx response.
    pub fn from_response(status: u16, body: &str) -> Self {
        let details = if body.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str::<Value>(body).unwrap_or_else(|_| Value::String(body.to_string())))
        };

        let message = details
            .as_ref()
            .and_then(backend_message)
            .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string());

        Self {
            code: ErrorCode::from_status(status),
            message,
            status: Some(status),
            details,
            attempts: 0,
        }
    }

    pub fn from_transport(err: &reqwest::Error) -> Self {
        let code = if err.is_timeout() {
            ErrorCode::Timeout
        } else if err.is_connect() {
            ErrorCode::ConnectionError
        } else if err.is_decode() {
            ErrorCode::ParseError
        } else if err.is_request() || err.is_body() {
            ErrorCode::NetworkError
        } else {
            ErrorCode::UnknownError
        };

        Self::new(code, err.to_string())
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Message supplied by the backend itself, as opposed to a locally
    /// generated description.
    pub fn backend_message(&self) -> Option<String> {
        self.status?;
        self.details.as_ref().and_then(backend_message)
    }

    pub fn detail(&self, field: &str) -> Option<&Value> {
        self.details.as_ref()?.get(field)
    }
}

fn backend_message(details: &Value) -> Option<String> {
    ["message", "error"]
        .iter()
        .find_map(|field| details.get(field).and_then(Value::as_str))
        .filter(|message| !message.trim().is_empty())
        .map(str::to_string)
}

/// Failure of a domain operation, raised above the gateway.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Insufficient balance: {required} required, {balance} available")]
    InsufficientBalance { required: Decimal, balance: Decimal },

    #[error("Content Flagged: {reason}")]
    ContentModerationRejected { reason: String },

    #[error("{message}")]
    RequestFailed {
        message: String,
        #[source]
        cause: ApiError,
    },
}

impl DomainError {
    /// Wraps a gateway error, preferring the backend's own message.
    pub fn request_failed(cause: ApiError, default_message: &str) -> Self {
        let message = cause
            .backend_message()
            .unwrap_or_else(|| default_message.to_string());
        DomainError::RequestFailed { message, cause }
    }

    /// The underlying gateway error, when there is one.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            DomainError::RequestFailed { cause, .. } => Some(cause),
            _ => None,
        }
    }

    pub fn is_offline(&self) -> bool {
        self.api_error()
            .map(|e| e.code == ErrorCode::NoConnectivity)
            .unwrap_or(false)
    }
}
