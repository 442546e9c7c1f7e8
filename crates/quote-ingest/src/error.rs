//! Error types for the ingestion service
//!
//! Each pipeline stage has its own classified error enum. The crate-level
//! [`Error`] wraps them together with validation, admission, and catch-all
//! variants, and renders the structured JSON failure body.

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::pipeline::Stage;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Blob store failures
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    /// Target bucket/container does not exist or cannot be reached
    #[error("storage container unavailable: {0}")]
    StoreUnavailable(String),

    /// Transfer failed
    #[error("upload transfer failed: {0}")]
    IoFailure(String),

    /// Upload exceeded its deadline
    #[error("upload timed out after {0}s")]
    Timeout(u64),
}

impl UploadError {
    /// Stable identifier used in responses and logs
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::StoreUnavailable(_) => "store_unavailable",
            UploadError::IoFailure(_) => "io_failure",
            UploadError::Timeout(_) => "timeout",
        }
    }
}

/// Classified extraction failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionErrorKind {
    RateLimited,
    ServerFault,
    AuthFailure,
    Unclassified,
}

impl ExtractionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionErrorKind::RateLimited => "rate_limited",
            ExtractionErrorKind::ServerFault => "server_fault",
            ExtractionErrorKind::AuthFailure => "auth_failure",
            ExtractionErrorKind::Unclassified => "unclassified",
        }
    }

    /// Whether the extraction client may retry this kind.
    ///
    /// Unclassified errors are retried as possibly transient. This can
    /// replay permanent rejections (e.g. a malformed payload) until the
    /// retry budget runs out.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ExtractionErrorKind::AuthFailure)
    }
}

/// Extraction service failures
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    /// Service answered 429
    #[error("extraction service rate limited the request: {0}")]
    RateLimited(String),

    /// Service answered 5xx
    #[error("extraction service error (HTTP {status}): {message}")]
    ServerFault { status: u16, message: String },

    /// Service answered 401/403
    #[error("extraction service rejected credentials (HTTP {status}): {message}")]
    AuthFailure { status: u16, message: String },

    /// Anything else: transport errors, attempt timeouts, 4xx, bad bodies
    #[error("extraction failed: {0}")]
    Unclassified(String),
}

impl ExtractionError {
    /// Classify an HTTP error status from the extraction service
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => ExtractionError::RateLimited(message),
            401 | 403 => ExtractionError::AuthFailure { status, message },
            500..=599 => ExtractionError::ServerFault { status, message },
            _ => ExtractionError::Unclassified(format!("HTTP {}: {}", status, message)),
        }
    }

    pub fn kind(&self) -> ExtractionErrorKind {
        match self {
            ExtractionError::RateLimited(_) => ExtractionErrorKind::RateLimited,
            ExtractionError::ServerFault { .. } => ExtractionErrorKind::ServerFault,
            ExtractionError::AuthFailure { .. } => ExtractionErrorKind::AuthFailure,
            ExtractionError::Unclassified(_) => ExtractionErrorKind::Unclassified,
        }
    }
}

/// Record store failures
#[derive(Debug, Clone, Error)]
pub enum PersistError {
    /// Store (project/database/collection) cannot be reached
    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),

    /// Insert was attempted and rejected or failed midway
    #[error("record write failed: {0}")]
    WriteFailure(String),
}

impl PersistError {
    pub fn kind(&self) -> &'static str {
        match self {
            PersistError::StoreUnavailable(_) => "store_unavailable",
            PersistError::WriteFailure(_) => "write_failure",
        }
    }
}

/// Ingestion service errors
#[derive(Debug, Error)]
pub enum Error {
    /// Bad, missing, or malformed input
    #[error("Invalid upload: {0}")]
    Validation(String),

    /// Payload larger than the configured ceiling
    #[error("File too large: {size} bytes (limit {limit} bytes)")]
    PayloadTooLarge { size: u64, limit: u64 },

    /// Caller exceeded its admission quota
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    AdmissionRejected { retry_after_secs: u64 },

    /// Blob store stage failed
    #[error("Upload stage failed: {0}")]
    Upload(#[from] UploadError),

    /// Extraction stage failed
    #[error("Extraction stage failed: {0}")]
    Extraction(#[from] ExtractionError),

    /// Record store stage failed
    #[error("Persist stage failed: {0}")]
    Persist(#[from] PersistError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Response category, one per failure class
    pub fn category(&self) -> &'static str {
        match self {
            Error::Validation(_) | Error::PayloadTooLarge { .. } => "validation_error",
            Error::AdmissionRejected { .. } => "admission_rejected",
            Error::Upload(_) => "upload_error",
            Error::Extraction(_) => "extraction_error",
            Error::Persist(_) => "persist_error",
            Error::Config(_) | Error::Internal(_) => "unexpected_error",
        }
    }

    /// Pipeline stage that produced the error, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Upload(_) => Some(Stage::Upload),
            Error::Extraction(_) => Some(Stage::Extract),
            Error::Persist(_) => Some(Stage::Persist),
            _ => None,
        }
    }

    /// Stage-specific classification, if any
    pub fn kind(&self) -> Option<&'static str> {
        match self {
            Error::Upload(e) => Some(e.kind()),
            Error::Extraction(e) => Some(e.kind().as_str()),
            Error::Persist(e) => Some(e.kind()),
            _ => None,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::AdmissionRejected { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::Upload(UploadError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            Error::Upload(_) => StatusCode::BAD_GATEWAY,
            Error::Extraction(ExtractionError::RateLimited(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Extraction(_) => StatusCode::BAD_GATEWAY,
            Error::Persist(_) => StatusCode::BAD_GATEWAY,
            Error::Config(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn headline(&self) -> String {
        match self {
            Error::Validation(msg) => msg.clone(),
            Error::PayloadTooLarge { .. } => "File too large.".to_string(),
            Error::AdmissionRejected { .. } => {
                "Too many requests, please try again later.".to_string()
            }
            Error::Upload(_) => "Error uploading file".to_string(),
            Error::Extraction(_) => "Error processing with Gemini".to_string(),
            Error::Persist(_) => "Error saving to database".to_string(),
            Error::Config(_) | Error::Internal(_) => "Unexpected error".to_string(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(format!("JSON error: {}", err))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        let details = match &self {
            Error::Config(msg) | Error::Internal(msg) => {
                tracing::error!(detail = %msg, "unexpected error");
                msg.clone()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": self.headline(),
            "category": self.category(),
            "stage": self.stage().map(|s| s.as_str()),
            "kind": self.kind(),
            "details": details,
        }));

        let mut response = (status, body).into_response();
        if let Error::AdmissionRejected { retry_after_secs } = &self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}
