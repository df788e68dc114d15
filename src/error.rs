use http::StatusCode;
use thiserror::Error;

use crate::experiments::ingest::IngestError;
use crate::experiments::significance::InvalidInputError;

#[derive(Error, Debug, Clone)]
pub enum AbTestError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Ingest error: {0}")]
    Ingest(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
}

pub type Result<T> = std::result::Result<T, AbTestError>;

impl From<InvalidInputError> for AbTestError {
    fn from(e: InvalidInputError) -> Self {
        AbTestError::InvalidInput(e.to_string())
    }
}

impl From<IngestError> for AbTestError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::Csv(msg) => AbTestError::Csv(msg),
            IngestError::Io(msg) => AbTestError::Io(msg),
            other => AbTestError::Ingest(other.to_string()),
        }
    }
}

impl From<std::io::Error> for AbTestError {
    fn from(e: std::io::Error) -> Self {
        AbTestError::Io(e.to_string())
    }
}

impl From<csv::Error> for AbTestError {
    fn from(e: csv::Error) -> Self {
        AbTestError::Csv(e.to_string())
    }
}

impl From<serde_json::Error> for AbTestError {
    fn from(e: serde_json::Error) -> Self {
        AbTestError::Json(e.to_string())
    }
}

impl AbTestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AbTestError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AbTestError::Ingest(_) => StatusCode::BAD_REQUEST,
            AbTestError::Csv(_) => StatusCode::BAD_REQUEST,
            AbTestError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AbTestError::Json(_) => StatusCode::BAD_REQUEST,
            AbTestError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AbTestError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    /// Stable machine-readable code used in HTTP error bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            AbTestError::InvalidInput(_) => "invalid_input",
            AbTestError::Ingest(_) => "ingest_error",
            AbTestError::Csv(_) => "csv_error",
            AbTestError::Io(_) => "io_error",
            AbTestError::Json(_) => "json_error",
            AbTestError::Config(_) => "config_error",
            AbTestError::PayloadTooLarge(_) => "payload_too_large",
        }
    }
}


// Axum IntoResponse implementation (feature-gated)
#[cfg(feature = "axum-support")]
use axum::response::{IntoResponse, Json, Response};
#[cfg(feature = "axum-support")]
use serde::Serialize;

#[cfg(feature = "axum-support")]
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[cfg(feature = "axum-support")]
impl IntoResponse for AbTestError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let suggestion = match &self {
            AbTestError::InvalidInput(_) => Some(
                "Each group needs visitors > 0 and conversions <= visitors; alpha must be in (0, 1)"
                    .to_string(),
            ),
            AbTestError::Ingest(_) => Some(
                "Check groupColumn/resultColumn and that the data has exactly two groups"
                    .to_string(),
            ),
            _ => None,
        };

        tracing::debug!(status = %status, error = %self, "request failed");

        let body = ErrorResponse {
            error: self.error_code().to_string(),
            message: self.to_string(),
            request_id: format!("req_ab_{}", uuid::Uuid::new_v4()),
            suggestion,
        };
        (status, Json(body)).into_response()
    }
}
