use crate::services::transcoder::TranscodeError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use thiserror::Error;
use utoipa::ToSchema;

pub const NO_FILE_MESSAGE: &str = "No audio file provided";
pub const UNSUPPORTED_TYPE_MESSAGE: &str = "Invalid file type. Expected audio file or .oga format";
pub const PROCESSING_FAILED_MESSAGE: &str = "Failed to process audio";

/// JSON error body returned for every failed request.
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{}", NO_FILE_MESSAGE)]
    NoFileProvided,

    #[error("{}", UNSUPPORTED_TYPE_MESSAGE)]
    UnsupportedType,

    #[error("File too large. Maximum size is {max_mb}MB")]
    PayloadTooLarge { max_mb: usize },

    #[error("Invalid processing options: {0}")]
    InvalidOptions(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Engine(String),

    #[error("{0}")]
    MissingInput(String),
}

impl AppError {
    pub fn payload_too_large(max_bytes: usize) -> Self {
        AppError::PayloadTooLarge {
            max_mb: max_bytes / 1024 / 1024,
        }
    }

    /// Strips a directory prefix from engine diagnostics so scratch locations stay internal.
    pub fn redact_dir(self, dir: &Path) -> Self {
        let prefix = format!("{}{}", dir.display(), std::path::MAIN_SEPARATOR);
        match self {
            AppError::Engine(msg) => AppError::Engine(msg.replace(&prefix, "")),
            AppError::MissingInput(msg) => AppError::MissingInput(msg.replace(&prefix, "")),
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NoFileProvided
            | AppError::UnsupportedType
            | AppError::InvalidOptions(_)
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Io(_) | AppError::Engine(_) | AppError::MissingInput(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<TranscodeError> for AppError {
    fn from(err: TranscodeError) -> Self {
        match err {
            TranscodeError::MissingInput(_) => AppError::MissingInput(err.to_string()),
            TranscodeError::Io(e) => AppError::Io(e),
            other => AppError::Engine(other.details()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = if status.is_server_error() {
            tracing::error!("Error processing audio: {}", self);
            json!({
                "error": PROCESSING_FAILED_MESSAGE,
                "details": self.to_string(),
            })
        } else {
            tracing::warn!("Rejected request: {}", self);
            json!({
                "error": self.to_string()
            })
        };

        (status, Json(body)).into_response()
    }
}
