use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{error::AppError, storage::types::stored_file::FileError};
use ingestion_pipeline::{intake::UploadError, validation::RejectionReason};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Serialize, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Upload rejected: {message}")]
    Rejected { code: String, message: String },
}

impl From<RejectionReason> for ApiError {
    fn from(reason: RejectionReason) -> Self {
        Self::Rejected {
            code: reason.code().to_string(),
            message: reason.to_string(),
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Rejected(reason) => reason.into(),
            UploadError::InvalidInput(msg) => Self::ValidationError(msg),
            UploadError::TooLarge(msg) => Self::PayloadTooLarge(msg),
            UploadError::App(err) => err.into(),
        }
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::Validation(msg) => Self::ValidationError(msg),
            AppError::Auth(msg) => Self::Unauthorized(msg),
            AppError::File(FileError::InvalidNamespace(msg)) => Self::ValidationError(msg),
            AppError::File(FileError::FileNotFound(path)) => {
                tracing::warn!(%path, "stored file missing");
                Self::NotFound("Stored file not found".to_string())
            }
            _ => {
                tracing::error!("Internal error: {:?}", err);
                Self::InternalError("Internal server error".to_string())
            }
        }
    }
}
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            Self::InternalError(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorResponse::new(message),
            ),
            Self::ValidationError(message) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(message),
            ),
            Self::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new(message),
            ),
            Self::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new(message),
            ),
            Self::PayloadTooLarge(message) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorResponse::new(message),
            ),
            Self::Rejected { code, message } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    code: Some(code),
                    ..ErrorResponse::new(message)
                },
            ),
        };

        (status, Json(error_response)).into_response()
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl ErrorResponse {
    fn new(error: String) -> Self {
        Self {
            error,
            status: "error".to_string(),
            code: None,
        }
    }
}
