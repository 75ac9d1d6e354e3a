//! # Centralized Error Handling
//!
//! This module provides a unified error handling system for the application.
//! It centralizes error logging and HTTP response generation, eliminating
//! repetitive error handling patterns throughout the codebase.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::services::naming::ResolveError;
use crate::services::storage::QuotaExceeded;
use crate::services::upload::UploadError;
use crate::utils::constant::BYTES_PER_MB;

/// Central application error type that encompasses all possible error conditions.
///
/// This enum provides a unified way to handle errors across the application,
/// with automatic conversion to appropriate HTTP responses. _Db and Io errors are
/// logged automatically, while other errors should be logged at the point of
/// creation if needed._
#[derive(Error, Debug)]
pub enum AppError {
    #[error("database error")]
    Db(#[from] sqlx::Error),

    #[error("io error")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(&'static str),

    #[error("bad request: {0}")]
    BadRequest(&'static str),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage quota exceeded")]
    QuotaExceeded(QuotaExceeded),

    #[error("payload too large")]
    PayloadTooLarge { limit: usize },

    #[error("internal server error")]
    Internal,
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    headroom_bytes: Option<u64>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Db(e) => error!(?e, "Database error occurred"),
            AppError::Io(e) => error!(?e, "Filesystem error occurred"),
            _ => {}
        }

        let mut headroom_bytes = None;
        let (status, message) = match self {
            AppError::Db(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string()),
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.to_string()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.to_string()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.to_string()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::QuotaExceeded(quota) => {
                headroom_bytes = Some(quota.headroom());
                (
                    StatusCode::INSUFFICIENT_STORAGE,
                    format!(
                        "Adding these files would exceed the total storage limit ({} MB). Approximately {} MB remaining.",
                        quota.ceiling / BYTES_PER_MB,
                        quota.headroom() / BYTES_PER_MB
                    ),
                )
            }
            AppError::PayloadTooLarge { limit } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                format!(
                    "The total size of the selected files exceeds the limit ({} MB). Please select fewer files or smaller images.",
                    limit as u64 / BYTES_PER_MB
                ),
            ),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(ErrorBody {
            message,
            headroom_bytes,
        });
        (status, body).into_response()
    }
}

impl From<UploadError> for AppError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Invalid(msg) => AppError::Validation(msg),
            UploadError::Quota(quota) => AppError::QuotaExceeded(quota),
            UploadError::Resolve(ResolveError::Conflict { original, .. }) => AppError::Conflict(
                format!("Filename '{original}' conflicts, and renaming failed."),
            ),
            UploadError::Resolve(ResolveError::InvalidName(original)) => {
                AppError::Validation(format!("Invalid filename '{original}'"))
            }
            UploadError::Resolve(ResolveError::Registry(e)) => AppError::Db(e),
            UploadError::Resolve(ResolveError::Io(e)) => AppError::Io(e),
            UploadError::DuplicateTitle(title) => {
                AppError::Conflict(format!("An album titled '{title}' already exists."))
            }
            UploadError::Db(e) => AppError::Db(e),
            UploadError::Io(e) => AppError::Io(e),
        }
    }
}

/// Convenience Result type alias that uses AppError as the error type.
pub type AppResult<T> = Result<T, AppError>;
