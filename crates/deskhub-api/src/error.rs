//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps project store errors from `deskhub-core` to HTTP status codes and
//! returns JSON bodies with an error code and message. Internal and
//! upstream failure details are logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use deskhub_core::ProjectError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Inner error detail.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "VALIDATION_ERROR").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details, present only for client errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.into(),
                details: None,
            },
        }
    }
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Missing or invalid credentials (401).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not permitted (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request validation failed (422).
    #[error("validation error: {0}")]
    Validation(String),

    /// Request could not be processed as sent (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// File content is not displayable text (400).
    #[error("binary content: {0}")]
    Binary(String),

    /// Uploaded archive could not be extracted (400).
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Uploaded archive produced no files or directories (400).
    #[error("archive extracted but no files were found")]
    EmptyArchive,

    /// Request body exceeds the accepted size (413).
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// The completion API is unavailable or failed (500). The message is a
    /// fixed public text; details are logged where the failure happens.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Internal server error (500). Message is logged but not returned to client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Return the HTTP status code and machine-readable error code for this error.
    pub(crate) fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Binary(_) => (StatusCode::BAD_REQUEST, "BINARY_FILE"),
            Self::Extraction(_) => (StatusCode::BAD_REQUEST, "EXTRACTION_FAILED"),
            Self::EmptyArchive => (StatusCode::BAD_REQUEST, "EMPTY_ARCHIVE"),
            Self::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            Self::Upstream(_) => (StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_ERROR"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// The message shown to clients.
    fn public_message(&self) -> String {
        match self {
            Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::Validation(m)
            | Self::BadRequest(m)
            | Self::Binary(m)
            | Self::Extraction(m)
            | Self::PayloadTooLarge(m)
            | Self::Upstream(m) => m.clone(),
            Self::EmptyArchive => "ZIP extracted but no files found".to_string(),
            Self::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        match &self {
            Self::Internal(_) => tracing::error!(error = %self, "internal server error"),
            Self::Upstream(_) => tracing::error!(error = %self, "upstream request failed"),
            Self::Unauthorized(_) | Self::Forbidden(_) => {
                tracing::warn!(error = %self, "request rejected")
            }
            _ => {}
        }

        (status, Json(ErrorBody::new(code, self.public_message()))).into_response()
    }
}

/// Convert project store errors to API errors.
impl From<ProjectError> for AppError {
    fn from(err: ProjectError) -> Self {
        match err {
            ProjectError::NotFound(_) => Self::NotFound("File not found".into()),
            ProjectError::Validation(msg) => Self::Validation(msg),
            ProjectError::Binary(_) => {
                Self::Binary("File is binary and cannot be displayed".into())
            }
            ProjectError::Extraction(msg) => Self::Extraction(msg),
            ProjectError::EmptyArchive => Self::EmptyArchive,
            ProjectError::PayloadTooLarge { limit, .. } => Self::PayloadTooLarge(format!(
                "The file may not be greater than {} kilobytes",
                limit / 1024
            )),
            ProjectError::Storage(e) => Self::Internal(e.to_string()),
        }
    }
}

/// A blocking task that panicked or was cancelled.
impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("blocking task failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskhub_core::StorageError;
    use http_body_util::BodyExt;

    async fn response_parts(err: AppError) -> (StatusCode, ErrorBody) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        (status, body)
    }

    #[test]
    fn status_codes() {
        let cases = [
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::Validation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::Binary("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Extraction("x".into()), StatusCode::BAD_REQUEST),
            (AppError::EmptyArchive, StatusCode::BAD_REQUEST),
            (AppError::PayloadTooLarge("x".into()), StatusCode::PAYLOAD_TOO_LARGE),
            (AppError::Upstream("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.status_and_code().0, expected, "{err:?}");
        }
    }

    #[test]
    fn project_errors_map_to_kinds() {
        let not_found = AppError::from(ProjectError::NotFound("a.txt".into()));
        assert_eq!(not_found.status_and_code().1, "NOT_FOUND");

        let binary = AppError::from(ProjectError::Binary("img.png".into()));
        assert_eq!(binary.status_and_code().1, "BINARY_FILE");

        let too_large = AppError::from(ProjectError::PayloadTooLarge {
            size: 200 * 1024 * 1024,
            limit: 100 * 1024 * 1024,
        });
        assert_eq!(too_large.status_and_code().0, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(too_large.public_message().contains("102400"));

        let storage = AppError::from(ProjectError::Storage(StorageError::NotFound("k".into())));
        assert_eq!(storage.status_and_code().1, "INTERNAL_ERROR");
    }

    #[tokio::test]
    async fn into_response_not_found() {
        let (status, body) = response_parts(AppError::NotFound("File not found".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error.code, "NOT_FOUND");
        assert_eq!(body.error.message, "File not found");
        assert!(body.error.details.is_none());
    }

    #[tokio::test]
    async fn into_response_empty_archive() {
        let (status, body) = response_parts(AppError::EmptyArchive).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error.message, "ZIP extracted but no files found");
    }

    #[tokio::test]
    async fn into_response_internal_hides_details() {
        let (status, body) =
            response_parts(AppError::Internal("disk quota exceeded at /srv".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error.code, "INTERNAL_ERROR");
        assert!(!body.error.message.contains("/srv"));
        assert_eq!(body.error.message, "An internal error occurred");
    }

    #[tokio::test]
    async fn into_response_upstream_shows_only_public_text() {
        let (status, body) =
            response_parts(AppError::Upstream("Failed to get response from AI".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error.code, "UPSTREAM_ERROR");
        assert_eq!(body.error.message, "Failed to get response from AI");
    }

    #[test]
    fn error_body_skips_absent_details() {
        let json = serde_json::to_string(&ErrorBody::new("TEST", "test message")).unwrap();
        assert!(json.contains("TEST"));
        assert!(!json.contains("details"));
    }
}
