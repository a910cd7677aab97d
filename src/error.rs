use std::fmt;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::models::{Envelope, ErrorInfo};

/// Error returned by every fallible operation in the service. Carries the
/// HTTP status and a stable machine-readable code alongside the message, so
/// the handlers never have to re-classify failures.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "INVALID_INPUT",
            message: message.into(),
            details: None,
        }
    }

    /// yt-dlp exited non-zero or produced unusable output. `output` is the
    /// tool's combined stdout/stderr, kept verbatim for diagnostics.
    pub fn extraction_failed(message: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "EXTRACTION_FAILED",
            message: message.into(),
            details: Some(output.into()),
        }
    }

    pub fn download_failed(message: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "DOWNLOAD_FAILED",
            message: message.into(),
            details: Some(output.into()),
        }
    }

    pub fn upload_failed(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "UPLOAD_FAILED",
            message: message.into(),
            details: Some(details.into()),
        }
    }

    /// Deadline expired while waiting for a gate slot or for yt-dlp itself.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::REQUEST_TIMEOUT,
            code: "TIMEOUT",
            message: message.into(),
            details: None,
        }
    }

    pub fn storage_unavailable() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "SERVICE_UNAVAILABLE",
            message: "Object storage is not configured".to_string(),
            details: Some("Storage credentials are missing or invalid".to_string()),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR",
            message: message.into(),
            details: None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}: {} ({details})", self.code, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Envelope::<()>::failure(ErrorInfo {
            code: self.code,
            message: self.message,
            details: self.details,
        });

        (self.status, Json(body)).into_response()
    }
}
