//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Responses only echo caller-supplied identifiers, never store paths.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use depot_core::error::DepotError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g., "NOT_FOUND", "BAD_REQUEST").
    pub code: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed terminal id or tag (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing release or terminal subtree (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The store could not be read (403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Required server setting is missing (500, message shown).
    #[error("{0}")]
    NotConfigured(String),

    /// Anything else (500). Logged, not returned to the client.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::NotConfigured(_) => (StatusCode::INTERNAL_SERVER_ERROR, "NOT_CONFIGURED"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::NotConfigured(message) => message.clone(),
            other => other.to_string(),
        };

        match &self {
            Self::Internal(_) | Self::NotConfigured(_) => {
                tracing::error!(error = %self, "internal server error")
            }
            Self::Forbidden(_) => tracing::warn!(error = %self, "store access denied"),
            _ => {}
        }

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Generic mapping; handlers replace not-found messages with request context.
impl From<DepotError> for AppError {
    fn from(err: DepotError) -> Self {
        match err {
            DepotError::Validation { .. } => Self::BadRequest(err.to_string()),
            DepotError::NotFound(_) => Self::NotFound("artifact not found".to_string()),
            DepotError::Access { .. } => {
                tracing::warn!(error = %err, "permission denied reading artifact store");
                Self::Forbidden("permission denied reading artifact".to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}
