//! Error types surfaced by the relay.
//!
//! [`BackendError`] covers everything that can go wrong talking to Ollama.
//! [`RelayError`] is what handlers return; it maps onto HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Failure while communicating with the inference backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed backend payload: {0}")]
    Malformed(String),

    #[error("backend stream idle for more than {0}s")]
    IdleTimeout(u64),
}

/// Error returned by relay operations.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Conversation ID already exists")]
    ConversationExists(String),

    #[error("Conversation not found")]
    ConversationNotFound(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::ConversationExists(_) => StatusCode::BAD_REQUEST,
            RelayError::ConversationNotFound(_) => StatusCode::NOT_FOUND,
            RelayError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message placed in the `detail` field of the error body.
    pub fn detail(&self) -> String {
        match self {
            RelayError::Backend(e) => format!("Error communicating with Ollama: {e}"),
            other => other.to_string(),
        }
    }
}

/// JSON error body: `{"detail": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        if let RelayError::Backend(ref e) = self {
            tracing::warn!(error = %e, "Backend call failed");
        }
        let body = ErrorBody {
            detail: self.detail(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
