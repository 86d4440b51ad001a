use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::mcp::context::SessionId;

/// Session creation failures. These never become JSON-RPC envelopes; the
/// transport refuses to serve the session instead.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("handler init stopped: {reason}")]
    InitStopped { reason: String },
    #[error("handler rejected server capabilities ({code}): {message}")]
    CapabilitiesRejected { code: i64, message: String },
    #[error("handler violated its contract during {operation}")]
    ContractViolation { operation: &'static str },
}

/// Transport-level dispatch failures, reported outside of any envelope.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("session {session_id} has been terminated")]
    Terminated { session_id: SessionId },
    #[error("session {session_id} is no longer running")]
    Closed { session_id: SessionId },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {message}")]
    BadRequest {
        code: &'static str,
        message: &'static str,
    },
    #[error("not found: {message}")]
    NotFound {
        code: &'static str,
        message: &'static str,
    },
    #[error("session unavailable: {message}")]
    Unavailable { code: &'static str, message: String },
    #[error("dispatch timed out")]
    Timeout,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
}

impl AppError {
    pub fn bad_request(code: &'static str, message: &'static str) -> Self {
        Self::BadRequest { code, message }
    }

    pub fn not_found(code: &'static str, message: &'static str) -> Self {
        Self::NotFound { code, message }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        Self::Unavailable {
            code: "session_start_failed",
            message: err.to_string(),
        }
    }
}

impl From<ConnectionError> for AppError {
    fn from(_: ConnectionError) -> Self {
        Self::not_found("session_not_found", "session is closed")
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            Self::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, code, message.to_string())
            }
            Self::NotFound { code, message } => (StatusCode::NOT_FOUND, code, message.to_string()),
            Self::Unavailable { code, message } => {
                tracing::warn!(error = %message, "session could not be started");
                (StatusCode::SERVICE_UNAVAILABLE, code, message)
            }
            Self::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                "dispatch_timeout",
                "dispatch did not complete in time".to_string(),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                code: code.to_string(),
                message,
                details: json!({}),
            }),
        )
            .into_response()
    }
}
