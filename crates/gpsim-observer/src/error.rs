//! Error types for the control API server.
//!
//! [`ApiError`] unifies all failure modes into a single enum that can be
//! converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gpsim_core::session::SessionError;

/// Errors that can occur in the control API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Start was requested without an open serial port.
    #[error("Serial port not open")]
    PortNotOpen,

    /// The serial device could not be opened.
    #[error("{0}")]
    PortOpen(String),

    /// The request was well-formed JSON but semantically invalid.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::PortNotOpen => Self::PortNotOpen,
            SessionError::PortOpen { .. } => Self::PortOpen(err.to_string()),
            SessionError::PortClose { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::PortNotOpen | Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::PortOpen(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
