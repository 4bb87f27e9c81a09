//! Error types for the tapwire server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tapwire_core::RelayError;

/// Errors that can occur when building a router.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// No endpoints were configured.
    #[error("No endpoints configured. Call .with_sse() or .with_websocket() before .build()")]
    NoEndpoints,

    /// No agents were registered.
    #[error("No agents registered. Call .with_agent() before .build()")]
    NoAgents,

    /// The default agent is not registered.
    #[error("Default agent `{0}` is not registered")]
    UnknownDefault(String),
}

/// Errors returned by the HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// A run could not be started.
    #[error("{0}")]
    Relay(#[from] RelayError),

    /// Invalid request from client.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ServerError {
    /// The HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Relay(RelayError::UnknownAgent { .. }) => StatusCode::BAD_REQUEST,
            ServerError::Relay(RelayError::ThreadBusy { .. }) => StatusCode::CONFLICT,
            ServerError::Relay(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = Json(serde_json::json!({
            "error": self.to_string(),
            "code": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
