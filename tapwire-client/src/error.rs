//! Error types for the tapwire client.

use thiserror::Error;

/// Errors that prevent a run from being read.
///
/// A run that starts and then ends badly is not an error here: it comes back
/// as a [`RunReport`](crate::RunReport) whose outcome says what happened.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with a non-success status.
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The WebSocket connection failed.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The request could not be encoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::WebSocket(err.to_string())
    }
}

impl ClientError {
    /// Whether the server refused the run because the thread was busy.
    pub fn is_thread_busy(&self) -> bool {
        matches!(self, ClientError::Status { status: 409, .. })
    }
}
