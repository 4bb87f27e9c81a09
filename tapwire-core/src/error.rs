//! Error types for tapwire-core.
//!
//! Errors are split by how the relay reacts to them:
//!
//! - [`DecodeSkip`] and [`PatchError`] are recovered locally: logged, the
//!   frame or delta is dropped, the run continues.
//! - [`ToolArgsDecodeError`] is reported for the one tool call, the run continues.
//! - [`ProtocolViolation`] is either tolerated (mismatched content ids) or
//!   fatal (lifecycle transitions); see [`ProtocolViolation::is_fatal`].
//! - [`RelayError`] is what ends a run abnormally.

use std::time::Duration;

use thiserror::Error;

use crate::events::EventType;
use crate::session::Lifecycle;

/// A state-delta operation could not be resolved against the document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// Path is not a valid RFC 6901 pointer.
    #[error("invalid JSON pointer `{path}`")]
    InvalidPointer { path: String },

    /// An intermediate segment does not exist.
    #[error("`{path}`: parent `{parent}` does not exist")]
    MissingParent { path: String, parent: String },

    /// The final segment does not exist (replace/remove).
    #[error("`{path}`: target does not exist")]
    MissingTarget { path: String },

    /// An intermediate or parent value is a scalar.
    #[error("`{path}`: `{parent}` is not an object or array")]
    NotAContainer { path: String, parent: String },

    /// A segment addressing an array is not a valid index.
    #[error("`{path}`: `{segment}` is not a valid array index")]
    InvalidIndex { path: String, segment: String },

    /// Index past the end of the array.
    #[error("`{path}`: index {index} out of bounds (len {len})")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },

    /// `remove` against the document root.
    #[error("the document root cannot be removed")]
    RootRemoval,

    /// A legacy delta could not be translated.
    #[error("legacy delta: {0}")]
    Legacy(String),
}

/// An event arrived that the run's lifecycle does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    /// The event is not legal in the current lifecycle state.
    #[error("{event} is not allowed while the run is {state}")]
    IllegalTransition { event: EventType, state: Lifecycle },

    /// Content or end for a message that is not the open one.
    #[error("{event} references message `{got}` but the open message is {}", describe_open(.open))]
    UnmatchedMessage {
        event: EventType,
        got: String,
        open: Option<String>,
    },

    /// Args or end for a tool call that is not the open one.
    #[error(
        "{event} references tool call `{got}` but the open tool call is {}",
        describe_open(.open)
    )]
    UnmatchedToolCall {
        event: EventType,
        got: String,
        open: Option<String>,
    },

    /// A lifecycle event names a different thread or run.
    #[error("{event} names {field} `{got}` but the session expects `{expected}`")]
    IdentityMismatch {
        event: EventType,
        field: &'static str,
        expected: String,
        got: String,
    },

    /// The run ended while a message or tool call was still open.
    #[error("run ended with {kind} `{id}` still open")]
    OpenAccumulator { kind: &'static str, id: String },
}

fn describe_open(open: &Option<String>) -> String {
    match open {
        Some(id) => format!("`{id}`"),
        None => "none".to_string(),
    }
}

impl ProtocolViolation {
    /// Fatal violations put the session in `Errored`; the rest are ignored
    /// after being reported.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolViolation::IllegalTransition { .. } | ProtocolViolation::IdentityMismatch { .. }
        )
    }
}

/// A candidate frame that could not be decoded and was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("skipped undecodable frame ({reason}): {payload}")]
pub struct DecodeSkip {
    /// The payload after prefix stripping, truncated for logging.
    pub payload: String,
    /// Parser message.
    pub reason: String,
}

impl DecodeSkip {
    const MAX_PAYLOAD: usize = 120;

    pub(crate) fn new(payload: &str, reason: impl ToString) -> Self {
        let payload = match payload.char_indices().nth(Self::MAX_PAYLOAD) {
            Some((cut, _)) => format!("{}…", &payload[..cut]),
            None => payload.to_string(),
        };
        Self {
            payload,
            reason: reason.to_string(),
        }
    }
}

/// Accumulated tool-call arguments were not valid JSON at `TOOL_CALL_END`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("arguments for tool call `{tool_call_id}` are not valid JSON: {reason}")]
pub struct ToolArgsDecodeError {
    /// The tool call whose arguments failed.
    pub tool_call_id: String,
    /// The raw concatenated argument string.
    pub raw: String,
    /// Parser message.
    pub reason: String,
}

/// Errors raised by an agent while producing events.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The agent could not handle the input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The agent failed while running.
    #[error("{0}")]
    Failed(String),
}

/// Errors that end a run abnormally or prevent it from starting.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A fatal lifecycle violation.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// An event could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The agent failed.
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    /// The transport closed before a terminal event.
    #[error("transport closed before the run ended")]
    TransportClosed,

    /// The transport failed while reading.
    #[error("transport error: {0}")]
    Transport(String),

    /// No frame arrived within the idle timeout.
    #[error("no event received within {0:?}")]
    IdleTimeout(Duration),

    /// Another run is active on the thread.
    #[error("thread `{thread_id}` already has active run `{active_run_id}`")]
    ThreadBusy {
        thread_id: String,
        active_run_id: String,
    },

    /// The requested agent is not registered.
    #[error("unknown agent `{name}`; valid agents are: {}", .available.join(", "))]
    UnknownAgent {
        name: String,
        available: Vec<String>,
    },
}

impl RelayError {
    /// Machine-readable code carried in the `RUN_ERROR` this error produces.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::Protocol(_) => "protocol_violation",
            RelayError::Serialization(_) => "serialization_error",
            RelayError::Agent(_) => "agent_error",
            RelayError::TransportClosed => "transport_closed",
            RelayError::Transport(_) => "transport_error",
            RelayError::IdleTimeout(_) => "idle_timeout",
            RelayError::ThreadBusy { .. } => "thread_busy",
            RelayError::UnknownAgent { .. } => "unknown_agent",
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Serialization(err.to_string())
    }
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
