//! Frame encoding: one [`Event`] to exactly one transport frame.
//!
//! Encoding is pure. Writing the frame to a socket or response body is the
//! caller's job, and each frame is emitted on its own, never batched.

use crate::error::RelayError;
use crate::events::Event;

/// Prefix of an SSE data line.
pub const SSE_DATA_PREFIX: &str = "data: ";

/// Headers every SSE run response carries.
pub const SSE_HEADERS: [(&str, &str); 3] = [
    ("content-type", "text/event-stream"),
    ("cache-control", "no-cache"),
    ("connection", "keep-alive"),
];

/// Transport framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// `data: <json>\n\n`.
    #[default]
    Sse,
    /// One WebSocket text message per event, bare JSON.
    WebSocket,
}

impl Framing {
    /// Encode one event for this framing.
    pub fn encode(self, event: &Event) -> Result<String, RelayError> {
        match self {
            Framing::Sse => encode_sse(event),
            Framing::WebSocket => encode_json(event),
        }
    }
}

/// Compact JSON body of a frame. This is also the WebSocket frame.
pub fn encode_json(event: &Event) -> Result<String, RelayError> {
    serde_json::to_string(event).map_err(RelayError::from)
}

/// Full SSE frame: `data: <json>\n\n`.
///
/// The JSON is produced here from the typed event, so a payload can never
/// already carry a `data: ` prefix.
pub fn encode_sse(event: &Event) -> Result<String, RelayError> {
    let json = encode_json(event)?;
    Ok(sse_frame(&json))
}

/// Wrap an already-encoded JSON payload as an SSE frame.
pub fn sse_frame(json: &str) -> String {
    let mut frame = String::with_capacity(SSE_DATA_PREFIX.len() + json.len() + 2);
    frame.push_str(SSE_DATA_PREFIX);
    frame.push_str(json);
    frame.push_str("\n\n");
    frame
}

#[cfg(test)]
#[path = "encoder_tests.rs"]
mod tests;
