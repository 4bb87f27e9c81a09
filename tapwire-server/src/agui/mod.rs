//! AG-UI transport endpoints.
//!
//! Both transports carry the same frames produced by
//! [`Relay::stream`](tapwire_core::Relay::stream):
//!
//! | Endpoint | Request | Response |
//! |----------|---------|----------|
//! | SSE | `POST` JSON `RunAgentInput` | `text/event-stream`, one `data: <json>\n\n` per event |
//! | WebSocket | one text message per `RunAgentInput` | one text message per event |
//!
//! A request that cannot start a run is answered in the transport's own
//! error form: a JSON error body on SSE, a single `RUN_ERROR` message on
//! WebSocket.

pub mod handler;
pub mod websocket;
