//! # tapwire-core
//!
//! Transport-agnostic core of an AG-UI event relay: the event model, SSE and
//! WebSocket frame codecs, the per-run lifecycle state machine, and the
//! per-thread state reducer.
//!
//! ## Producing a run
//!
//! ```ignore
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use tapwire_core::{agents::EchoAgent, Framing, InputMessage, Relay, RunAgentInput};
//!
//! # async fn example() -> tapwire_core::Result<()> {
//! let relay = Relay::default();
//! let input = RunAgentInput::new("t1").with_message(InputMessage::user("u1", "hi"));
//!
//! let mut frames = relay.stream(Arc::new(EchoAgent::new()), input, Framing::Sse)?;
//! while let Some(frame) = frames.next().await {
//!     print!("{frame}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Consuming a run
//!
//! Feed transport bytes to a [`FrameDecoder`] (or wrap a byte stream with
//! [`decode_stream`]) and hand each decoded [`Event`] to a [`RunSession`].
//! The session assembles messages and tool calls and applies state events
//! to the thread's [`StateHandle`].
//!
//! ## Feature Flags
//!
//! - `test-utils` - [`test_utils::ScriptedAgent`] for driving the relay in tests

pub mod agent;
pub mod agents;
pub mod classify;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod events;
pub mod patch;
pub mod reducer;
pub mod relay;
pub mod session;
pub mod thread;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use agent::{Agent, AgentInfo, AgentRegistry, EventStream, InputMessage, RunAgentInput};
pub use decoder::{decode_line, decode_message, decode_stream, FrameDecoder};
pub use encoder::{encode_json, encode_sse, Framing, SSE_DATA_PREFIX, SSE_HEADERS};
pub use error::{
    AgentError, DecodeSkip, PatchError, ProtocolViolation, RelayError, Result,
    ToolArgsDecodeError,
};
pub use events::{Event, EventType, Role};
pub use patch::{PatchOp, Pointer};
pub use reducer::{StateDocument, StateHandle};
pub use relay::{FrameStream, Relay, RelayConfig};
pub use session::{
    AssembledMessage, AssembledToolCall, Lifecycle, RunOutcome, RunSession, SessionUpdate,
};
pub use thread::{RunGuard, ThreadRegistry};
