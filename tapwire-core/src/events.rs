//! AG-UI protocol event types.
//!
//! One [`Event`] is one frame on the wire. Events serialize as compact JSON
//! objects with a `type` tag in SCREAMING_SNAKE_CASE and snake_case fields.
//! The camelCase field spellings emitted by the upstream AG-UI SDKs are
//! accepted on decode.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::patch::PatchOp;

/// AG-UI protocol events.
///
/// Decode frames with [`Event::decode`] rather than `serde_json::from_str`:
/// only `decode` maps unknown event types onto [`Event::Custom`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    // ===== Lifecycle Events =====
    /// Agent run started.
    RunStarted {
        /// Thread ID for conversation continuity.
        #[serde(alias = "threadId")]
        thread_id: String,
        /// Unique run ID for this execution.
        #[serde(alias = "runId")]
        run_id: String,
    },

    /// Agent run finished successfully.
    RunFinished {
        /// Thread ID for conversation continuity.
        #[serde(alias = "threadId")]
        thread_id: String,
        /// Unique run ID for this execution.
        #[serde(alias = "runId")]
        run_id: String,
    },

    /// Agent run failed with an error.
    RunError {
        /// Thread the failed run belonged to.
        #[serde(default, alias = "threadId")]
        thread_id: String,
        /// The failed run.
        #[serde(default, alias = "runId")]
        run_id: String,
        /// Error message describing the failure.
        #[serde(alias = "message")]
        error: String,
        /// Optional error code.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    // ===== Text Message Events =====
    /// Start of a new text message.
    TextMessageStart {
        /// Unique message ID.
        #[serde(alias = "messageId")]
        message_id: String,
        /// Role of the message author.
        role: Role,
    },

    /// Incremental content for a text message.
    TextMessageContent {
        /// Message ID this content belongs to.
        #[serde(alias = "messageId")]
        message_id: String,
        /// Text delta to append.
        delta: String,
    },

    /// End of a text message.
    TextMessageEnd {
        /// Message ID that is complete.
        #[serde(alias = "messageId")]
        message_id: String,
    },

    // ===== Tool Call Events =====
    /// Start of a tool call.
    ToolCallStart {
        /// Unique tool call ID.
        #[serde(alias = "toolCallId")]
        tool_call_id: String,
        /// Name of the tool being called.
        #[serde(alias = "toolCallName")]
        tool_call_name: String,
        /// Optional parent message ID.
        #[serde(
            default,
            alias = "parentMessageId",
            skip_serializing_if = "Option::is_none"
        )]
        parent_message_id: Option<String>,
    },

    /// Incremental arguments for a tool call.
    ToolCallArgs {
        /// Tool call ID this belongs to.
        #[serde(alias = "toolCallId")]
        tool_call_id: String,
        /// Raw fragment of the JSON-encoded arguments object.
        delta: String,
    },

    /// End of tool call arguments.
    ToolCallEnd {
        /// Tool call ID that is complete.
        #[serde(alias = "toolCallId")]
        tool_call_id: String,
    },

    // ===== State Management Events =====
    /// Complete state snapshot.
    StateSnapshot {
        /// The complete state document.
        snapshot: Value,
    },

    /// Incremental state update (JSON Patch).
    StateDelta {
        /// JSON Patch operations (RFC 6902), applied in order.
        delta: Vec<PatchOp>,
    },

    // ===== Extension Events =====
    /// Application-defined event, also the landing spot for unknown event types.
    #[serde(rename = "CUSTOM_EVENT", alias = "CUSTOM")]
    Custom {
        /// Event name.
        name: String,
        /// Arbitrary payload.
        #[serde(default, alias = "value")]
        data: Value,
    },
}

/// Message author role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message.
    User,
    /// Assistant message.
    Assistant,
    /// System message.
    System,
    /// Tool result message.
    Tool,
    /// Developer instructions.
    Developer,
}

/// Wire tag of an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    RunStarted,
    RunFinished,
    RunError,
    TextMessageStart,
    TextMessageContent,
    TextMessageEnd,
    ToolCallStart,
    ToolCallArgs,
    ToolCallEnd,
    StateSnapshot,
    StateDelta,
    Custom,
}

impl EventType {
    /// The exact `type` string used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::RunStarted => "RUN_STARTED",
            EventType::RunFinished => "RUN_FINISHED",
            EventType::RunError => "RUN_ERROR",
            EventType::TextMessageStart => "TEXT_MESSAGE_START",
            EventType::TextMessageContent => "TEXT_MESSAGE_CONTENT",
            EventType::TextMessageEnd => "TEXT_MESSAGE_END",
            EventType::ToolCallStart => "TOOL_CALL_START",
            EventType::ToolCallArgs => "TOOL_CALL_ARGS",
            EventType::ToolCallEnd => "TOOL_CALL_END",
            EventType::StateSnapshot => "STATE_SNAPSHOT",
            EventType::StateDelta => "STATE_DELTA",
            EventType::Custom => "CUSTOM_EVENT",
        }
    }

    /// Look up a wire tag. `CUSTOM` (the upstream spelling) maps to [`EventType::Custom`].
    pub fn from_tag(tag: &str) -> Option<Self> {
        let ty = match tag {
            "RUN_STARTED" => EventType::RunStarted,
            "RUN_FINISHED" => EventType::RunFinished,
            "RUN_ERROR" => EventType::RunError,
            "TEXT_MESSAGE_START" => EventType::TextMessageStart,
            "TEXT_MESSAGE_CONTENT" => EventType::TextMessageContent,
            "TEXT_MESSAGE_END" => EventType::TextMessageEnd,
            "TOOL_CALL_START" => EventType::ToolCallStart,
            "TOOL_CALL_ARGS" => EventType::ToolCallArgs,
            "TOOL_CALL_END" => EventType::ToolCallEnd,
            "STATE_SNAPSHOT" => EventType::StateSnapshot,
            "STATE_DELTA" => EventType::StateDelta,
            "CUSTOM_EVENT" | "CUSTOM" => EventType::Custom,
            _ => return None,
        };
        Some(ty)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Event {
    /// Decode one JSON payload.
    ///
    /// Objects whose `type` is not a known tag decode as [`Event::Custom`]
    /// named after that tag, carrying the remaining fields as `data`. A known
    /// tag with a malformed body is still an error. An object with no `type`
    /// at all decodes as an unnamed `Custom`.
    pub fn decode(json: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Decode an already-parsed JSON value. See [`Event::decode`].
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let known = value
            .get("type")
            .and_then(Value::as_str)
            .map(EventType::from_tag);

        match (known, value) {
            (Some(Some(_)), value) => serde_json::from_value(value),
            (Some(None), Value::Object(mut fields)) => {
                let name = match fields.remove("type") {
                    Some(Value::String(name)) => name,
                    _ => String::new(),
                };
                Ok(Event::Custom {
                    name,
                    data: Value::Object(fields),
                })
            }
            (None, Value::Object(fields)) if !fields.contains_key("type") => Ok(Event::Custom {
                name: String::new(),
                data: Value::Object(fields),
            }),
            // Non-string tag or not an object: let serde produce the error.
            (_, value) => serde_json::from_value(value),
        }
    }

    /// The wire tag for this event.
    pub fn event_type(&self) -> EventType {
        match self {
            Event::RunStarted { .. } => EventType::RunStarted,
            Event::RunFinished { .. } => EventType::RunFinished,
            Event::RunError { .. } => EventType::RunError,
            Event::TextMessageStart { .. } => EventType::TextMessageStart,
            Event::TextMessageContent { .. } => EventType::TextMessageContent,
            Event::TextMessageEnd { .. } => EventType::TextMessageEnd,
            Event::ToolCallStart { .. } => EventType::ToolCallStart,
            Event::ToolCallArgs { .. } => EventType::ToolCallArgs,
            Event::ToolCallEnd { .. } => EventType::ToolCallEnd,
            Event::StateSnapshot { .. } => EventType::StateSnapshot,
            Event::StateDelta { .. } => EventType::StateDelta,
            Event::Custom { .. } => EventType::Custom,
        }
    }

    /// Whether this event ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::RunFinished { .. } | Event::RunError { .. })
    }

    /// Build a `RUN_ERROR` for the given run.
    pub fn run_error(
        thread_id: impl Into<String>,
        run_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Event::RunError {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            error: error.into(),
            code: None,
        }
    }

    /// Build a `CUSTOM_EVENT` from a name and a map of fields.
    pub fn custom(name: impl Into<String>, data: Map<String, Value>) -> Self {
        Event::Custom {
            name: name.into(),
            data: Value::Object(data),
        }
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod tests;
