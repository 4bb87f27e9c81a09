//! Demo agents.
//!
//! These exist to exercise the relay end to end. They stream replies one
//! character per `TEXT_MESSAGE_CONTENT`, optionally pausing between
//! characters.

use std::time::Duration;

use futures::stream::StreamExt;
use serde_json::Value;

use crate::agent::EventStream;
use crate::events::{Event, Role};

mod echo;
mod hitl;
mod memory;
mod tool;

pub use echo::EchoAgent;
pub use hitl::HitlAgent;
pub use memory::MemoryAgent;
pub use tool::ToolAgent;

/// Characters per `TOOL_CALL_ARGS` fragment.
const ARGS_FRAGMENT: usize = 8;

/// Events for one assistant message, one character per content delta.
pub fn text_message(message_id: &str, text: &str) -> Vec<Event> {
    let mut events = Vec::with_capacity(text.chars().count() + 2);
    events.push(Event::TextMessageStart {
        message_id: message_id.to_string(),
        role: Role::Assistant,
    });
    events.extend(text.chars().map(|c| Event::TextMessageContent {
        message_id: message_id.to_string(),
        delta: c.to_string(),
    }));
    events.push(Event::TextMessageEnd {
        message_id: message_id.to_string(),
    });
    events
}

/// Events for one tool call, its JSON arguments split into fragments.
pub fn tool_call(
    tool_call_id: &str,
    name: &str,
    parent_message_id: Option<&str>,
    arguments: &Value,
) -> Vec<Event> {
    let mut events = vec![Event::ToolCallStart {
        tool_call_id: tool_call_id.to_string(),
        tool_call_name: name.to_string(),
        parent_message_id: parent_message_id.map(str::to_string),
    }];
    let chars: Vec<char> = arguments.to_string().chars().collect();
    events.extend(chars.chunks(ARGS_FRAGMENT).map(|chunk| Event::ToolCallArgs {
        tool_call_id: tool_call_id.to_string(),
        delta: chunk.iter().collect(),
    }));
    events.push(Event::ToolCallEnd {
        tool_call_id: tool_call_id.to_string(),
    });
    events
}

/// Stream prepared events, sleeping `pace` before each content delta.
pub(crate) fn paced(events: Vec<Event>, pace: Option<Duration>) -> EventStream {
    async_stream::stream! {
        for event in events {
            if let (Some(pace), Event::TextMessageContent { .. }) = (pace, &event) {
                tokio::time::sleep(pace).await;
            }
            yield Ok(event);
        }
    }
    .boxed()
}

fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn new_tool_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
#[path = "agents_tests.rs"]
mod tests;
