use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{new_message_id, new_tool_call_id, paced, text_message, tool_call};
use crate::agent::{Agent, AgentInfo, EventStream, RunAgentInput};
use crate::classify::{IntentClassifier, KeywordClassifier};
use crate::error::AgentError;
use crate::events::Event;
use crate::reducer::StateHandle;

const CALCULATOR: &str = "calculator";
const WEATHER: &str = "weather";
const TIME: &str = "get_time";

const HELP: &str = "I can call tools for calculations, weather, or time. \
                    Try 'calculate 5 + 3' or 'what's the weather?'";

/// Shows tool calling: picks a tool from the user's text and streams the
/// call. The tools themselves run elsewhere; this agent only asks for them.
///
/// Each call is announced by a short text message, which the call names as
/// its parent.
#[derive(Clone)]
pub struct ToolAgent {
    classifier: Arc<dyn IntentClassifier>,
    pace: Option<Duration>,
}

impl std::fmt::Debug for ToolAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolAgent").field("pace", &self.pace).finish()
    }
}

impl Default for ToolAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolAgent {
    pub fn new() -> Self {
        let classifier = KeywordClassifier::new()
            .any_of(CALCULATOR, &[&["calculate"], &["math"]])
            .contains(WEATHER, "weather")
            .contains(TIME, "time");
        Self {
            classifier: Arc::new(classifier),
            pace: None,
        }
    }

    /// Pause between streamed characters.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    /// The tool and arguments for `content`, if any tool applies.
    fn plan(&self, content: &str) -> Option<(&'static str, Value)> {
        match self.classifier.classify(content)? {
            CALCULATOR => {
                let lower = content.trim().to_lowercase();
                let expression = lower.replace("calculate", "").trim().to_string();
                Some((CALCULATOR, json!({ "expression": expression })))
            }
            WEATHER => Some((WEATHER, json!({ "location": "current" }))),
            TIME => Some((TIME, json!({ "timezone": "local" }))),
            _ => None,
        }
    }
}

#[async_trait]
impl Agent for ToolAgent {
    fn info(&self) -> AgentInfo {
        AgentInfo::new("tool", "Streams tool calls for calculator, weather and time requests")
            .with_feature("streaming")
            .with_feature("tools")
    }

    async fn run(
        &self,
        input: RunAgentInput,
        _state: StateHandle,
    ) -> Result<EventStream, AgentError> {
        let thread_id = input.thread_id.clone();
        let run_id = input.run_id.clone().unwrap_or_default();

        let mut events = vec![Event::RunStarted {
            thread_id: thread_id.clone(),
            run_id: run_id.clone(),
        }];
        if let Some(message) = input.last_user_message() {
            match self.plan(&message.content) {
                Some((name, arguments)) => {
                    let message_id = new_message_id();
                    events.extend(text_message(&message_id, &format!("Calling {name}.")));
                    let call_id = new_tool_call_id();
                    events.extend(tool_call(&call_id, name, Some(&message_id), &arguments));
                    let reply = format!("Requested {name} with {arguments}.");
                    events.extend(text_message(&new_message_id(), &reply));
                }
                None => events.extend(text_message(&new_message_id(), HELP)),
            }
        }
        events.push(Event::RunFinished { thread_id, run_id });

        Ok(paced(events, self.pace))
    }
}
