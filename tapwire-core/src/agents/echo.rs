use std::time::Duration;

use async_trait::async_trait;

use super::{new_message_id, paced, text_message};
use crate::agent::{Agent, AgentInfo, EventStream, RunAgentInput};
use crate::error::AgentError;
use crate::events::Event;
use crate::reducer::StateHandle;

/// Replies `Echo: <last user message>`.
#[derive(Debug, Clone, Default)]
pub struct EchoAgent {
    pace: Option<Duration>,
}

impl EchoAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause between streamed characters.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn info(&self) -> AgentInfo {
        AgentInfo::new("echo", "Echoes the latest user message back").with_feature("streaming")
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
            let reply = format!("Echo: {}", message.content);
            events.extend(text_message(&new_message_id(), &reply));
        }
        events.push(Event::RunFinished { thread_id, run_id });

        Ok(paced(events, self.pace))
    }
}
