//! Conversation thread kept on the client side.

use serde_json::Value;
use tapwire_core::{InputMessage, RunAgentInput, SessionUpdate, StateHandle};
use tracing::debug;

use crate::error::ClientError;
use crate::report::RunReport;
use crate::transport::Transport;

/// One conversation: its id, history and state document.
///
/// History only grows when a run finishes, so a failed or aborted turn can
/// be retried without leaving a half-written reply behind.
#[derive(Debug, Clone)]
pub struct ClientThread {
    thread_id: String,
    history: Vec<InputMessage>,
    state: StateHandle,
    agent: Option<String>,
}

impl Default for ClientThread {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientThread {
    /// A new thread with a random id.
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_id(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            history: Vec::new(),
            state: StateHandle::default(),
            agent: None,
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn history(&self) -> &[InputMessage] {
        &self.history
    }

    /// The local copy of the thread's state document.
    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    pub fn snapshot(&self) -> Value {
        self.state.snapshot()
    }

    pub fn agent(&self) -> Option<&str> {
        self.agent.as_deref()
    }

    /// Select the agent for later turns; `None` uses the server default.
    pub fn set_agent(&mut self, agent: Option<String>) {
        self.agent = agent;
    }

    /// The request for a turn saying `content`.
    pub fn input(&self, content: &str) -> RunAgentInput {
        let mut input = RunAgentInput::new(self.thread_id.clone());
        input.messages = self.history.clone();
        input.messages.push(InputMessage::user(new_id(), content));

        if self.state.version() > 0 {
            input.state = self.state.snapshot();
        }
        input.agent_type = self.agent.clone();
        input
    }

    /// Send one user message and read the reply.
    pub async fn send<T>(&mut self, transport: &T, content: &str) -> Result<RunReport, ClientError>
    where
        T: Transport + ?Sized,
    {
        self.send_with(transport, content, &mut |_: &SessionUpdate| {})
            .await
    }

    /// Like [`send`](Self::send), reporting session updates as they arrive.
    pub async fn send_with<T>(
        &mut self,
        transport: &T,
        content: &str,
        on_update: &mut (dyn for<'u> FnMut(&'u SessionUpdate) + Send),
    ) -> Result<RunReport, ClientError>
    where
        T: Transport + ?Sized,
    {
        let input = self.input(content);
        let user = input.messages.last().cloned();
        let report = transport
            .run_with(input, self.state.clone(), on_update)
            .await?;

        if report.is_finished() {
            self.history.extend(user);
            self.history.extend(
                report
                    .messages
                    .iter()
                    .map(|m| InputMessage {
                        id: m.id.clone(),
                        role: m.role,
                        content: m.content.clone(),
                    }),
            );
        } else {
            debug!(thread_id = %self.thread_id, outcome = ?report.outcome, "turn not recorded");
        }
        Ok(report)
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
#[path = "thread_tests.rs"]
mod tests;
