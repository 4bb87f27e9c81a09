//! Test utilities for tapwire-core.
//!
//! Enable with the `test-utils` feature:
//!
//! ```toml
//! [dev-dependencies]
//! tapwire-core = { version = "...", features = ["test-utils"] }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;

use crate::agent::{Agent, AgentInfo, EventStream, RunAgentInput};
use crate::error::AgentError;
use crate::events::{Event, Role};
use crate::patch::PatchOp;
use crate::reducer::StateHandle;

#[derive(Debug, Clone)]
enum Step {
    Emit(Event),
    Fail(String),
    Sleep(Duration),
    Hang,
}

/// An agent that replays a fixed script.
///
/// Every run replays the same steps. Inputs are recorded for inspection.
///
/// ```ignore
/// use tapwire_core::test_utils::ScriptedAgent;
///
/// let agent = ScriptedAgent::new("scripted")
///     .started("t1", "r1")
///     .text("m1", "Hi")
///     .finished("t1", "r1");
/// assert_eq!(agent.len(), 6);
/// ```
#[derive(Clone)]
pub struct ScriptedAgent {
    name: String,
    steps: Vec<Step>,
    reject: Option<String>,
    inputs: Arc<Mutex<Vec<RunAgentInput>>>,
}

impl ScriptedAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            reject: None,
            inputs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Emit one event.
    pub fn event(mut self, event: Event) -> Self {
        self.steps.push(Step::Emit(event));
        self
    }

    /// Emit several events in order.
    pub fn events(mut self, events: impl IntoIterator<Item = Event>) -> Self {
        self.steps.extend(events.into_iter().map(Step::Emit));
        self
    }

    pub fn started(self, thread_id: &str, run_id: &str) -> Self {
        self.event(Event::RunStarted {
            thread_id: thread_id.to_string(),
            run_id: run_id.to_string(),
        })
    }

    pub fn finished(self, thread_id: &str, run_id: &str) -> Self {
        self.event(Event::RunFinished {
            thread_id: thread_id.to_string(),
            run_id: run_id.to_string(),
        })
    }

    /// A complete assistant message, one content delta per character.
    pub fn text(self, message_id: &str, text: &str) -> Self {
        self.events(crate::agents::text_message(message_id, text))
    }

    /// An assistant message that is started and never ended.
    pub fn open_text(self, message_id: &str, text: &str) -> Self {
        self.event(Event::TextMessageStart {
            message_id: message_id.to_string(),
            role: Role::Assistant,
        })
        .event(Event::TextMessageContent {
            message_id: message_id.to_string(),
            delta: text.to_string(),
        })
    }

    pub fn snapshot(self, snapshot: Value) -> Self {
        self.event(Event::StateSnapshot { snapshot })
    }

    pub fn delta(self, ops: Vec<PatchOp>) -> Self {
        self.event(Event::StateDelta { delta: ops })
    }

    /// Yield an agent error.
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.steps.push(Step::Fail(message.into()));
        self
    }

    /// Pause before the next step.
    pub fn sleep(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Sleep(duration));
        self
    }

    /// Never produce another event.
    pub fn hang(mut self) -> Self {
        self.steps.push(Step::Hang);
        self
    }

    /// Refuse to start: `run` returns this error.
    pub fn reject(mut self, message: impl Into<String>) -> Self {
        self.reject = Some(message.into());
        self
    }

    /// Number of scripted steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Inputs received so far, in call order.
    pub fn inputs(&self) -> Vec<RunAgentInput> {
        self.inputs.lock().clone()
    }

    /// Number of runs started.
    pub fn run_count(&self) -> usize {
        self.inputs.lock().len()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn info(&self) -> AgentInfo {
        AgentInfo::new(self.name.clone(), "Replays a fixed event script")
    }

    async fn run(
        &self,
        input: RunAgentInput,
        _state: StateHandle,
    ) -> Result<EventStream, AgentError> {
        self.inputs.lock().push(input);
        if let Some(message) = &self.reject {
            return Err(AgentError::InvalidInput(message.clone()));
        }

        let steps = self.steps.clone();
        let stream = async_stream::stream! {
            for step in steps {
                match step {
                    Step::Emit(event) => yield Ok(event),
                    Step::Fail(message) => yield Err(AgentError::Failed(message)),
                    Step::Sleep(duration) => tokio::time::sleep(duration).await,
                    Step::Hang => futures::future::pending::<()>().await,
                }
            }
        };
        Ok(stream.boxed())
    }
}
