//! Agents, run requests and the agent registry.
//!
//! An [`Agent`] turns one [`RunAgentInput`] into a lazy, finite stream of
//! [`Event`]s. The relay pulls events one at a time; dropping the stream
//! cancels the agent.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentError, RelayError};
use crate::events::{Event, Role};
use crate::reducer::StateHandle;

/// The event sequence produced by one agent run.
pub type EventStream = BoxStream<'static, Result<Event, AgentError>>;

/// Descriptive metadata for an agent, served by agent listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub features: Vec<String>,
}

impl AgentInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            features: Vec::new(),
        }
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.push(feature.into());
        self
    }
}

/// A producer of AG-UI events.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Name, description and feature tags.
    fn info(&self) -> AgentInfo;

    /// Start one run.
    ///
    /// `state` is the thread's shared document. Agents read it to decide
    /// what to emit; they change it only by emitting state events, which the
    /// relay applies as they pass through.
    async fn run(
        &self,
        input: RunAgentInput,
        state: StateHandle,
    ) -> Result<EventStream, AgentError>;
}

/// One message of conversation history in a run request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMessage {
    #[serde(default)]
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

impl InputMessage {
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Inbound run request: the trigger for a new run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunAgentInput {
    #[serde(alias = "threadId")]
    pub thread_id: String,
    /// Generated when absent.
    #[serde(default, alias = "runId", skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<InputMessage>,
    /// Tool descriptors, opaque to the relay.
    #[serde(default)]
    pub tools: Vec<Value>,
    /// Prior state; seeds a thread that has never been written.
    #[serde(default)]
    pub state: Value,
    #[serde(default)]
    pub context: Vec<Value>,
    #[serde(default, alias = "forwardedProps")]
    pub forwarded_props: Value,
    /// Agent selection hint.
    #[serde(default, alias = "agentType", skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
}

impl RunAgentInput {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: None,
            messages: Vec::new(),
            tools: Vec::new(),
            state: Value::Null,
            context: Vec::new(),
            forwarded_props: Value::Null,
            agent_type: None,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_message(mut self, message: InputMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_state(mut self, state: Value) -> Self {
        self.state = state;
        self
    }

    pub fn with_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = Some(agent_type.into());
        self
    }

    /// The run id, generating a UUID v4 on first call if none was given.
    pub fn ensure_run_id(&mut self) -> &str {
        self.run_id
            .get_or_insert_with(|| uuid::Uuid::new_v4().to_string())
    }

    /// The most recent user message, if any.
    pub fn last_user_message(&self) -> Option<&InputMessage> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }
}

/// Named agents with a default.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, Arc<dyn Agent>>,
    default: Option<String>,
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.names())
            .field("default", &self.default)
            .finish()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent. The first one registered becomes the default.
    pub fn register(&mut self, name: impl Into<String>, agent: Arc<dyn Agent>) {
        let name = name.into();
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.agents.insert(name, agent);
    }

    /// Make `name` the default agent.
    pub fn set_default(&mut self, name: impl Into<String>) -> Result<(), RelayError> {
        let name = name.into();
        if !self.agents.contains_key(&name) {
            return Err(self.unknown(name));
        }
        self.default = Some(name);
        Ok(())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Info for every agent, keyed by registered name.
    pub fn infos(&self) -> BTreeMap<String, AgentInfo> {
        self.agents
            .iter()
            .map(|(name, agent)| (name.clone(), agent.info()))
            .collect()
    }

    /// Resolve an agent by name, or the default when `name` is `None`.
    pub fn resolve(&self, name: Option<&str>) -> Result<(String, Arc<dyn Agent>), RelayError> {
        let name = match name.or(self.default.as_deref()) {
            Some(name) => name,
            None => return Err(self.unknown(String::new())),
        };
        self.agents
            .get(name)
            .map(|agent| (name.to_string(), agent.clone()))
            .ok_or_else(|| self.unknown(name.to_string()))
    }

    fn unknown(&self, name: String) -> RelayError {
        RelayError::UnknownAgent {
            name,
            available: self.names(),
        }
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
