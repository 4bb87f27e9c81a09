use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use super::{new_message_id, paced, text_message};
use crate::agent::{Agent, AgentInfo, EventStream, RunAgentInput};
use crate::classify::{IntentClassifier, KeywordClassifier};
use crate::error::AgentError;
use crate::events::Event;
use crate::patch::PatchOp;
use crate::reducer::{apply_op, StateHandle};

const SET_NAME: &str = "set_name";
const SET_PREFERENCE: &str = "set_preference";
const RECALL_NAME: &str = "recall_name";
const SUMMARY: &str = "summary";
const RESET: &str = "reset";

const NAME_PREFIX: &str = "my name is";
const TOPIC_LIMIT: usize = 30;

/// Remembers facts about the user in the thread's state document.
///
/// The document starts as
/// `{"user_name": null, "preferences": {}, "topics": [], "conversation_count": 0}`
/// and is only ever changed through the `STATE_SNAPSHOT` and `STATE_DELTA`
/// events this agent emits.
#[derive(Clone)]
pub struct MemoryAgent {
    classifier: Arc<dyn IntentClassifier>,
    pace: Option<Duration>,
}

impl std::fmt::Debug for MemoryAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryAgent").field("pace", &self.pace).finish()
    }
}

impl Default for MemoryAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAgent {
    pub fn new() -> Self {
        let classifier = KeywordClassifier::new()
            .prefix(SET_NAME, NAME_PREFIX)
            .contains(SET_PREFERENCE, "prefer")
            .any_of(RECALL_NAME, &[&["remember", "name"]])
            .any_of(SUMMARY, &[&["what do you know about me"], &["my info"]])
            .any_of(RESET, &[&["reset", "state"], &["reset", "memory"]]);
        Self {
            classifier: Arc::new(classifier),
            pace: None,
        }
    }

    /// Route with a different classifier. Intents it does not return are
    /// treated as general conversation.
    pub fn with_classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Pause between streamed characters.
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = Some(pace);
        self
    }

    /// The document a new thread starts with.
    pub fn initial_state() -> Value {
        json!({
            "user_name": null,
            "preferences": {},
            "topics": [],
            "conversation_count": 0,
        })
    }
}

#[async_trait]
impl Agent for MemoryAgent {
    fn info(&self) -> AgentInfo {
        AgentInfo::new("memory", "Remembers your name, preferences and topics across runs")
            .with_feature("streaming")
            .with_feature("state")
    }

    async fn run(
        &self,
        input: RunAgentInput,
        state: StateHandle,
    ) -> Result<EventStream, AgentError> {
        let thread_id = input.thread_id.clone();
        let run_id = input.run_id.clone().unwrap_or_default();

        let mut turn = Turn {
            events: vec![Event::RunStarted {
                thread_id: thread_id.clone(),
                run_id: run_id.clone(),
            }],
            memory: state.snapshot(),
        };
        if state.version() == 0 {
            turn.snapshot(Self::initial_state());
        }

        if let Some(message) = input.last_user_message() {
            let intent = self.classifier.classify(&message.content);
            turn.respond(intent, message.content.trim());
        }

        turn.events.push(Event::RunFinished { thread_id, run_id });
        Ok(paced(turn.events, self.pace))
    }
}

/// Events for one run, with a local copy of the document kept in step with
/// the state events already emitted.
struct Turn {
    events: Vec<Event>,
    memory: Value,
}

impl Turn {
    fn respond(&mut self, intent: Option<&str>, content: &str) {
        let count = self.memory["conversation_count"].as_u64().unwrap_or(0) + 1;
        let op = self.set_op("/conversation_count", "conversation_count", json!(count));
        self.delta(vec![op]);

        let reply = match intent {
            Some(SET_NAME) => self.set_name(content),
            Some(SET_PREFERENCE) => self.set_preference(content),
            Some(RECALL_NAME) => match self.user_name() {
                Some(name) => format!("Yes, I remember! Your name is {name}."),
                None => "I don't know your name yet. \
                         You can tell me by saying 'my name is [your name]'."
                    .to_string(),
            },
            Some(SUMMARY) => self.summary(),
            Some(RESET) => {
                self.snapshot(MemoryAgent::initial_state());
                "Memory has been reset! I've forgotten everything about our previous conversations."
                    .to_string()
            }
            _ => self.track_topic(content),
        };
        self.events.extend(text_message(&new_message_id(), &reply));
    }

    fn set_name(&mut self, content: &str) -> String {
        let name = title_case(content.get(NAME_PREFIX.len()..).unwrap_or_default());
        if name.is_empty() {
            return "I didn't catch your name. Try 'my name is [your name]'.".to_string();
        }
        let previous = self.user_name();
        self.delta(vec![PatchOp::add("/user_name", json!(name))]);
        match previous {
            Some(old) => format!("I've updated your name from {old} to {name}!"),
            None => format!(
                "Nice to meet you, {name}! I'll remember your name for our future conversations."
            ),
        }
    }

    fn set_preference(&mut self, content: &str) -> String {
        let lower = content.to_lowercase();
        let (path, value, reply) = if lower.contains("dark mode") {
            ("/preferences/theme", json!("dark"), "I've noted that you prefer dark mode!")
        } else if lower.contains("light mode") {
            ("/preferences/theme", json!("light"), "I've noted that you prefer light mode!")
        } else {
            ("/preferences/general", json!(content), "I've updated your preferences!")
        };
        self.delta(vec![PatchOp::add(path, value)]);
        reply.to_string()
    }

    fn summary(&self) -> String {
        let name = self.user_name().unwrap_or_else(|| "Unknown".to_string());
        let count = self.memory["conversation_count"].as_u64().unwrap_or(0);
        let preferences = match self.memory.get("preferences") {
            Some(Value::Object(map)) if !map.is_empty() => Value::Object(map.clone()).to_string(),
            _ => "None set".to_string(),
        };
        let topics = self.memory["topics"].as_array().map_or(0, Vec::len);
        format!(
            "Here's what I know about you:\n- Name: {name}\n- Conversations: {count}\n\
             - Preferences: {preferences}\n- Topics discussed: {topics}"
        )
    }

    fn track_topic(&mut self, content: &str) -> String {
        let topic = if content.chars().count() > TOPIC_LIMIT {
            format!("{}...", content.chars().take(TOPIC_LIMIT).collect::<String>())
        } else {
            content.to_string()
        };

        if !topic.is_empty() {
            match self.memory.get("topics") {
                Some(Value::Array(topics)) if topics.contains(&json!(topic)) => {}
                Some(Value::Array(_)) => self.delta(vec![PatchOp::add("/topics/-", json!(topic))]),
                _ => self.delta(vec![PatchOp::add("/topics", json!([topic]))]),
            }
        }

        let greeting = match self.user_name() {
            Some(name) => format!("Hello {name}! "),
            None => "Hello! ".to_string(),
        };
        format!(
            "{greeting}I can remember information about you across our conversation. \
             Try saying 'my name is [name]', 'I prefer dark mode', or 'what do you know about me?'"
        )
    }

    fn user_name(&self) -> Option<String> {
        self.memory
            .get("user_name")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// `replace` when the key exists, `add` otherwise.
    fn set_op(&self, path: &str, key: &str, value: Value) -> PatchOp {
        if self.memory.get(key).is_some() {
            PatchOp::replace(path, value)
        } else {
            PatchOp::add(path, value)
        }
    }

    fn snapshot(&mut self, value: Value) {
        self.memory = value.clone();
        self.events.push(Event::StateSnapshot { snapshot: value });
    }

    fn delta(&mut self, ops: Vec<PatchOp>) {
        for op in &ops {
            if let Err(err) = apply_op(&mut self.memory, op) {
                warn!(error = %err, "memory delta does not apply to the local copy");
            }
        }
        self.events.push(Event::StateDelta { delta: ops });
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
