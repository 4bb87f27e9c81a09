use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use super::{new_message_id, new_tool_call_id, paced, text_message, tool_call};
use crate::agent::{Agent, AgentInfo, EventStream, RunAgentInput};
use crate::classify::{IntentClassifier, KeywordClassifier};
use crate::error::AgentError;
use crate::events::Event;
use crate::patch::PatchOp;
use crate::reducer::{apply_op, StateHandle};

const SEND_EMAIL: &str = "send_email";
const DELETE: &str = "delete_data";
const PURCHASE: &str = "make_purchase";
const CALCULATE: &str = "calculation";
const TRUST: &str = "trust_level";

const NEW_USER: &str = "new_user";

/// Asks before acting.
///
/// Requests to send email, delete data, buy something or calculate are
/// queued under `/pending_actions` and wait for a "yes" or "no". The oldest
/// pending action is the one answered. Calculations skip the queue once the
/// user's trust level is raised above `new_user`.
#[derive(Clone)]
pub struct HitlAgent {
    classifier: Arc<dyn IntentClassifier>,
    pace: Option<Duration>,
}

impl std::fmt::Debug for HitlAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HitlAgent").field("pace", &self.pace).finish()
    }
}

impl Default for HitlAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl HitlAgent {
    pub fn new() -> Self {
        let classifier = KeywordClassifier::new()
            .contains(SEND_EMAIL, "send email")
            .any_of(DELETE, &[&["delete"], &["remove"]])
            .any_of(PURCHASE, &[&["purchase"], &["buy"]])
            .contains(CALCULATE, "calculate")
            .contains(TRUST, "trust level");
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

    /// The document a new thread starts with.
    pub fn initial_state() -> Value {
        json!({
            "pending_actions": [],
            "user_preferences": { "trust_level": NEW_USER },
            "interaction_mode": "human_in_the_loop",
        })
    }
}

#[async_trait]
impl Agent for HitlAgent {
    fn info(&self) -> AgentInfo {
        AgentInfo::new("hitl", "Proposes actions and waits for your approval")
            .with_feature("streaming")
            .with_feature("state")
            .with_feature("tools")
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
            doc: state.snapshot(),
        };
        if state.version() == 0 {
            turn.events.push(Event::StateSnapshot {
                snapshot: Self::initial_state(),
            });
            turn.doc = Self::initial_state();
        } else {
            turn.fill_missing();
        }

        if let Some(message) = input.last_user_message() {
            let content = message.content.trim();
            match content.to_lowercase().as_str() {
                "yes" | "y" | "approve" | "confirm" => turn.approve(),
                "no" | "n" | "reject" | "cancel" => turn.reject(),
                _ => {
                    let intent = self.classifier.classify(content);
                    turn.respond(intent, &content.to_lowercase());
                }
            }
        }

        turn.events.push(Event::RunFinished { thread_id, run_id });
        Ok(paced(turn.events, self.pace))
    }
}

/// Events for one run, with a local copy of the document.
struct Turn {
    events: Vec<Event>,
    doc: Value,
}

impl Turn {
    fn respond(&mut self, intent: Option<&str>, content: &str) {
        match intent {
            Some(SEND_EMAIL) => {
                let body = content.replace("send email", "").trim().to_string();
                let details = json!({
                    "recipient": "example@example.com",
                    "subject": "Automated Email",
                    "content": body,
                });
                self.propose(SEND_EMAIL, "medium", details.clone());
                self.say(&format!(
                    "Action requires approval.\n\nI want to send an email:\n- Recipient: {}\n\
                     - Subject: {}\n- Content: {body}\n\nDo you approve this action? (yes/no)",
                    details["recipient"].as_str().unwrap_or_default(),
                    details["subject"].as_str().unwrap_or_default(),
                ));
            }
            Some(DELETE) => {
                let target = strip_words(content, &["delete", "remove"]);
                self.propose(DELETE, "high", json!({ "target": target, "permanent": true }));
                self.say(&format!(
                    "High risk action, approval required.\n\nYou want to delete: {target}\n\
                     This action is permanent and cannot be undone.\n\nAre you sure? (yes/no)"
                ));
            }
            Some(PURCHASE) => {
                let item = strip_words(content, &["purchase", "buy"]);
                let details = json!({
                    "item": item,
                    "estimated_cost": "$50.00",
                    "vendor": "Example Store",
                });
                self.propose(PURCHASE, "medium", details);
                self.say(&format!(
                    "Purchase approval required.\n\nItem: {item}\nEstimated cost: $50.00\n\
                     Vendor: Example Store\n\nProceed with purchase? (yes/no)"
                ));
            }
            Some(CALCULATE) => {
                let expression = strip_words(content, &["calculate"]);
                if self.trust_level() == NEW_USER {
                    let details = json!({ "expression": expression });
                    self.propose(CALCULATE, "low", details);
                    self.say(&format!(
                        "Calculation request.\n\nExpression: {expression}\n\
                         Since you're a new user, I'll ask for approval on calculations.\n\n\
                         Proceed with calculation? (yes/no)"
                    ));
                } else {
                    self.calculate(&expression);
                }
            }
            Some(TRUST) => self.set_trust_level(content),
            _ => {
                let pending = self.pending().len();
                self.say(&format!(
                    "Hello! I'm your human-in-the-loop assistant.\n\nCurrent status:\n\
                     - Trust level: {}\n- Pending actions: {pending}\n\n\
                     I'll ask for your approval before taking actions that affect your data \
                     or cost money.\n\nTry: 'send email', 'calculate 5+3', 'purchase coffee', \
                     or 'delete old files'",
                    self.trust_level(),
                ));
            }
        }
    }

    fn approve(&mut self) {
        let Some(action) = self.take_oldest() else {
            self.say("No pending actions to approve.");
            return;
        };
        let details = &action["details"];
        let field = |key: &str| details[key].as_str().unwrap_or_default().to_string();
        match action["type"].as_str() {
            Some(SEND_EMAIL) => self.say(&format!(
                "Email sent.\n\n- To: {}\n- Subject: {}\n- Status: delivered",
                field("recipient"),
                field("subject"),
            )),
            Some(DELETE) => {
                self.say(&format!("Deletion completed: {} has been removed.", field("target")))
            }
            Some(PURCHASE) => self.say(&format!(
                "Purchase completed.\n\n- Item: {}\n- Cost: {}\n- Vendor: {}",
                field("item"),
                field("estimated_cost"),
                field("vendor"),
            )),
            Some(CALCULATE) => self.calculate(&field("expression")),
            other => {
                warn!(action = ?other, "approved an action of unknown type");
                self.say("Approved.");
            }
        }
    }

    fn reject(&mut self) {
        let Some(action) = self.take_oldest() else {
            self.say("No pending actions to reject.");
            return;
        };
        let kind = action["type"].as_str().unwrap_or("action");
        self.say(&format!("Action rejected: {kind}. I will not proceed with this action."));
    }

    /// Hand the expression to the calculator tool.
    fn calculate(&mut self, expression: &str) {
        let message_id = new_message_id();
        self.events.extend(text_message(&message_id, "Running the calculation."));
        let arguments = json!({ "expression": expression });
        let call_id = new_tool_call_id();
        self.events.extend(tool_call(&call_id, "calculator", Some(&message_id), &arguments));
        self.say(&format!("Calculation sent to the calculator: {expression}"));
    }

    fn set_trust_level(&mut self, content: &str) {
        let level = if content.contains("trusted") {
            "trusted"
        } else if content.contains("verified") {
            "verified"
        } else {
            NEW_USER
        };
        let old = self.trust_level();
        let op = if self.doc["user_preferences"].get("trust_level").is_some() {
            PatchOp::replace("/user_preferences/trust_level", json!(level))
        } else {
            PatchOp::add("/user_preferences/trust_level", json!(level))
        };
        self.delta(vec![op]);
        self.say(&format!(
            "Trust level updated.\n\nPrevious: {old}\nNew: {level}\n\n\
             This affects how much approval I'll request for actions."
        ));
    }

    fn propose(&mut self, kind: &str, risk: &str, details: Value) {
        let action = json!({
            "id": uuid::Uuid::new_v4().to_string(),
            "type": kind,
            "details": details,
            "risk_level": risk,
            "requires_approval": true,
        });
        self.delta(vec![PatchOp::add("/pending_actions/-", action)]);
    }

    fn take_oldest(&mut self) -> Option<Value> {
        let action = self.pending().first().cloned()?;
        self.delta(vec![PatchOp::remove("/pending_actions/0")]);
        Some(action)
    }

    fn pending(&self) -> &[Value] {
        self.doc["pending_actions"].as_array().map(Vec::as_slice).unwrap_or_default()
    }

    fn trust_level(&self) -> String {
        self.doc["user_preferences"]["trust_level"]
            .as_str()
            .unwrap_or(NEW_USER)
            .to_string()
    }

    /// Add the keys this agent writes under when a seeded document lacks them.
    fn fill_missing(&mut self) {
        if !self.doc.is_object() {
            self.events.push(Event::StateSnapshot {
                snapshot: HitlAgent::initial_state(),
            });
            self.doc = HitlAgent::initial_state();
            return;
        }
        let mut ops = Vec::new();
        if !self.doc["pending_actions"].is_array() {
            ops.push(PatchOp::add("/pending_actions", json!([])));
        }
        if !self.doc["user_preferences"].is_object() {
            ops.push(PatchOp::add("/user_preferences", json!({ "trust_level": NEW_USER })));
        }
        if !ops.is_empty() {
            self.delta(ops);
        }
    }

    fn say(&mut self, text: &str) {
        self.events.extend(text_message(&new_message_id(), text));
    }

    fn delta(&mut self, ops: Vec<PatchOp>) {
        for op in &ops {
            if let Err(err) = apply_op(&mut self.doc, op) {
                warn!(error = %err, "hitl delta does not apply to the local copy");
            }
        }
        self.events.push(Event::StateDelta { delta: ops });
    }
}

/// `content` with each of `words` removed, trimmed.
fn strip_words(content: &str, words: &[&str]) -> String {
    words
        .iter()
        .fold(content.to_string(), |text, word| text.replace(word, ""))
        .trim()
        .to_string()
}
