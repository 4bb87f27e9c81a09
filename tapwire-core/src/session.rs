//! Per-run lifecycle state machine.
//!
//! A [`RunSession`] validates the event order of one run and routes deltas
//! to the open message or tool-call accumulator. State events are applied to
//! the thread's [`StateHandle`], which outlives the session.
//!
//! ```text
//! Idle -> Running -> StreamingMessage -> Running -> ... -> Finished
//!                 -> StreamingTool    -> Running
//! (any non-terminal) -> Errored
//! ```
//!
//! Mismatched content/args/end ids are reported as
//! [`SessionUpdate::Violation`] and otherwise ignored. Illegal lifecycle
//! transitions are fatal: the session moves to `Errored` and
//! [`RunSession::handle`] returns the violation.

use std::fmt;

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::{PatchError, ProtocolViolation, RelayError, ToolArgsDecodeError};
use crate::events::{Event, EventType, Role};
use crate::reducer::StateHandle;

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// No `RUN_STARTED` yet.
    Idle,
    /// Between messages and tool calls.
    Running,
    /// A text message is open.
    StreamingMessage,
    /// A tool call is open.
    StreamingTool,
    /// Ended with `RUN_FINISHED`.
    Finished,
    /// Ended with `RUN_ERROR`, a fatal violation, or an abnormal close.
    Errored,
}

impl Lifecycle {
    /// `Finished` or `Errored`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Lifecycle::Finished | Lifecycle::Errored)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Lifecycle::Idle => "idle",
            Lifecycle::Running => "running",
            Lifecycle::StreamingMessage => "streaming a message",
            Lifecycle::StreamingTool => "streaming a tool call",
            Lifecycle::Finished => "finished",
            Lifecycle::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// A text message closed by `TEXT_MESSAGE_END` (or force-closed by `RUN_FINISHED`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
}

/// A tool call closed by `TOOL_CALL_END` with arguments that parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledToolCall {
    pub id: String,
    pub name: String,
    pub parent_message_id: Option<String>,
    /// Parsed arguments. An empty argument string parses as `{}`.
    pub arguments: Value,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// `RUN_FINISHED` was observed.
    Finished,
    /// `RUN_ERROR` was observed.
    Errored {
        error: String,
        code: Option<String>,
    },
    /// The run ended without a terminal event: fatal violation, transport
    /// close, or timeout.
    Aborted { reason: String },
}

/// What a handled event did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    RunStarted {
        thread_id: String,
        run_id: String,
    },
    MessageStarted {
        message_id: String,
        role: Role,
    },
    MessageDelta {
        message_id: String,
        delta: String,
    },
    MessageCompleted(AssembledMessage),
    ToolCallStarted {
        tool_call_id: String,
        tool_call_name: String,
    },
    ToolCallArgsDelta {
        tool_call_id: String,
        delta: String,
    },
    ToolCallCompleted(AssembledToolCall),
    /// The tool call closed but its arguments were not valid JSON.
    ToolCallFailed(ToolArgsDecodeError),
    StateReplaced {
        version: u64,
    },
    StatePatched {
        version: u64,
        ops: usize,
    },
    /// A delta was rejected; the document is unchanged.
    StatePatchRejected {
        index: usize,
        error: PatchError,
    },
    Custom {
        name: String,
        data: Value,
    },
    /// A tolerated violation; the event was ignored.
    Violation(ProtocolViolation),
    RunFinished,
    RunErrored {
        error: String,
        code: Option<String>,
    },
}

#[derive(Debug)]
enum Accumulator {
    Message {
        id: String,
        role: Role,
        content: String,
    },
    ToolCall {
        id: String,
        name: String,
        parent_message_id: Option<String>,
        args: String,
    },
}

/// State machine for one run on one thread.
#[derive(Debug)]
pub struct RunSession {
    thread_id: String,
    expected_run_id: Option<String>,
    run_id: Option<String>,
    lifecycle: Lifecycle,
    open: Option<Accumulator>,
    state: StateHandle,
    messages: Vec<AssembledMessage>,
    tool_calls: Vec<AssembledToolCall>,
    outcome: Option<RunOutcome>,
}

impl RunSession {
    /// A fresh session for `thread_id`, applying state events to `state`.
    pub fn new(thread_id: impl Into<String>, state: StateHandle) -> Self {
        Self {
            thread_id: thread_id.into(),
            expected_run_id: None,
            run_id: None,
            lifecycle: Lifecycle::Idle,
            open: None,
            state,
            messages: Vec::new(),
            tool_calls: Vec::new(),
            outcome: None,
        }
    }

    /// Require `RUN_STARTED` to carry this run id.
    pub fn expecting_run(mut self, run_id: impl Into<String>) -> Self {
        self.expected_run_id = Some(run_id.into());
        self
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// The run id, once `RUN_STARTED` has been seen.
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// The thread's state handle.
    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    /// How the run ended, once it has.
    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }

    /// Messages completed so far, in order.
    pub fn messages(&self) -> &[AssembledMessage] {
        &self.messages
    }

    /// Tool calls completed so far, in order.
    pub fn tool_calls(&self) -> &[AssembledToolCall] {
        &self.tool_calls
    }

    /// Id of the open text message.
    pub fn open_message_id(&self) -> Option<&str> {
        match &self.open {
            Some(Accumulator::Message { id, .. }) => Some(id),
            _ => None,
        }
    }

    /// Content buffered so far for the open text message.
    pub fn open_message_content(&self) -> Option<&str> {
        match &self.open {
            Some(Accumulator::Message { content, .. }) => Some(content),
            _ => None,
        }
    }

    /// Id of the open tool call.
    pub fn open_tool_call_id(&self) -> Option<&str> {
        match &self.open {
            Some(Accumulator::ToolCall { id, .. }) => Some(id),
            _ => None,
        }
    }

    /// The `*_END` events that would close whatever is open.
    pub fn closing_events(&self) -> Vec<Event> {
        match &self.open {
            Some(Accumulator::Message { id, .. }) => vec![Event::TextMessageEnd {
                message_id: id.clone(),
            }],
            Some(Accumulator::ToolCall { id, .. }) => vec![Event::ToolCallEnd {
                tool_call_id: id.clone(),
            }],
            None => Vec::new(),
        }
    }

    /// Feed one event.
    ///
    /// Returns the resulting updates, or the fatal violation that moved the
    /// session to `Errored`. Events after a terminal state are rejected
    /// without changing the outcome.
    pub fn handle(&mut self, event: &Event) -> Result<Vec<SessionUpdate>, ProtocolViolation> {
        let event_type = event.event_type();
        debug!(
            thread_id = %self.thread_id,
            run_id = ?self.run_id,
            event_type = %event_type,
            lifecycle = %self.lifecycle,
            "handling event"
        );

        if self.lifecycle.is_terminal() {
            let violation = ProtocolViolation::IllegalTransition {
                event: event_type,
                state: self.lifecycle,
            };
            warn!(thread_id = %self.thread_id, %violation, "event after run ended");
            return Err(violation);
        }

        // A server that refuses a run reports it with a lone RUN_ERROR.
        if self.lifecycle == Lifecycle::Idle
            && !matches!(event_type, EventType::RunStarted | EventType::RunError)
        {
            return Err(self.illegal(event_type));
        }

        match event {
            Event::RunStarted { thread_id, run_id } => self.on_run_started(thread_id, run_id),
            Event::TextMessageStart { message_id, role } => {
                if self.lifecycle != Lifecycle::Running {
                    return Err(self.illegal(event_type));
                }
                self.open = Some(Accumulator::Message {
                    id: message_id.clone(),
                    role: *role,
                    content: String::new(),
                });
                self.lifecycle = Lifecycle::StreamingMessage;
                Ok(vec![SessionUpdate::MessageStarted {
                    message_id: message_id.clone(),
                    role: *role,
                }])
            }
            Event::TextMessageContent { message_id, delta } => match &mut self.open {
                Some(Accumulator::Message { id, content, .. }) if id == message_id => {
                    content.push_str(delta);
                    Ok(vec![SessionUpdate::MessageDelta {
                        message_id: message_id.clone(),
                        delta: delta.clone(),
                    }])
                }
                _ => Ok(self.tolerate_message(event_type, message_id)),
            },
            Event::TextMessageEnd { message_id } => {
                if self.open_message_id() != Some(message_id.as_str()) {
                    return Ok(self.tolerate_message(event_type, message_id));
                }
                Ok(self.close_open())
            }
            Event::ToolCallStart {
                tool_call_id,
                tool_call_name,
                parent_message_id,
            } => {
                if self.lifecycle != Lifecycle::Running {
                    return Err(self.illegal(event_type));
                }
                self.open = Some(Accumulator::ToolCall {
                    id: tool_call_id.clone(),
                    name: tool_call_name.clone(),
                    parent_message_id: parent_message_id.clone(),
                    args: String::new(),
                });
                self.lifecycle = Lifecycle::StreamingTool;
                Ok(vec![SessionUpdate::ToolCallStarted {
                    tool_call_id: tool_call_id.clone(),
                    tool_call_name: tool_call_name.clone(),
                }])
            }
            Event::ToolCallArgs {
                tool_call_id,
                delta,
            } => match &mut self.open {
                Some(Accumulator::ToolCall { id, args, .. }) if id == tool_call_id => {
                    args.push_str(delta);
                    Ok(vec![SessionUpdate::ToolCallArgsDelta {
                        tool_call_id: tool_call_id.clone(),
                        delta: delta.clone(),
                    }])
                }
                _ => Ok(self.tolerate_tool_call(event_type, tool_call_id)),
            },
            Event::ToolCallEnd { tool_call_id } => {
                if self.open_tool_call_id() != Some(tool_call_id.as_str()) {
                    return Ok(self.tolerate_tool_call(event_type, tool_call_id));
                }
                Ok(self.close_open())
            }
            Event::StateSnapshot { snapshot } => {
                self.state.apply_snapshot(snapshot.clone());
                Ok(vec![SessionUpdate::StateReplaced {
                    version: self.state.version(),
                }])
            }
            Event::StateDelta { delta } => match self.state.apply_delta(delta) {
                Ok(()) => Ok(vec![SessionUpdate::StatePatched {
                    version: self.state.version(),
                    ops: delta.len(),
                }]),
                Err((index, error)) => {
                    warn!(
                        thread_id = %self.thread_id,
                        index,
                        %error,
                        "state delta rejected, document unchanged"
                    );
                    Ok(vec![SessionUpdate::StatePatchRejected { index, error }])
                }
            },
            Event::Custom { name, data } => Ok(vec![SessionUpdate::Custom {
                name: name.clone(),
                data: data.clone(),
            }]),
            Event::RunFinished { thread_id, run_id } => self.on_run_finished(thread_id, run_id),
            Event::RunError { error, code, .. } => {
                if let Some(open) = self.open.take() {
                    warn!(
                        thread_id = %self.thread_id,
                        open = open_id(&open),
                        "run errored with an open accumulator, discarding it"
                    );
                }
                self.lifecycle = Lifecycle::Errored;
                self.outcome = Some(RunOutcome::Errored {
                    error: error.clone(),
                    code: code.clone(),
                });
                Ok(vec![SessionUpdate::RunErrored {
                    error: error.clone(),
                    code: code.clone(),
                }])
            }
        }
    }

    /// The transport ended.
    ///
    /// If no terminal event was seen, open accumulators are discarded, the
    /// session moves to `Errored`, and [`RelayError::TransportClosed`] is
    /// returned.
    pub fn close_transport(&mut self) -> Option<RelayError> {
        if self.lifecycle.is_terminal() {
            return None;
        }
        let err = RelayError::TransportClosed;
        self.abort(&err);
        Some(err)
    }

    /// End the run abnormally, discarding anything open.
    pub fn abort(&mut self, reason: &RelayError) {
        if self.lifecycle.is_terminal() {
            return;
        }
        if let Some(open) = self.open.take() {
            warn!(
                thread_id = %self.thread_id,
                open = open_id(&open),
                "discarding unterminated accumulator"
            );
        }
        error!(thread_id = %self.thread_id, run_id = ?self.run_id, %reason, "run aborted");
        self.lifecycle = Lifecycle::Errored;
        self.outcome = Some(RunOutcome::Aborted {
            reason: reason.to_string(),
        });
    }

    fn on_run_started(
        &mut self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<Vec<SessionUpdate>, ProtocolViolation> {
        if self.lifecycle != Lifecycle::Idle {
            return Err(self.illegal(EventType::RunStarted));
        }
        if thread_id != self.thread_id {
            let expected = self.thread_id.clone();
            return Err(self.mismatch(EventType::RunStarted, "thread_id", expected, thread_id));
        }
        if let Some(expected) = self.expected_run_id.clone() {
            if expected != run_id {
                return Err(self.mismatch(EventType::RunStarted, "run_id", expected, run_id));
            }
        }
        self.run_id = Some(run_id.to_string());
        self.lifecycle = Lifecycle::Running;
        Ok(vec![SessionUpdate::RunStarted {
            thread_id: thread_id.to_string(),
            run_id: run_id.to_string(),
        }])
    }

    fn on_run_finished(
        &mut self,
        thread_id: &str,
        run_id: &str,
    ) -> Result<Vec<SessionUpdate>, ProtocolViolation> {
        if thread_id != self.thread_id {
            let expected = self.thread_id.clone();
            return Err(self.mismatch(EventType::RunFinished, "thread_id", expected, thread_id));
        }
        let current = self.run_id.clone().unwrap_or_default();
        if run_id != current {
            return Err(self.mismatch(EventType::RunFinished, "run_id", current, run_id));
        }

        let mut updates = Vec::new();
        if let Some(open) = &self.open {
            let violation = ProtocolViolation::OpenAccumulator {
                kind: match open {
                    Accumulator::Message { .. } => "message",
                    Accumulator::ToolCall { .. } => "tool call",
                },
                id: open_id(open).to_string(),
            };
            warn!(thread_id = %self.thread_id, %violation, "force-closing before finish");
            updates.push(SessionUpdate::Violation(violation));
            updates.extend(self.close_open());
        }

        self.lifecycle = Lifecycle::Finished;
        self.outcome = Some(RunOutcome::Finished);
        updates.push(SessionUpdate::RunFinished);
        Ok(updates)
    }

    /// Close the open accumulator and return to `Running`.
    fn close_open(&mut self) -> Vec<SessionUpdate> {
        let Some(open) = self.open.take() else {
            return Vec::new();
        };
        self.lifecycle = Lifecycle::Running;

        match open {
            Accumulator::Message { id, role, content } => {
                let message = AssembledMessage { id, role, content };
                self.messages.push(message.clone());
                vec![SessionUpdate::MessageCompleted(message)]
            }
            Accumulator::ToolCall {
                id,
                name,
                parent_message_id,
                args,
            } => match parse_arguments(&args) {
                Ok(arguments) => {
                    let call = AssembledToolCall {
                        id,
                        name,
                        parent_message_id,
                        arguments,
                    };
                    self.tool_calls.push(call.clone());
                    vec![SessionUpdate::ToolCallCompleted(call)]
                }
                Err(err) => {
                    let failure = ToolArgsDecodeError {
                        tool_call_id: id,
                        raw: args,
                        reason: err.to_string(),
                    };
                    warn!(
                        thread_id = %self.thread_id,
                        error = %failure,
                        "tool call arguments rejected"
                    );
                    vec![SessionUpdate::ToolCallFailed(failure)]
                }
            },
        }
    }

    fn tolerate_message(&self, event: EventType, got: &str) -> Vec<SessionUpdate> {
        self.tolerate(ProtocolViolation::UnmatchedMessage {
            event,
            got: got.to_string(),
            open: self.open_message_id().map(str::to_string),
        })
    }

    fn tolerate_tool_call(&self, event: EventType, got: &str) -> Vec<SessionUpdate> {
        self.tolerate(ProtocolViolation::UnmatchedToolCall {
            event,
            got: got.to_string(),
            open: self.open_tool_call_id().map(str::to_string),
        })
    }

    fn tolerate(&self, violation: ProtocolViolation) -> Vec<SessionUpdate> {
        warn!(thread_id = %self.thread_id, %violation, "ignoring event");
        vec![SessionUpdate::Violation(violation)]
    }

    fn illegal(&mut self, event: EventType) -> ProtocolViolation {
        let violation = ProtocolViolation::IllegalTransition {
            event,
            state: self.lifecycle,
        };
        self.fail(violation)
    }

    fn mismatch(
        &mut self,
        event: EventType,
        field: &'static str,
        expected: String,
        got: &str,
    ) -> ProtocolViolation {
        self.fail(ProtocolViolation::IdentityMismatch {
            event,
            field,
            expected,
            got: got.to_string(),
        })
    }

    fn fail(&mut self, violation: ProtocolViolation) -> ProtocolViolation {
        self.abort(&RelayError::Protocol(violation.clone()));
        violation
    }
}

fn open_id(open: &Accumulator) -> &str {
    match open {
        Accumulator::Message { id, .. } | Accumulator::ToolCall { id, .. } => id,
    }
}

fn parse_arguments(raw: &str) -> Result<Value, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw)
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
