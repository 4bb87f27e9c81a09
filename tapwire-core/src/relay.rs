//! Relay driver: runs an agent and turns its events into transport frames.
//!
//! Every event an agent produces passes through a server-side
//! [`RunSession`] bound to the thread's [`StateHandle`] before it is
//! encoded. That keeps the thread's state current and guarantees the frame
//! sequence a client receives is well formed:
//!
//! - exactly one `RUN_STARTED` first and exactly one terminal frame last;
//! - a fatal lifecycle violation, an agent error, an encoding failure or an
//!   idle timeout becomes a `RUN_ERROR` frame;
//! - an agent that stops without a terminal event gets its open message or
//!   tool call closed and a `RUN_FINISHED` appended;
//! - events the session ignored (mismatched content ids) are not forwarded.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::agent::{Agent, EventStream, RunAgentInput};
use crate::encoder::Framing;
use crate::error::{AgentError, RelayError};
use crate::events::Event;
use crate::session::{Lifecycle, RunOutcome, RunSession, SessionUpdate};
use crate::thread::{RunGuard, ThreadRegistry};

/// Encoded frames for one run.
pub type FrameStream = BoxStream<'static, String>;

/// Relay tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Longest the relay waits for the agent's next event. `None` waits forever.
    pub idle_timeout: Option<Duration>,
    /// Frames buffered between the relay and a slow transport writer.
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            channel_capacity: 100,
        }
    }
}

impl RelayConfig {
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }
}

/// Drives agent runs against a shared [`ThreadRegistry`].
#[derive(Debug, Clone, Default)]
pub struct Relay {
    threads: ThreadRegistry,
    config: RelayConfig,
}

impl Relay {
    pub fn new(threads: ThreadRegistry, config: RelayConfig) -> Self {
        Self { threads, config }
    }

    pub fn threads(&self) -> &ThreadRegistry {
        &self.threads
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Start a run and return its frames.
    ///
    /// Fails up front, before any frame exists, only when the thread already
    /// has an active run. Everything after that is reported in-band as a
    /// `RUN_ERROR` frame. The thread's run slot is held until the returned
    /// stream ends or is dropped.
    pub fn stream(
        &self,
        agent: Arc<dyn Agent>,
        mut input: RunAgentInput,
        framing: Framing,
    ) -> Result<FrameStream, RelayError> {
        let run_id = input.ensure_run_id().to_string();
        let thread_id = input.thread_id.clone();
        let guard = self.threads.begin_run(&thread_id, &run_id)?;
        self.threads.seed_state(&thread_id, input.state.clone());

        let idle_timeout = self.config.idle_timeout;
        let agent_name = agent.info().name;
        info!(%thread_id, %run_id, agent = %agent_name, ?framing, "starting run");

        let frames = async_stream::stream! {
            let mut driver = RunDriver::new(guard);

            let events: Option<EventStream> = match agent.run(input, driver.guard.state()).await {
                Ok(events) => Some(events),
                Err(err) => {
                    let out = driver.fail(RelayError::Agent(err));
                    for frame in driver.encode_all(framing, out) {
                        yield frame;
                    }
                    None
                }
            };

            if let Some(mut events) = events {
                while !driver.is_done() {
                    let out = match next_event(&mut events, idle_timeout).await {
                        Next::Event(Ok(event)) => driver.accept(event),
                        Next::Event(Err(err)) => driver.fail(RelayError::Agent(err)),
                        Next::End => driver.finish(),
                        Next::Idle(limit) => driver.fail(RelayError::IdleTimeout(limit)),
                    };
                    for frame in driver.encode_all(framing, out) {
                        yield frame;
                    }
                }
            }

            driver.complete();
        };

        Ok(frames.boxed())
    }
}

enum Next {
    Event(Result<Event, AgentError>),
    End,
    Idle(Duration),
}

async fn next_event(events: &mut EventStream, idle_timeout: Option<Duration>) -> Next {
    let next = match idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, events.next()).await {
            Ok(next) => next,
            Err(_) => return Next::Idle(limit),
        },
        None => events.next().await,
    };
    match next {
        Some(event) => Next::Event(event),
        None => Next::End,
    }
}

/// Per-run bookkeeping between the agent stream and the encoder.
struct RunDriver {
    guard: RunGuard,
    session: RunSession,
    started: bool,
    done: bool,
    completed: bool,
}

impl RunDriver {
    fn new(guard: RunGuard) -> Self {
        let session =
            RunSession::new(guard.thread_id(), guard.state()).expecting_run(guard.run_id());
        Self {
            guard,
            session,
            started: false,
            done: false,
            completed: false,
        }
    }

    fn is_done(&self) -> bool {
        self.done
    }

    /// Validate one agent event and return what to send for it.
    fn accept(&mut self, event: Event) -> Vec<Event> {
        if self.done {
            return Vec::new();
        }
        let mut out = Vec::new();

        if !self.started && matches!(event, Event::RunError { .. }) {
            out.extend(self.accept(Event::RunStarted {
                thread_id: self.guard.thread_id().to_string(),
                run_id: self.guard.run_id().to_string(),
            }));
        }

        if matches!(event, Event::RunFinished { .. }) {
            for close in self.session.closing_events() {
                warn!(
                    thread_id = %self.guard.thread_id(),
                    event_type = %close.event_type(),
                    "agent finished with an open accumulator, closing it"
                );
                out.extend(self.accept(close));
            }
        }

        match self.session.handle(&event) {
            Ok(updates) => {
                let ignored = updates
                    .iter()
                    .any(|update| matches!(update, SessionUpdate::Violation(_)));
                if ignored {
                    debug!(
                        thread_id = %self.guard.thread_id(),
                        event_type = %event.event_type(),
                        "not forwarding ignored event"
                    );
                } else {
                    self.started |= matches!(event, Event::RunStarted { .. });
                    self.done = event.is_terminal();
                    out.push(event);
                }
            }
            Err(violation) => out.extend(self.fail(RelayError::Protocol(violation))),
        }
        out
    }

    /// The agent stream ended: close what is open and finish the run.
    fn finish(&mut self) -> Vec<Event> {
        if self.done {
            return Vec::new();
        }
        let thread_id = self.guard.thread_id().to_string();
        let run_id = self.guard.run_id().to_string();
        debug!(%thread_id, %run_id, "agent stream ended without a terminal event");

        let mut out = Vec::new();
        if self.session.lifecycle() == Lifecycle::Idle {
            out.extend(self.accept(Event::RunStarted {
                thread_id: thread_id.clone(),
                run_id: run_id.clone(),
            }));
        }
        out.extend(self.accept(Event::RunFinished { thread_id, run_id }));
        out
    }

    /// End the run with a `RUN_ERROR`, preceded by `RUN_STARTED` if none was sent.
    fn fail(&mut self, err: RelayError) -> Vec<Event> {
        if self.done {
            return Vec::new();
        }
        self.terminate(err)
    }

    fn terminate(&mut self, err: RelayError) -> Vec<Event> {
        error!(
            thread_id = %self.guard.thread_id(),
            run_id = %self.guard.run_id(),
            error = %err,
            "run failed"
        );
        self.session.abort(&err);
        self.done = true;

        let thread_id = self.guard.thread_id().to_string();
        let run_id = self.guard.run_id().to_string();
        let mut out = Vec::new();
        if !self.started {
            self.started = true;
            out.push(Event::RunStarted {
                thread_id: thread_id.clone(),
                run_id: run_id.clone(),
            });
        }
        out.push(Event::RunError {
            thread_id,
            run_id,
            error: err.to_string(),
            code: Some(err.code().to_string()),
        });
        out
    }

    /// Encode events in order. An event that cannot be encoded ends the run
    /// with a `RUN_ERROR` in its place, even if it was itself terminal.
    fn encode_all(&mut self, framing: Framing, events: Vec<Event>) -> Vec<String> {
        let mut frames = Vec::with_capacity(events.len());
        for event in events {
            match framing.encode(&event) {
                Ok(frame) => frames.push(frame),
                Err(err) => {
                    for replacement in self.terminate(err) {
                        match framing.encode(&replacement) {
                            Ok(frame) => frames.push(frame),
                            Err(err) => error!(error = %err, "could not encode run error"),
                        }
                    }
                    break;
                }
            }
        }
        frames
    }

    fn complete(&mut self) {
        self.completed = true;
        match self.session.outcome() {
            Some(RunOutcome::Finished) => info!(
                thread_id = %self.guard.thread_id(),
                run_id = %self.guard.run_id(),
                messages = self.session.messages().len(),
                tool_calls = self.session.tool_calls().len(),
                "run finished"
            ),
            Some(outcome) => info!(
                thread_id = %self.guard.thread_id(),
                run_id = %self.guard.run_id(),
                ?outcome,
                "run ended with an error"
            ),
            None => {}
        }
    }
}

impl Drop for RunDriver {
    fn drop(&mut self) {
        if !self.completed {
            info!(
                thread_id = %self.guard.thread_id(),
                run_id = %self.guard.run_id(),
                lifecycle = %self.session.lifecycle(),
                "run cancelled by consumer"
            );
        }
    }
}

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;
