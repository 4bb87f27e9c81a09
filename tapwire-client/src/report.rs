//! Reading one run into a [`RunReport`].

use futures::{Stream, StreamExt};
use tapwire_core::{
    AssembledMessage, AssembledToolCall, Event, RelayError, Role, RunOutcome, RunSession,
    SessionUpdate,
};
use tracing::{debug, warn};

/// Everything a client learned from one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub thread_id: String,
    /// Set once `RUN_STARTED` was seen.
    pub run_id: Option<String>,
    /// Messages closed by `TEXT_MESSAGE_END` (or by `RUN_FINISHED`), in order.
    /// Messages still open when the run aborted are not here.
    pub messages: Vec<AssembledMessage>,
    pub tool_calls: Vec<AssembledToolCall>,
    /// Tolerated problems: ignored events, rejected deltas, bad tool args.
    pub warnings: Vec<String>,
    pub outcome: RunOutcome,
}

impl RunReport {
    /// Whether the run ended with `RUN_FINISHED`.
    pub fn is_finished(&self) -> bool {
        self.outcome == RunOutcome::Finished
    }

    /// Concatenated assistant text.
    pub fn reply(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Feed decoded events to `session` until the run ends, then report.
///
/// A transport error, or the stream ending before a terminal event, aborts
/// the session. `on_update` sees every update as it happens.
pub(crate) async fn drive<S>(
    events: S,
    mut session: RunSession,
    on_update: &mut (dyn for<'u> FnMut(&'u SessionUpdate) + Send),
) -> RunReport
where
    S: Stream<Item = Result<Event, RelayError>>,
{
    futures::pin_mut!(events);
    let mut warnings = Vec::new();

    while let Some(item) = events.next().await {
        match item {
            Ok(event) => match session.handle(&event) {
                Ok(updates) => {
                    for update in &updates {
                        if let Some(warning) = warning(update) {
                            warn!(
                                thread_id = %session.thread_id(),
                                %warning,
                                "tolerated problem in run"
                            );
                            warnings.push(warning);
                        }
                        on_update(update);
                    }
                }
                Err(violation) => {
                    warnings.push(violation.to_string());
                    break;
                }
            },
            Err(err) => {
                session.abort(&err);
                break;
            }
        }
        if session.lifecycle().is_terminal() {
            break;
        }
    }

    if let Some(err) = session.close_transport() {
        debug!(thread_id = %session.thread_id(), %err, "stream ended early");
    }

    RunReport {
        thread_id: session.thread_id().to_string(),
        run_id: session.run_id().map(str::to_string),
        messages: session.messages().to_vec(),
        tool_calls: session.tool_calls().to_vec(),
        warnings,
        outcome: session
            .outcome()
            .cloned()
            .unwrap_or(RunOutcome::Aborted {
                reason: "run did not end".to_string(),
            }),
    }
}

fn warning(update: &SessionUpdate) -> Option<String> {
    match update {
        SessionUpdate::Violation(violation) => Some(violation.to_string()),
        SessionUpdate::StatePatchRejected { index, error } => {
            Some(format!("state delta rejected at op {index}: {error}"))
        }
        SessionUpdate::ToolCallFailed(err) => Some(err.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[path = "report_tests.rs"]
mod tests;
