use super::*;
use futures::stream;
use serde_json::json;
use tapwire_core::{PatchOp, StateHandle};

fn started() -> Event {
    Event::RunStarted {
        thread_id: "t1".to_string(),
        run_id: "r1".to_string(),
    }
}

fn finished() -> Event {
    Event::RunFinished {
        thread_id: "t1".to_string(),
        run_id: "r1".to_string(),
    }
}

fn content(message_id: &str, delta: &str) -> Event {
    Event::TextMessageContent {
        message_id: message_id.to_string(),
        delta: delta.to_string(),
    }
}

fn open(message_id: &str) -> Event {
    Event::TextMessageStart {
        message_id: message_id.to_string(),
        role: Role::Assistant,
    }
}

async fn report(items: Vec<Result<Event, RelayError>>) -> RunReport {
    let session = RunSession::new("t1", StateHandle::default()).expecting_run("r1");
    drive(stream::iter(items), session, &mut |_: &SessionUpdate| {}).await
}

#[tokio::test]
async fn test_finished_run() {
    let report = report(vec![
        Ok(started()),
        Ok(open("m1")),
        Ok(content("m1", "Hi")),
        Ok(content("m1", " there")),
        Ok(Event::TextMessageEnd {
            message_id: "m1".to_string(),
        }),
        Ok(finished()),
    ])
    .await;

    assert!(report.is_finished());
    assert_eq!(report.run_id.as_deref(), Some("r1"));
    assert_eq!(report.reply(), "Hi there");
    assert!(report.warnings.is_empty());
}

#[tokio::test]
async fn test_tolerated_problems_become_warnings() {
    let state = StateHandle::default();
    let session = RunSession::new("t1", state.clone());
    let items = vec![
        Ok(started()),
        Ok(content("nope", "x")),
        Ok(Event::StateDelta {
            delta: vec![PatchOp::replace("/missing", json!(1))],
        }),
        Ok(finished()),
    ];
    let report = drive(stream::iter(items), session, &mut |_: &SessionUpdate| {}).await;

    assert!(report.is_finished());
    assert_eq!(report.warnings.len(), 2);
    assert!(report.warnings[1].starts_with("state delta rejected at op 0"));
    assert_eq!(state.snapshot(), json!({}));
}

#[tokio::test]
async fn test_transport_close_discards_open_message() {
    let report = report(vec![
        Ok(started()),
        Ok(open("m1")),
        Ok(content("m1", "trunc")),
        Err(RelayError::TransportClosed),
    ])
    .await;

    assert!(report.messages.is_empty());
    assert_eq!(
        report.outcome,
        RunOutcome::Aborted {
            reason: "transport closed before the run ended".to_string()
        }
    );
}

#[tokio::test]
async fn test_source_ending_without_terminal_aborts() {
    let report = report(vec![Ok(started())]).await;
    assert!(matches!(report.outcome, RunOutcome::Aborted { .. }));
}

#[tokio::test]
async fn test_run_error_outcome() {
    let report = report(vec![
        Ok(started()),
        Ok(Event::RunError {
            thread_id: "t1".to_string(),
            run_id: "r1".to_string(),
            error: "boom".to_string(),
            code: Some("agent_error".to_string()),
        }),
    ])
    .await;

    assert_eq!(
        report.outcome,
        RunOutcome::Errored {
            error: "boom".to_string(),
            code: Some("agent_error".to_string()),
        }
    );
}

#[tokio::test]
async fn test_refused_run_keeps_error_code() {
    let report = report(vec![Ok(Event::RunError {
        thread_id: "t1".to_string(),
        run_id: "r1".to_string(),
        error: "unknown agent `nope`".to_string(),
        code: Some("unknown_agent".to_string()),
    })])
    .await;

    assert!(report.run_id.is_none());
    assert!(report.warnings.is_empty());
    assert!(matches!(
        report.outcome,
        RunOutcome::Errored { code: Some(ref code), .. } if code == "unknown_agent"
    ));
}

#[tokio::test]
async fn test_fatal_violation_stops_reading() {
    let report = report(vec![Ok(open("m1")), Ok(started()), Ok(finished())]).await;
    assert!(matches!(report.outcome, RunOutcome::Aborted { .. }));
    assert_eq!(report.warnings.len(), 1);
    assert!(report.run_id.is_none());
}

#[tokio::test]
async fn test_updates_are_observed_in_order() {
    let mut deltas = String::new();
    let session = RunSession::new("t1", StateHandle::default());
    let items = vec![
        Ok(started()),
        Ok(open("m1")),
        Ok(content("m1", "a")),
        Ok(content("m1", "b")),
    ];
    drive(stream::iter(items), session, &mut |update: &SessionUpdate| {
        if let SessionUpdate::MessageDelta { delta, .. } = update {
            deltas.push_str(delta);
        }
    })
    .await;
    assert_eq!(deltas, "ab");
}
