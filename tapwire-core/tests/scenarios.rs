mod common;

use std::sync::Arc;

use common::{decode_chunked, finished, greeting_run, started, text};
use futures::StreamExt;
use serde_json::json;
use tapwire_core::agents::{EchoAgent, MemoryAgent};
use tapwire_core::{
    decode_message, encode_sse, Event, FrameDecoder, Framing, InputMessage, Lifecycle, PatchOp,
    Relay, RunAgentInput, RunOutcome, RunSession, SessionUpdate, StateDocument, StateHandle,
    ThreadRegistry,
};

fn sse_bytes(events: &[Event]) -> Vec<u8> {
    events
        .iter()
        .map(|e| encode_sse(e).unwrap())
        .collect::<String>()
        .into_bytes()
}

fn hi_run() -> Vec<Event> {
    let mut events = vec![started("t1", "r1")];
    events.extend(text("m1", &["H", "i"]));
    events.push(finished("t1", "r1"));
    events
}

#[test]
fn test_decoded_stream_assembles_message() {
    let bytes = sse_bytes(&hi_run());
    let events = decode_chunked(&bytes, &[7, 40, 41, 150]);
    assert_eq!(events, hi_run());

    let mut session = RunSession::new("t1", StateHandle::default());
    for event in &events {
        session.handle(event).unwrap();
    }
    assert_eq!(session.lifecycle(), Lifecycle::Finished);
    assert_eq!(session.outcome(), Some(&RunOutcome::Finished));
    assert_eq!(session.messages().len(), 1);
    assert_eq!(session.messages()[0].id, "m1");
    assert_eq!(session.messages()[0].content, "Hi");
}

#[test]
fn test_add_to_empty_document() {
    let mut doc = StateDocument::new();
    doc.apply_delta(&[PatchOp::add("/user_name", json!("Alice"))])
        .unwrap();
    assert_eq!(doc.value(), &json!({"user_name": "Alice"}));
}

#[test]
fn test_append_to_array() {
    let mut doc = StateDocument::with_value(json!({"topics": ["weather"]}));
    doc.apply_delta(&[PatchOp::add("/topics/-", json!("math"))])
        .unwrap();
    assert_eq!(doc.value(), &json!({"topics": ["weather", "math"]}));
}

#[test]
fn test_truncated_frame_is_dropped_alone() {
    let frames: Vec<String> = hi_run().iter().map(|e| encode_sse(e).unwrap()).collect();
    let third = &frames[2];
    let cut = third.len() / 2;

    // A proxy flushed half of the third frame and terminated the line.
    let mut corrupted = frames[..2].concat();
    corrupted.push_str(&third[..cut]);
    corrupted.push_str("\n\n");
    corrupted.push_str(&frames[3..].concat());

    let mut decoder = FrameDecoder::new();
    let events = decoder.push(corrupted.as_bytes());
    let mut expected = hi_run();
    expected.remove(2);

    assert_eq!(events, expected);
    assert_eq!(decoder.skipped(), 1);
    assert!(decoder.is_terminated());
}

#[test]
fn test_unmatched_content_is_tolerated() {
    let mut session = RunSession::new("t1", StateHandle::default());
    session.handle(&started("t1", "r1")).unwrap();
    session.handle(&text("m1", &[])[0]).unwrap();
    session
        .handle(&Event::TextMessageContent {
            message_id: "m1".to_string(),
            delta: "a".to_string(),
        })
        .unwrap();

    let updates = session
        .handle(&Event::TextMessageContent {
            message_id: "other".to_string(),
            delta: "b".to_string(),
        })
        .unwrap();
    assert!(matches!(updates[..], [SessionUpdate::Violation(_)]));
    assert_eq!(session.open_message_content(), Some("a"));

    session
        .handle(&Event::TextMessageEnd {
            message_id: "m1".to_string(),
        })
        .unwrap();
    session.handle(&finished("t1", "r1")).unwrap();
    assert_eq!(session.messages()[0].content, "a");
}

#[test]
fn test_chunking_between_frames_preserves_sequence() {
    let events = greeting_run();
    let frames: Vec<String> = events.iter().map(|e| encode_sse(e).unwrap()).collect();
    let bytes = frames.concat().into_bytes();

    let boundaries: Vec<usize> = frames
        .iter()
        .scan(0, |offset, frame| {
            *offset += frame.len();
            Some(*offset)
        })
        .collect();

    // Every subset of frame boundaries is a valid chunking.
    let inner = &boundaries[..boundaries.len() - 1];
    for mask in 0u32..(1 << inner.len()) {
        let cuts: Vec<usize> = inner
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, b)| *b)
            .collect();
        assert_eq!(decode_chunked(&bytes, &cuts), events, "cuts {cuts:?}");
    }
}

#[test]
fn test_snapshot_is_idempotent() {
    let snapshot = json!({"user_name": "Ada", "topics": ["math"]});
    let once = StateHandle::default();
    once.apply_snapshot(snapshot.clone());
    let twice = StateHandle::default();
    twice.apply_snapshot(snapshot.clone());
    twice.apply_snapshot(snapshot);
    assert_eq!(once.snapshot(), twice.snapshot());
}

#[test]
fn test_bad_delta_leaves_document_unchanged() {
    let state = StateHandle::default();
    state.apply_snapshot(json!({"count": 1}));
    let before = state.snapshot();

    let result = state.apply_delta(&[
        PatchOp::replace("/count", json!(2)),
        PatchOp::replace("/missing/deep", json!(true)),
    ]);
    assert_eq!(result.unwrap_err().0, 1);
    assert_eq!(state.snapshot(), before);
}

#[test]
fn test_session_applies_state_events() {
    let state = StateHandle::default();
    let mut session = RunSession::new("t1", state.clone());
    for event in &greeting_run() {
        session.handle(event).unwrap();
    }
    assert_eq!(state.snapshot(), json!({"user_name": "Ada", "count": 1}));
    assert_eq!(session.messages()[0].content, "Hello");
}

#[test]
fn test_websocket_messages_decode_individually() {
    for event in greeting_run() {
        let message = Framing::WebSocket.encode(&event).unwrap();
        assert_eq!(decode_message(&message).unwrap(), event);
    }
}

#[tokio::test]
async fn test_relay_round_trip_through_decoder() {
    let relay = Relay::default();
    let input = RunAgentInput::new("t1")
        .with_run_id("r1")
        .with_message(InputMessage::user("u1", "ping"));
    let frames: Vec<String> = relay
        .stream(Arc::new(EchoAgent::new()), input, Framing::Sse)
        .unwrap()
        .collect()
        .await;

    let bytes = frames.concat().into_bytes();
    let events = decode_chunked(&bytes, &[3, 64, 65]);

    let mut session = RunSession::new("t1", StateHandle::default()).expecting_run("r1");
    for event in &events {
        session.handle(event).unwrap();
    }
    assert_eq!(session.outcome(), Some(&RunOutcome::Finished));
    assert_eq!(session.messages()[0].content, "Echo: ping");
}

#[tokio::test]
async fn test_memory_state_persists_across_runs() {
    let relay = Relay::new(ThreadRegistry::new(), Default::default());
    let agent = Arc::new(MemoryAgent::new());

    for (run, text) in [("r1", "my name is ada"), ("r2", "I prefer dark mode")] {
        let input = RunAgentInput::new("t1")
            .with_run_id(run)
            .with_message(InputMessage::user(run, text));
        let frames: Vec<String> = relay
            .stream(agent.clone(), input, Framing::WebSocket)
            .unwrap()
            .collect()
            .await;
        let last = decode_message(frames.last().unwrap()).unwrap();
        assert!(matches!(last, Event::RunFinished { .. }));
    }

    let state = relay.threads().snapshot("t1").unwrap();
    assert_eq!(state["user_name"], json!("Ada"));
    assert_eq!(state["preferences"]["theme"], json!("dark"));
    assert_eq!(state["conversation_count"], json!(2));
}
