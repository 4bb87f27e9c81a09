#![allow(dead_code)]

use serde_json::json;
use tapwire_core::{Event, FrameDecoder, PatchOp, Role};

pub fn started(thread_id: &str, run_id: &str) -> Event {
    Event::RunStarted {
        thread_id: thread_id.to_string(),
        run_id: run_id.to_string(),
    }
}

pub fn finished(thread_id: &str, run_id: &str) -> Event {
    Event::RunFinished {
        thread_id: thread_id.to_string(),
        run_id: run_id.to_string(),
    }
}

pub fn text(message_id: &str, chunks: &[&str]) -> Vec<Event> {
    let mut events = vec![Event::TextMessageStart {
        message_id: message_id.to_string(),
        role: Role::Assistant,
    }];
    events.extend(chunks.iter().map(|delta| Event::TextMessageContent {
        message_id: message_id.to_string(),
        delta: delta.to_string(),
    }));
    events.push(Event::TextMessageEnd {
        message_id: message_id.to_string(),
    });
    events
}

/// A run that says hello and sets a user name.
pub fn greeting_run() -> Vec<Event> {
    let mut events = vec![
        started("t1", "r1"),
        Event::StateSnapshot {
            snapshot: json!({"user_name": null, "count": 0}),
        },
    ];
    events.extend(text("m1", &["Hel", "lo"]));
    events.push(Event::StateDelta {
        delta: vec![
            PatchOp::replace("/count", json!(1)),
            PatchOp::add("/user_name", json!("Ada")),
        ],
    });
    events.push(finished("t1", "r1"));
    events
}

/// Decode a complete byte stream by feeding it through `cuts`.
pub fn decode_chunked(bytes: &[u8], cuts: &[usize]) -> Vec<Event> {
    let mut decoder = FrameDecoder::new();
    let mut events = Vec::new();
    let mut start = 0;
    for &cut in cuts.iter().chain(std::iter::once(&bytes.len())) {
        events.extend(decoder.push(&bytes[start..cut]));
        start = cut;
    }
    events.extend(decoder.finish());
    events
}
