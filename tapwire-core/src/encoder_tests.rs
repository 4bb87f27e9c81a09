use super::*;
use crate::events::Role;

fn started() -> Event {
    Event::RunStarted {
        thread_id: "t1".to_string(),
        run_id: "r1".to_string(),
    }
}

#[test]
fn test_sse_frame_is_bit_exact() {
    let frame = encode_sse(&started()).unwrap();
    assert_eq!(
        frame,
        "data: {\"type\":\"RUN_STARTED\",\"thread_id\":\"t1\",\"run_id\":\"r1\"}\n\n"
    );
}

#[test]
fn test_sse_frame_has_exactly_one_prefix() {
    let event = Event::TextMessageContent {
        message_id: "m1".to_string(),
        delta: "data: not a prefix".to_string(),
    };
    let frame = encode_sse(&event).unwrap();
    assert!(frame.starts_with("data: {"));
    assert!(!frame.starts_with("data: data: "));
    assert_eq!(frame.matches('\n').count(), 2);
}

#[test]
fn test_newlines_in_content_are_escaped() {
    let event = Event::TextMessageContent {
        message_id: "m1".to_string(),
        delta: "line one\nline two".to_string(),
    };
    let frame = encode_sse(&event).unwrap();
    assert!(frame.contains("line one\\nline two"));
    assert!(frame.ends_with("}\n\n"));
    assert_eq!(frame.matches('\n').count(), 2);
}

#[test]
fn test_websocket_frame_is_bare_json() {
    let event = Event::TextMessageStart {
        message_id: "m1".to_string(),
        role: Role::Assistant,
    };
    let frame = Framing::WebSocket.encode(&event).unwrap();
    assert_eq!(
        frame,
        r#"{"type":"TEXT_MESSAGE_START","message_id":"m1","role":"assistant"}"#
    );
    assert_eq!(frame, encode_json(&event).unwrap());
}

#[test]
fn test_default_framing_is_sse() {
    assert_eq!(Framing::default(), Framing::Sse);
    assert_eq!(
        Framing::default().encode(&started()).unwrap(),
        encode_sse(&started()).unwrap()
    );
}

#[test]
fn test_sse_frame_wraps_payload() {
    assert_eq!(sse_frame("{}"), "data: {}\n\n");
}

#[test]
fn test_sse_headers() {
    assert!(SSE_HEADERS.contains(&("content-type", "text/event-stream")));
    assert!(SSE_HEADERS.contains(&("cache-control", "no-cache")));
    assert!(SSE_HEADERS.contains(&("connection", "keep-alive")));
}
