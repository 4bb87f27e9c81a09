use super::*;
use crate::encoder::encode_sse;
use crate::events::Role;
use futures::stream;
use std::convert::Infallible;

fn scenario_events() -> Vec<Event> {
    vec![
        Event::RunStarted {
            thread_id: "t1".to_string(),
            run_id: "r1".to_string(),
        },
        Event::TextMessageStart {
            message_id: "m1".to_string(),
            role: Role::Assistant,
        },
        Event::TextMessageContent {
            message_id: "m1".to_string(),
            delta: "H".to_string(),
        },
        Event::TextMessageContent {
            message_id: "m1".to_string(),
            delta: "i".to_string(),
        },
        Event::TextMessageEnd {
            message_id: "m1".to_string(),
        },
        Event::RunFinished {
            thread_id: "t1".to_string(),
            run_id: "r1".to_string(),
        },
    ]
}

fn scenario_frames() -> Vec<String> {
    scenario_events()
        .iter()
        .map(|e| encode_sse(e).unwrap())
        .collect()
}

fn scenario_bytes() -> Vec<u8> {
    scenario_frames().concat().into_bytes()
}

#[test]
fn test_whole_stream_in_one_chunk() {
    let mut decoder = FrameDecoder::new();
    assert_eq!(decoder.push(&scenario_bytes()), scenario_events());
    assert!(decoder.is_terminated());
    assert_eq!(decoder.skipped(), 0);
}

#[test]
fn test_every_split_point_recovers_all_events() {
    let bytes = scenario_bytes();
    for split in 0..=bytes.len() {
        let mut decoder = FrameDecoder::new();
        let mut events = decoder.push(&bytes[..split]);
        events.extend(decoder.push(&bytes[split..]));
        assert_eq!(events, scenario_events(), "split at byte {split}");
        assert_eq!(decoder.skipped(), 0);
    }
}

#[test]
fn test_byte_at_a_time_recovers_all_events() {
    let mut decoder = FrameDecoder::new();
    let mut events = Vec::new();
    for byte in scenario_bytes() {
        events.extend(decoder.push(&[byte]));
    }
    assert_eq!(events, scenario_events());
}

#[test]
fn test_split_inside_multibyte_character() {
    let event = Event::TextMessageContent {
        message_id: "m1".to_string(),
        delta: "👋".to_string(),
    };
    let bytes = encode_sse(&event).unwrap().into_bytes();
    let emoji_start = bytes.iter().position(|&b| b == 0xF0).unwrap();

    let mut decoder = FrameDecoder::new();
    assert!(decoder.push(&bytes[..emoji_start + 2]).is_empty());
    assert_eq!(decoder.push(&bytes[emoji_start + 2..]), vec![event]);
}

#[test]
fn test_partial_line_stays_buffered() {
    let mut decoder = FrameDecoder::new();
    assert!(decoder.push(b"data: {\"type\":\"RUN_STA").is_empty());
    assert_eq!(decoder.pending_len(), 22);
    assert_eq!(decoder.skipped(), 0);
}

#[test]
fn test_broken_frame_is_skipped_and_others_survive() {
    // The producer broke frame 3 across two lines.
    let frames = scenario_frames();
    let (head, tail) = frames[2].split_at(30);
    let mut wire = String::new();
    wire.push_str(&frames[0]);
    wire.push_str(&frames[1]);
    wire.push_str(head);
    wire.push('\n');
    wire.push_str(tail);
    for frame in &frames[3..] {
        wire.push_str(frame);
    }

    let mut decoder = FrameDecoder::new();
    let events = decoder.push(wire.as_bytes());

    let mut expected = scenario_events();
    expected.remove(2);
    assert_eq!(events, expected);
    assert_eq!(decoder.skipped(), 1);
    let skips = decoder.take_skips();
    assert_eq!(skips[0].payload, "{\"type\":\"TEXT_MESSAGE_CO");
    assert_eq!(decoder.skipped(), 0);
}

#[test]
fn test_non_data_lines_are_ignored() {
    let mut decoder = FrameDecoder::new();
    let input = b": keep-alive\n\nevent: message\nid: 7\nretry: 100\n\n\
                  data: {\"type\":\"TEXT_MESSAGE_END\",\"message_id\":\"m1\"}\n\n";
    assert_eq!(
        decoder.push(input),
        vec![Event::TextMessageEnd {
            message_id: "m1".to_string()
        }]
    );
    assert_eq!(decoder.skipped(), 0);
}

#[test]
fn test_double_prefix_is_stripped_once() {
    let line = b"data: data: {\"type\":\"TEXT_MESSAGE_END\",\"message_id\":\"m1\"}";
    assert_eq!(
        decode_line(line),
        Some(Ok(Event::TextMessageEnd {
            message_id: "m1".to_string()
        }))
    );

    let triple = b"data: data: data: {\"type\":\"TEXT_MESSAGE_END\",\"message_id\":\"m1\"}";
    assert!(matches!(decode_line(triple), Some(Err(_))));
}

#[test]
fn test_crlf_line_endings() {
    let mut decoder = FrameDecoder::new();
    let events =
        decoder.push(b"data: {\"type\":\"TEXT_MESSAGE_END\",\"message_id\":\"m1\"}\r\n\r\n");
    assert_eq!(events.len(), 1);
}

#[test]
fn test_prefix_without_space_is_not_a_candidate() {
    assert_eq!(decode_line(b"data:{\"type\":\"RUN_FINISHED\"}"), None);
    assert_eq!(decode_line(b""), None);
}

#[test]
fn test_decoding_stops_after_terminal_event() {
    let mut bytes = scenario_bytes();
    bytes.extend_from_slice(encode_sse(&scenario_events()[1]).unwrap().as_bytes());

    let mut decoder = FrameDecoder::new();
    assert_eq!(decoder.push(&bytes), scenario_events());
    let late = b"data: {\"type\":\"RUN_STARTED\",\"thread_id\":\"t\",\"run_id\":\"r\"}\n";
    assert!(decoder.push(late).is_empty());
    assert_eq!(decoder.pending_len(), 0);
}

#[test]
fn test_finish_flushes_unterminated_last_line() {
    let mut decoder = FrameDecoder::new();
    assert!(decoder
        .push(b"data: {\"type\":\"RUN_FINISHED\",\"thread_id\":\"t1\",\"run_id\":\"r1\"}")
        .is_empty());
    let events = decoder.finish();
    assert_eq!(events.len(), 1);
    assert!(decoder.is_terminated());
}

#[test]
fn test_finish_records_truncated_last_line() {
    let mut decoder = FrameDecoder::new();
    decoder.push(b"data: {\"type\":\"TEXT_MESS");
    assert!(decoder.finish().is_empty());
    assert_eq!(decoder.skipped(), 1);
}

#[test]
fn test_decode_message() {
    let event = decode_message(r#"{"type":"TEXT_MESSAGE_END","message_id":"m1"}"#).unwrap();
    assert_eq!(
        event,
        Event::TextMessageEnd {
            message_id: "m1".to_string()
        }
    );
    assert!(decode_message("not json").is_err());
}

#[tokio::test]
async fn test_decode_stream_yields_events_and_stops() {
    let bytes = scenario_bytes();
    let chunks: Vec<Result<Vec<u8>, Infallible>> =
        bytes.chunks(7).map(|c| Ok(c.to_vec())).collect();

    let events: Vec<_> = decode_stream(stream::iter(chunks), None).collect().await;
    let events: Vec<Event> = events.into_iter().map(|e| e.unwrap()).collect();
    assert_eq!(events, scenario_events());
}

#[tokio::test]
async fn test_decode_stream_reports_early_close() {
    let frames = scenario_frames();
    let chunks: Vec<Result<String, Infallible>> = frames[..3].iter().cloned().map(Ok).collect();

    let items: Vec<_> = decode_stream(stream::iter(chunks), None).collect().await;
    assert_eq!(items.len(), 4);
    assert!(items[..3].iter().all(Result::is_ok));
    assert!(matches!(items[3], Err(RelayError::TransportClosed)));
}

#[tokio::test]
async fn test_decode_stream_reports_transport_error() {
    let chunks: Vec<Result<&[u8], &str>> = vec![
        Ok(b"data: {\"type\":\"RUN_STARTED\",\"thread_id\":\"t1\",\"run_id\":\"r1\"}\n\n"),
        Err("connection reset"),
    ];
    let items: Vec<_> = decode_stream(stream::iter(chunks), None).collect().await;
    assert_eq!(items.len(), 2);
    match &items[1] {
        Err(RelayError::Transport(msg)) => assert_eq!(msg, "connection reset"),
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_decode_stream_idle_timeout() {
    let first: Result<&[u8], Infallible> =
        Ok(b"data: {\"type\":\"RUN_STARTED\",\"thread_id\":\"t1\",\"run_id\":\"r1\"}\n\n");
    let source = stream::iter(vec![first]).chain(stream::pending());

    let items: Vec<_> = decode_stream(source, Some(Duration::from_secs(5)))
        .collect()
        .await;
    assert_eq!(items.len(), 2);
    assert!(matches!(
        items[1],
        Err(RelayError::IdleTimeout(limit)) if limit == Duration::from_secs(5)
    ));
}
