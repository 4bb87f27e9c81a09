use super::*;
use futures::stream;

#[tokio::test]
async fn test_forward_frames_copies_in_order_then_closes() {
    let frames = stream::iter(vec!["a".to_string(), "b".to_string()]).boxed();
    let (tx, mut rx) = mpsc::channel(1);
    let task = tokio::spawn(forward_frames(frames, tx, None));

    assert_eq!(rx.recv().await.as_deref(), Some("a"));
    assert_eq!(rx.recv().await.as_deref(), Some("b"));
    assert_eq!(rx.recv().await, None);
    task.await.unwrap();
}

#[tokio::test]
async fn test_forward_frames_sends_keep_alive_while_quiet() {
    let frames = stream::pending::<String>().boxed();
    let (tx, mut rx) = mpsc::channel(4);
    let task = tokio::spawn(forward_frames(frames, tx, Some(Duration::from_millis(5))));

    assert_eq!(rx.recv().await.as_deref(), Some(KEEP_ALIVE_FRAME));
    assert_eq!(rx.recv().await.as_deref(), Some(KEEP_ALIVE_FRAME));

    drop(rx);
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("forwarder stops once the client is gone")
        .unwrap();
}

#[tokio::test]
async fn test_forward_frames_stops_on_disconnect_without_keep_alive() {
    let frames = stream::pending::<String>().boxed();
    let (tx, rx) = mpsc::channel(4);
    let task = tokio::spawn(forward_frames(frames, tx, None));

    drop(rx);
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("forwarder stops once the client is gone")
        .unwrap();
}

#[test]
fn test_keep_alive_is_an_sse_comment() {
    let mut decoder = tapwire_core::FrameDecoder::new();
    assert!(decoder.push(KEEP_ALIVE_FRAME.as_bytes()).is_empty());
    assert_eq!(decoder.skipped(), 0);
}
