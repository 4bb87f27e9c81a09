//! WebSocket run endpoint.
//!
//! Each inbound text message is one `RunAgentInput`. Runs on one connection
//! are served in order: a request that arrives while a run is streaming is
//! queued until that run has sent its terminal frame. Closing the socket
//! mid-run cancels the run.

use std::collections::VecDeque;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tapwire_core::{encode_json, Event, Framing, RelayError, RunAgentInput};
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Upgrade the connection and serve runs over it.
pub async fn websocket_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| serve_socket(state, socket))
}

/// The peer went away or the socket failed.
struct Disconnected;

async fn serve_socket(state: AppState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let mut queued = VecDeque::new();
    debug!("websocket connected");

    loop {
        let message = match queued.pop_front() {
            Some(message) => message,
            None => match receiver.next().await {
                Some(Ok(message)) => message,
                Some(Err(err)) => {
                    debug!(error = %err, "websocket read failed");
                    break;
                }
                None => break,
            },
        };

        let mut inbound = Inbound {
            receiver: &mut receiver,
            queued: &mut queued,
        };
        let result = match message {
            Message::Text(text) => run_message(&state, &text, &mut sender, &mut inbound).await,
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => run_message(&state, &text, &mut sender, &mut inbound).await,
                Err(_) => {
                    let error = "binary frame is not UTF-8 JSON";
                    send_error(&mut sender, "", "", error, "invalid_request").await
                }
            },
            Message::Ping(payload) => sender
                .send(Message::Pong(payload))
                .await
                .map_err(|_| Disconnected),
            Message::Pong(_) => Ok(()),
            Message::Close(_) => break,
        };

        if result.is_err() {
            break;
        }
    }

    debug!("websocket closed");
}

/// The read half of a connection while a run is streaming.
///
/// Requests that arrive mid-run are queued and served once the run ends.
struct Inbound<'a, R> {
    receiver: &'a mut R,
    queued: &'a mut VecDeque<Message>,
}

impl<R> Inbound<'_, R>
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    /// Wait for the peer to do something that needs an answer.
    ///
    /// Returns the payload of a ping, or `Disconnected` once the peer
    /// closes or the socket fails.
    async fn next_ping(&mut self) -> Result<Vec<u8>, Disconnected> {
        loop {
            match self.receiver.next().await {
                Some(Ok(Message::Ping(payload))) => return Ok(payload),
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(message @ (Message::Text(_) | Message::Binary(_)))) => {
                    self.queued.push_back(message)
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return Err(Disconnected),
            }
        }
    }
}

/// Start a run from one inbound message and send its frames.
///
/// Watches the read half while streaming so a peer that goes away ends the
/// run even when the agent is silent.
async fn run_message<S, R>(
    state: &AppState,
    text: &str,
    sender: &mut S,
    inbound: &mut Inbound<'_, R>,
) -> Result<(), Disconnected>
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let input: RunAgentInput = match serde_json::from_str(text) {
        Ok(input) => input,
        Err(err) => {
            warn!(error = %err, "malformed run request");
            let thread_id = thread_id_hint(text);
            return send_error(
                sender,
                &thread_id,
                "",
                &format!("invalid run request: {err}"),
                "invalid_request",
            )
            .await;
        }
    };

    let thread_id = input.thread_id.clone();
    let run_id = input.run_id.clone().unwrap_or_default();
    let mut frames = match state
        .agents
        .resolve(input.agent_type.as_deref())
        .and_then(|(name, agent)| {
            info!(%thread_id, agent = %name, "websocket run requested");
            state.relay.stream(agent, input, Framing::WebSocket)
        }) {
        Ok(frames) => frames,
        Err(err) => {
            return send_relay_error(sender, &thread_id, &run_id, &err).await;
        }
    };

    loop {
        tokio::select! {
            frame = frames.next() => {
                let Some(frame) = frame else {
                    return Ok(());
                };
                if sender.send(Message::Text(frame)).await.is_err() {
                    debug!(%thread_id, "websocket client disconnected mid-run");
                    return Err(Disconnected);
                }
            }
            ping = inbound.next_ping() => {
                let Ok(payload) = ping else {
                    debug!(%thread_id, "websocket client disconnected mid-run");
                    return Err(Disconnected);
                };
                if sender.send(Message::Pong(payload)).await.is_err() {
                    return Err(Disconnected);
                }
            }
        }
    }
}

async fn send_relay_error<S>(
    sender: &mut S,
    thread_id: &str,
    run_id: &str,
    err: &RelayError,
) -> Result<(), Disconnected>
where
    S: Sink<Message> + Unpin,
{
    send_error(sender, thread_id, run_id, &err.to_string(), err.code()).await
}

async fn send_error<S>(
    sender: &mut S,
    thread_id: &str,
    run_id: &str,
    error: &str,
    code: &str,
) -> Result<(), Disconnected>
where
    S: Sink<Message> + Unpin,
{
    let event = Event::RunError {
        thread_id: thread_id.to_string(),
        run_id: run_id.to_string(),
        error: error.to_string(),
        code: Some(code.to_string()),
    };
    let frame = match encode_json(&event) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(error = %err, "cannot encode run error");
            return Ok(());
        }
    };
    sender
        .send(Message::Text(frame))
        .await
        .map_err(|_| Disconnected)
}

/// Best-effort `thread_id` from a request that did not deserialize.
fn thread_id_hint(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|value| {
            value
                .get("thread_id")
                .or_else(|| value.get("threadId"))
                .and_then(|id| id.as_str())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "websocket_tests.rs"]
mod tests;
