//! HTTP handlers for the SSE run endpoint, health and agent listing.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    http::HeaderValue,
    response::Response,
    Json,
};
use futures::StreamExt;
use serde_json::{json, Value};
use tapwire_core::{AgentInfo, FrameStream, Framing, RunAgentInput, SSE_HEADERS};
use tokio::sync::mpsc;
use tokio::time::Interval;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

/// SSE comment line sent while a run is quiet. Decoders drop it.
pub const KEEP_ALIVE_FRAME: &str = ":\n\n";

/// Handle a run request.
///
/// Accepts POST with a `RunAgentInput` body and returns the run's SSE frames.
/// Fails with 400 for malformed input or an unknown agent and with 409 when
/// the thread already has an active run. Failures after the stream has
/// started arrive as a `RUN_ERROR` frame.
pub async fn sse_handler(
    State(state): State<AppState>,
    payload: Result<Json<RunAgentInput>, JsonRejection>,
) -> ServerResult<Response> {
    let Json(input) = payload.map_err(|e| ServerError::InvalidRequest(e.body_text()))?;
    let (name, agent) = state.agents.resolve(input.agent_type.as_deref())?;
    info!(thread_id = %input.thread_id, agent = %name, "sse run requested");

    let frames = state.relay.stream(agent, input, Framing::Sse)?;

    let (tx, rx) = mpsc::channel::<String>(state.relay.config().channel_capacity);
    tokio::spawn(forward_frames(frames, tx, state.keep_alive));

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    let mut response = Response::new(body);
    for (name, value) in SSE_HEADERS {
        response
            .headers_mut()
            .insert(name, HeaderValue::from_static(value));
    }
    Ok(response)
}

/// Copy frames into the response channel, interleaving keep-alive comments.
///
/// Ends when the run ends or the client goes away; either way the frame
/// stream is dropped, which releases the thread's run slot. Dropping the
/// response body closes the channel, so a disconnect is seen even while
/// the agent is silent and keep-alives are off.
async fn forward_frames(
    mut frames: FrameStream,
    tx: mpsc::Sender<String>,
    keep_alive: Option<Duration>,
) {
    let mut ticker = keep_alive.map(|period| {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker
    });

    loop {
        let frame = tokio::select! {
            frame = frames.next() => frame,
            _ = tick(&mut ticker) => Some(KEEP_ALIVE_FRAME.to_string()),
            _ = tx.closed() => {
                debug!("sse client disconnected");
                break;
            }
        };
        let Some(frame) = frame else {
            break;
        };
        if tx.send(frame).await.is_err() {
            debug!("sse client disconnected");
            break;
        }
    }
}

/// Wait for the next keep-alive tick; never resolves when keep-alives are off.
async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// `GET` health check.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "agents": state.agents.names(),
        "features": state.features(),
    }))
}

/// `GET` registered agents keyed by name.
pub async fn list_agents_handler(
    State(state): State<AppState>,
) -> Json<BTreeMap<String, AgentInfo>> {
    Json(state.agents.infos())
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
