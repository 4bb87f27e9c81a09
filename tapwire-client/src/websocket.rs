//! WebSocket transport.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, Stream, StreamExt};
use tapwire_core::{
    decode_message, Event, RelayError, RunAgentInput, RunSession, SessionUpdate,
    StateHandle,
};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::report::{drive, RunReport};
use crate::transport::Transport;

/// Sends each run request as one text message on a fresh connection and
/// reads one event per text message until the run ends.
#[derive(Debug, Clone)]
pub struct WsClient {
    url: String,
    idle_timeout: Option<Duration>,
}

impl WsClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            idle_timeout: None,
        }
    }

    /// Abort a run when no message arrives for this long.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WsClient {
    async fn run_with(
        &self,
        mut input: RunAgentInput,
        state: StateHandle,
        on_update: &mut (dyn for<'u> FnMut(&'u SessionUpdate) + Send),
    ) -> Result<RunReport, ClientError> {
        let run_id = input.ensure_run_id().to_string();
        info!(thread_id = %input.thread_id, %run_id, url = %self.url, "starting websocket run");

        let (mut socket, _) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        socket
            .send(Message::Text(serde_json::to_string(&input)?))
            .await?;

        let session = RunSession::new(input.thread_id, state).expecting_run(run_id);
        let events = message_events(&mut socket, self.idle_timeout);
        let report = drive(events, session, on_update).await;

        if let Err(err) = socket.close(None).await {
            debug!(error = %err, "websocket close failed");
        }
        Ok(report)
    }
}

/// Decode text messages into events, ending after a terminal event.
///
/// Messages that do not decode are logged and skipped. The socket closing
/// first yields [`RelayError::TransportClosed`].
fn message_events<S>(
    socket: &mut S,
    idle_timeout: Option<Duration>,
) -> impl Stream<Item = Result<Event, RelayError>> + Send + '_
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin + Send,
{
    async_stream::stream! {
        loop {
            let next = match idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, socket.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        yield Err(RelayError::IdleTimeout(limit));
                        return;
                    }
                },
                None => socket.next().await,
            };

            match next {
                Some(Ok(Message::Text(text))) => match decode_message(&text) {
                    Ok(event) => {
                        let terminal = event.is_terminal();
                        yield Ok(event);
                        if terminal {
                            return;
                        }
                    }
                    Err(skip) => warn!(
                        reason = %skip.reason,
                        payload = %skip.payload,
                        "dropping undecodable message"
                    ),
                },
                Some(Ok(Message::Close(_))) | None => {
                    yield Err(RelayError::TransportClosed);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    yield Err(RelayError::Transport(err.to_string()));
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "websocket_tests.rs"]
mod tests;
