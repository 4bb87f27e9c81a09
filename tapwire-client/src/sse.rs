//! SSE transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use tapwire_core::{decode_stream, RunAgentInput, RunSession, SessionUpdate, StateHandle};
use tracing::{debug, info};

use crate::error::ClientError;
use crate::report::{drive, RunReport};
use crate::transport::Transport;

/// Posts run requests and reads the `text/event-stream` response.
///
/// ```rust,no_run
/// use tapwire_client::{SseClient, Transport};
/// use tapwire_core::{InputMessage, RunAgentInput, StateHandle};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = SseClient::new("http://127.0.0.1:8000/agent");
/// let input = RunAgentInput::new("t1").with_message(InputMessage::user("u1", "hello"));
/// let report = client.run(input, StateHandle::default()).await?;
/// println!("{}", report.reply());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SseClient {
    http: reqwest::Client,
    url: String,
    idle_timeout: Option<Duration>,
}

impl SseClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
            idle_timeout: None,
        }
    }

    /// Use a preconfigured HTTP client (proxies, TLS, default headers).
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Abort a run when no bytes arrive for this long.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for SseClient {
    async fn run_with(
        &self,
        mut input: RunAgentInput,
        state: StateHandle,
        on_update: &mut (dyn for<'u> FnMut(&'u SessionUpdate) + Send),
    ) -> Result<RunReport, ClientError> {
        let run_id = input.ensure_run_id().to_string();
        info!(thread_id = %input.thread_id, %run_id, url = %self.url, "starting sse run");

        let response = self
            .http
            .post(&self.url)
            .header(ACCEPT, "text/event-stream")
            .json(&input)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), %body, "run request refused");
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let session = RunSession::new(input.thread_id, state).expecting_run(run_id);
        let events = decode_stream(response.bytes_stream(), self.idle_timeout);
        Ok(drive(events, session, on_update).await)
    }
}
