//! Router builder for tapwire HTTP endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tapwire_core::{Agent, AgentRegistry, Relay, RelayConfig, ThreadRegistry};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agui::handler::{health_handler, list_agents_handler, sse_handler};
use crate::agui::websocket::websocket_handler;
use crate::error::BuildError;
use crate::state::AppState;

/// Builder for configuring tapwire HTTP endpoints.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tapwire_core::agents::{EchoAgent, MemoryAgent};
/// use tapwire_server::TapwireRouter;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let app = TapwireRouter::new()
///     .with_agent("echo", Arc::new(EchoAgent::new()))
///     .with_agent("memory", Arc::new(MemoryAgent::new()))
///     .with_sse("/agent")
///     .with_websocket("/ws")
///     .with_health("/health")
///     .build()?;
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub struct TapwireRouter {
    agents: AgentRegistry,
    default_agent: Option<String>,
    threads: ThreadRegistry,
    relay_config: RelayConfig,
    keep_alive: Option<Duration>,
    sse_path: Option<String>,
    ws_path: Option<String>,
    health_path: Option<String>,
    agents_path: Option<String>,
}

impl Default for TapwireRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl TapwireRouter {
    /// Create an empty router builder.
    pub fn new() -> Self {
        Self {
            agents: AgentRegistry::new(),
            default_agent: None,
            threads: ThreadRegistry::new(),
            relay_config: RelayConfig::default(),
            keep_alive: Some(Duration::from_secs(15)),
            sse_path: None,
            ws_path: None,
            health_path: None,
            agents_path: None,
        }
    }

    /// Register an agent under `name`. The first one registered is the
    /// default unless [`default_agent`](Self::default_agent) says otherwise.
    pub fn with_agent(mut self, name: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        self.agents.register(name, agent);
        self
    }

    /// Agent used for requests without an `agent_type`.
    pub fn default_agent(mut self, name: impl Into<String>) -> Self {
        self.default_agent = Some(name.into());
        self
    }

    /// Share an existing thread registry, e.g. to inspect state documents
    /// from outside the router.
    pub fn threads(mut self, threads: ThreadRegistry) -> Self {
        self.threads = threads;
        self
    }

    /// Relay settings (idle timeout, buffering).
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.relay_config = config;
        self
    }

    /// Interval of `:` comment lines on idle SSE responses; `None` disables.
    pub fn keep_alive(mut self, interval: Option<Duration>) -> Self {
        self.keep_alive = interval;
        self
    }

    /// Enable the SSE run endpoint (`POST`) at `path`.
    pub fn with_sse(mut self, path: impl Into<String>) -> Self {
        self.sse_path = Some(path.into());
        self
    }

    /// Enable the WebSocket run endpoint (`GET` upgrade) at `path`.
    pub fn with_websocket(mut self, path: impl Into<String>) -> Self {
        self.ws_path = Some(path.into());
        self
    }

    /// Enable `GET path` health checks.
    pub fn with_health(mut self, path: impl Into<String>) -> Self {
        self.health_path = Some(path.into());
        self
    }

    /// Enable `GET path` listing the registered agents.
    pub fn with_agent_list(mut self, path: impl Into<String>) -> Self {
        self.agents_path = Some(path.into());
        self
    }

    /// Build the router with all configured endpoints.
    ///
    /// # Errors
    ///
    /// - [`BuildError::NoEndpoints`] without an SSE or WebSocket endpoint.
    /// - [`BuildError::NoAgents`] without a registered agent.
    /// - [`BuildError::UnknownDefault`] if the default agent is not registered.
    pub fn build(mut self) -> Result<Router, BuildError> {
        if self.sse_path.is_none() && self.ws_path.is_none() {
            return Err(BuildError::NoEndpoints);
        }
        if self.agents.is_empty() {
            return Err(BuildError::NoAgents);
        }
        if let Some(name) = self.default_agent.take() {
            self.agents
                .set_default(&name)
                .map_err(|_| BuildError::UnknownDefault(name))?;
        }

        let relay = Relay::new(self.threads, self.relay_config);
        let state = AppState::new(self.agents, relay, self.keep_alive);
        let mut router = Router::new();

        if let Some(path) = self.sse_path {
            router = router.route(&path, post(sse_handler));
        }
        if let Some(path) = self.ws_path {
            router = router.route(&path, get(websocket_handler));
        }
        if let Some(path) = self.health_path {
            router = router.route(&path, get(health_handler));
        }
        if let Some(path) = self.agents_path {
            router = router.route(&path, get(list_agents_handler));
        }

        Ok(router
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()))
    }

    /// Build the router and nest it under a prefix path.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build).
    pub fn build_nested(self, prefix: impl Into<String>) -> Result<Router, BuildError> {
        Ok(Router::new().nest(&prefix.into(), self.build()?))
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
