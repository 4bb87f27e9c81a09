//! Application state for the tapwire server.

use std::sync::Arc;
use std::time::Duration;

use tapwire_core::{AgentRegistry, Relay};

/// Shared application state.
///
/// Cloned for each request handler. The registry is frozen once the router
/// is built; the relay carries the per-thread state documents.
#[derive(Clone)]
pub struct AppState {
    pub agents: Arc<AgentRegistry>,
    pub relay: Relay,
    /// Interval of SSE keep-alive comments.
    pub keep_alive: Option<Duration>,
}

impl AppState {
    pub fn new(agents: AgentRegistry, relay: Relay, keep_alive: Option<Duration>) -> Self {
        Self {
            agents: Arc::new(agents),
            relay,
            keep_alive,
        }
    }

    /// Union of the features advertised by the registered agents.
    pub fn features(&self) -> Vec<String> {
        let mut features: Vec<String> = self
            .agents
            .infos()
            .into_values()
            .flat_map(|info| info.features)
            .collect();
        features.sort();
        features.dedup();
        features
    }
}
