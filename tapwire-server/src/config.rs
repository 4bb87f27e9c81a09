//! Server configuration loaded from TOML.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tapwire_core::RelayConfig;

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings for the `tapwire-server` binary.
///
/// Every field has a default, so an empty file (or no file) is valid.
///
/// ```toml
/// bind = "127.0.0.1:8000"
/// sse_path = "/agent"
/// ws_path = "/ws"
/// default_agent = "memory"
/// idle_timeout_secs = 30
/// keep_alive_secs = 15
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind: SocketAddr,
    /// Path of the SSE run endpoint.
    pub sse_path: String,
    /// Path of the WebSocket run endpoint; empty disables it.
    pub ws_path: String,
    /// Agent used when a request carries no `agent_type`.
    pub default_agent: Option<String>,
    /// Fail a run whose agent produces nothing for this long; 0 disables.
    pub idle_timeout_secs: u64,
    /// Interval of SSE keep-alive comments; 0 disables.
    pub keep_alive_secs: u64,
    /// Frames buffered between a run and its HTTP response.
    pub channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            sse_path: "/agent".to_string(),
            ws_path: "/ws".to_string(),
            default_agent: None,
            idle_timeout_secs: 0,
            keep_alive_secs: 15,
            channel_capacity: RelayConfig::default().channel_capacity,
        }
    }
}

impl ServerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.sse_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "sse_path must start with '/': {}",
                self.sse_path
            )));
        }
        if !self.ws_path.is_empty() && !self.ws_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "ws_path must start with '/': {}",
                self.ws_path
            )));
        }
        if self.ws_path == self.sse_path {
            return Err(ConfigError::Invalid(
                "sse_path and ws_path must differ".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// The WebSocket path, if enabled.
    pub fn websocket_path(&self) -> Option<&str> {
        (!self.ws_path.is_empty()).then_some(self.ws_path.as_str())
    }

    pub fn keep_alive(&self) -> Option<Duration> {
        (self.keep_alive_secs > 0).then(|| Duration::from_secs(self.keep_alive_secs))
    }

    /// Relay settings derived from this config.
    pub fn relay_config(&self) -> RelayConfig {
        let config = RelayConfig::default().with_channel_capacity(self.channel_capacity);
        if self.idle_timeout_secs > 0 {
            config.with_idle_timeout(Duration::from_secs(self.idle_timeout_secs))
        } else {
            config
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
