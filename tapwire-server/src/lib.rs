//! HTTP server exposing tapwire agents over AG-UI.
//!
//! Runs are served over Server-Sent Events (`POST` a `RunAgentInput`, read
//! `data: <json>` frames) and over WebSocket (one text message per request
//! and per event). Both transports are backed by the same
//! [`Relay`](tapwire_core::Relay), so per-thread state documents are shared
//! between them.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tapwire_core::agents::MemoryAgent;
//! use tapwire_server::TapwireRouter;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let app = TapwireRouter::new()
//!     .with_agent("memory", Arc::new(MemoryAgent::new()))
//!     .with_sse("/agent")
//!     .build()?;
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod router;
pub(crate) mod state;

pub(crate) mod agui;

// Re-exports
pub use agui::handler::KEEP_ALIVE_FRAME;
pub use config::{ConfigError, ServerConfig};
pub use error::{BuildError, ServerError, ServerResult};
pub use router::TapwireRouter;
