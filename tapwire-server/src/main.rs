//! `tapwire-server`: serves the demo agents over SSE and WebSocket.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tapwire_core::agents::{EchoAgent, HitlAgent, MemoryAgent, ToolAgent};
use tapwire_server::{ServerConfig, TapwireRouter};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "tapwire-server", about = "AG-UI agent server", version, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on; overrides the config file.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    let mut router = TapwireRouter::new()
        .with_agent("echo", Arc::new(EchoAgent::new()))
        .with_agent("memory", Arc::new(MemoryAgent::new()))
        .with_agent("tool", Arc::new(ToolAgent::new()))
        .with_agent("hitl", Arc::new(HitlAgent::new()))
        .config(config.relay_config())
        .keep_alive(config.keep_alive())
        .with_sse(config.sse_path.as_str())
        .with_health("/health")
        .with_agent_list("/agents");
    if let Some(path) = config.websocket_path() {
        router = router.with_websocket(path);
    }
    if let Some(name) = &config.default_agent {
        router = router.default_agent(name.as_str());
    }
    let app = router.build()?;

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("cannot bind {}", config.bind))?;
    info!(
        bind = %config.bind,
        sse_path = %config.sse_path,
        ws_path = ?config.websocket_path(),
        "tapwire-server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server failed")?;
    info!("tapwire-server stopped");
    Ok(())
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to init tracing: {err}"))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to init tracing: {err}"))?,
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "ctrl-c signal handler failed");
    }
}
