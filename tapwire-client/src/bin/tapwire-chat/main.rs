//! `tapwire-chat`: a line-oriented chat client for a tapwire server.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tapwire_client::{ClientThread, SseClient, Transport, WsClient};
use tapwire_core::{RunOutcome, SessionUpdate};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use commands::Command;

mod commands;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum TransportKind {
    Sse,
    Ws,
}

#[derive(Debug, Parser)]
#[command(name = "tapwire-chat", about = "Chat with a tapwire agent", version, long_about = None)]
struct Cli {
    /// Run endpoint, e.g. http://127.0.0.1:8000/agent or ws://127.0.0.1:8000/ws.
    #[arg(long, default_value = "http://127.0.0.1:8000/agent")]
    url: String,

    #[arg(long, value_enum, default_value_t = TransportKind::Sse)]
    transport: TransportKind,

    /// Agent to talk to; the server default when omitted.
    #[arg(long)]
    agent: Option<String>,

    /// Continue an existing thread.
    #[arg(long)]
    thread: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to init tracing: {err}"))?;

    let transport: Box<dyn Transport> = match args.transport {
        TransportKind::Sse => Box::new(SseClient::new(&args.url)),
        TransportKind::Ws => Box::new(WsClient::new(&args.url)),
    };
    let mut thread = match args.thread {
        Some(id) => ClientThread::with_id(id),
        None => ClientThread::new(),
    };
    thread.set_agent(args.agent);

    println!(
        "thread {} ({}). /state, /agent <name>, /quit",
        thread.thread_id(),
        args.url
    );

    let mut rl = DefaultEditor::new()?;
    let history_path = dirs::cache_dir()
        .map(|p| p.join("tapwire/history.txt"))
        .unwrap_or_else(|| ".tapwire/history.txt".into());
    if history_path.exists() {
        rl.load_history(&history_path).ok();
    }

    loop {
        let line = match rl.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("error: {err}");
                break;
            }
        };
        let Some(command) = Command::parse(&line) else {
            continue;
        };
        rl.add_history_entry(line.trim())?;

        match command {
            Command::Quit => break,
            Command::State => println!("{}", serde_json::to_string_pretty(&thread.snapshot())?),
            Command::Agent(name) => {
                thread.set_agent(name.map(str::to_string));
                println!("agent: {}", thread.agent().unwrap_or("(server default)"));
            }
            Command::Unknown(name) => eprintln!("unknown command {name}"),
            Command::Message(text) => turn(&mut thread, transport.as_ref(), text).await,
        }
    }

    save_history(&mut rl, &history_path);
    Ok(())
}

fn save_history(rl: &mut DefaultEditor, path: &Path) {
    if let Some(dir) = path.parent() {
        if let Err(err) = std::fs::create_dir_all(dir) {
            debug!(error = %err, "cannot create history directory");
            return;
        }
    }
    if let Err(err) = rl.save_history(path) {
        debug!(error = %err, "cannot save history");
    }
}

async fn turn(thread: &mut ClientThread, transport: &dyn Transport, line: &str) {
    let mut print_delta = |update: &SessionUpdate| match update {
        SessionUpdate::MessageDelta { delta, .. } => {
            print!("{delta}");
            let _ = std::io::stdout().flush();
        }
        SessionUpdate::MessageCompleted(_) => println!(),
        SessionUpdate::StateReplaced { version } | SessionUpdate::StatePatched { version, .. } => {
            eprintln!("[state v{version}]");
        }
        _ => {}
    };

    match thread.send_with(transport, line, &mut print_delta).await {
        Ok(report) => {
            for warning in &report.warnings {
                eprintln!("warning: {warning}");
            }
            match report.outcome {
                RunOutcome::Finished => {}
                RunOutcome::Errored { error, .. } => eprintln!("\nrun failed: {error}"),
                RunOutcome::Aborted { reason } => eprintln!("\nrun aborted: {reason}"),
            }
        }
        Err(err) => eprintln!("error: {err}"),
    }
}
