//! Receiving side of the AG-UI relay.
//!
//! Sends a run request over SSE or WebSocket, decodes the event stream with
//! [`tapwire_core`], and reassembles messages, tool calls and the thread's
//! state document.
//!
//! # Example
//!
//! ```rust,no_run
//! use tapwire_client::{ClientThread, SseClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SseClient::new("http://127.0.0.1:8000/agent");
//! let mut thread = ClientThread::new();
//!
//! let report = thread.send(&client, "my name is Ada").await?;
//! println!("{}", report.reply());
//! println!("{}", thread.snapshot());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod report;
pub mod sse;
pub mod thread;
pub mod transport;
pub mod websocket;

pub use error::ClientError;
pub use report::RunReport;
pub use sse::SseClient;
pub use thread::ClientThread;
pub use transport::Transport;
pub use websocket::WsClient;
