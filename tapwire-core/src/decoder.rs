//! Frame decoding and reassembly.
//!
//! Transports may split one logical frame across several reads. The
//! decoder keeps a pending-line buffer and only looks at a line once its
//! terminating `\n` has arrived, so a split anywhere inside a line
//! (including inside a multi-byte UTF-8 sequence) is reassembled.
//!
//! Complete lines follow a best-effort policy:
//!
//! - only lines starting with `data: ` are candidates; blank separators,
//!   `:` comments and other SSE fields are discarded;
//! - exactly one `data: ` prefix is stripped, plus one more if a producer
//!   double-wrapped the payload;
//! - a candidate whose payload is not a decodable event is dropped as a
//!   [`DecodeSkip`] (logged, counted) and decoding continues.
//!
//! So a frame is only lost when the producer itself broke it across lines.
//! Decoding ends after the first terminal event.

use std::fmt::Display;
use std::time::Duration;

use futures::stream::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::encoder::SSE_DATA_PREFIX;
use crate::error::{DecodeSkip, RelayError};
use crate::events::Event;

/// Incremental SSE frame decoder.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    skips: Vec<DecodeSkip>,
    terminated: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of transport bytes and return the events it completed,
    /// in arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Event> {
        let mut events = Vec::new();
        if self.terminated {
            return events;
        }
        self.pending.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(offset) = self.pending[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let decoded = decode_line(&self.pending[start..end]);
            start = end + 1;

            match decoded {
                Some(Ok(event)) => {
                    let terminal = event.is_terminal();
                    events.push(event);
                    if terminal {
                        self.terminated = true;
                        break;
                    }
                }
                Some(Err(skip)) => self.record(skip),
                None => {}
            }
        }

        if self.terminated {
            self.pending.clear();
        } else {
            self.pending.drain(..start);
        }
        events
    }

    /// The transport closed: decode a final line that had no trailing newline.
    pub fn finish(&mut self) -> Vec<Event> {
        if self.terminated || self.pending.is_empty() {
            self.pending.clear();
            return Vec::new();
        }
        let line = std::mem::take(&mut self.pending);
        match decode_line(&line) {
            Some(Ok(event)) => {
                self.terminated = event.is_terminal();
                vec![event]
            }
            Some(Err(skip)) => {
                self.record(skip);
                Vec::new()
            }
            None => Vec::new(),
        }
    }

    /// Whether a terminal event has been decoded.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Bytes buffered toward an incomplete line.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of candidate frames dropped so far.
    pub fn skipped(&self) -> usize {
        self.skips.len()
    }

    /// Drain the recorded skips.
    pub fn take_skips(&mut self) -> Vec<DecodeSkip> {
        std::mem::take(&mut self.skips)
    }

    fn record(&mut self, skip: DecodeSkip) {
        warn!(reason = %skip.reason, payload = %skip.payload, "dropping undecodable frame");
        self.skips.push(skip);
    }
}

/// Decode one complete SSE line (without its `\n`).
///
/// `None` means the line is not a data line and is ignored.
pub fn decode_line(line: &[u8]) -> Option<Result<Event, DecodeSkip>> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let prefix = SSE_DATA_PREFIX.as_bytes();
    let payload = line.strip_prefix(prefix)?;
    let payload = payload.strip_prefix(prefix).unwrap_or(payload);

    let text = match std::str::from_utf8(payload) {
        Ok(text) => text,
        Err(err) => {
            return Some(Err(DecodeSkip::new(
                &String::from_utf8_lossy(payload),
                err,
            )))
        }
    };
    Some(Event::decode(text).map_err(|err| DecodeSkip::new(text, err)))
}

/// Decode one WebSocket text message.
pub fn decode_message(text: &str) -> Result<Event, DecodeSkip> {
    Event::decode(text).map_err(|err| DecodeSkip::new(text, err))
}

/// Decode a chunked byte stream into events.
///
/// Yields events in arrival order and ends after the first terminal event.
/// A transport read error yields [`RelayError::Transport`]; the source
/// ending before a terminal event yields [`RelayError::TransportClosed`];
/// no chunk within `idle_timeout` yields [`RelayError::IdleTimeout`].
/// Each of these is the final item.
pub fn decode_stream<S, B, E>(
    source: S,
    idle_timeout: Option<Duration>,
) -> impl Stream<Item = Result<Event, RelayError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    async_stream::stream! {
        futures::pin_mut!(source);
        let mut decoder = FrameDecoder::new();

        loop {
            let next = match idle_timeout {
                Some(limit) => match tokio::time::timeout(limit, source.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        yield Err(RelayError::IdleTimeout(limit));
                        return;
                    }
                },
                None => source.next().await,
            };

            let events = match next {
                Some(Ok(chunk)) => decoder.push(chunk.as_ref()),
                Some(Err(err)) => {
                    yield Err(RelayError::Transport(err.to_string()));
                    return;
                }
                None => {
                    let events = decoder.finish();
                    if !decoder.is_terminated() {
                        for event in events {
                            yield Ok(event);
                        }
                        debug!(
                            skipped = decoder.skipped(),
                            "source ended without a terminal event"
                        );
                        yield Err(RelayError::TransportClosed);
                        return;
                    }
                    events
                }
            };

            for event in events {
                yield Ok(event);
            }
            if decoder.is_terminated() {
                return;
            }
        }
    }
}

#[cfg(test)]
#[path = "decoder_tests.rs"]
mod tests;
