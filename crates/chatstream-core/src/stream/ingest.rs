//! The stream ingestor: one worker thread per send.
//!
//! The worker opens the response, reads it chunk by chunk, runs every chunk
//! through a [`StreamParser`] and sends the resulting signals over a channel.
//! It never touches the message log; the client on the other end of the
//! channel is the only writer.

use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::parser::StreamParser;
use super::signal::StreamSignal;
use crate::backend::{BackendError, ByteStream};
use crate::logging::{log_line, LogHandle};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Identifies one send/stream exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(pub String);

impl StreamId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cooperative cancellation flag shared between the client and one worker.
///
/// The worker checks it at every read boundary. A read already blocked in
/// the transport is not interrupted; the worker stops once it returns.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a worker reports back to the client.
#[derive(Debug, Clone)]
pub enum IngestEvent {
    /// A parsed signal, in stream order.
    Signal(StreamId, StreamSignal),
    /// The body ended normally.
    Finished(StreamId),
    /// Opening or reading the stream failed (not cancelled).
    Failed(StreamId, String),
}

impl IngestEvent {
    pub fn stream_id(&self) -> &StreamId {
        match self {
            Self::Signal(id, _) | Self::Finished(id) | Self::Failed(id, _) => id,
        }
    }
}

/// Spawn the worker for one exchange.
///
/// `open` performs the request and is called on the worker thread, so the
/// caller never waits on the network.
pub fn spawn<F>(
    stream_id: StreamId,
    token: CancelToken,
    sender: Sender<IngestEvent>,
    transcript: LogHandle,
    open: F,
) -> JoinHandle<()>
where
    F: FnOnce() -> Result<ByteStream, BackendError> + Send + 'static,
{
    thread::spawn(move || {
        let reader = match open() {
            Ok(reader) => reader,
            Err(err) => {
                if token.is_cancelled() {
                    log::debug!("stream {} cancelled while connecting", stream_id);
                } else {
                    log::error!("Failed to open stream {}: {}", stream_id, err);
                    log_line(&transcript, "ERROR", &err.to_string());
                    let _ = sender.send(IngestEvent::Failed(stream_id, err.to_string()));
                }
                return;
            }
        };

        run(stream_id, reader, &token, &sender, &transcript);
    })
}

/// The blocking read loop.
fn run(
    stream_id: StreamId,
    mut reader: ByteStream,
    token: &CancelToken,
    sender: &Sender<IngestEvent>,
    transcript: &LogHandle,
) {
    let mut parser = StreamParser::new();
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        if token.is_cancelled() {
            log::debug!("stream {} cancelled", stream_id);
            log_line(transcript, "CANCEL", "");
            return;
        }

        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                if token.is_cancelled() {
                    log::debug!("stream {} cancelled during read", stream_id);
                    return;
                }
                log::warn!("Stream {} read error: {}", stream_id, err);
                log_line(transcript, "ERROR", &err.to_string());
                let _ = sender.send(IngestEvent::Failed(stream_id, err.to_string()));
                return;
            }
        };

        if token.is_cancelled() {
            log::debug!("stream {} cancelled", stream_id);
            log_line(transcript, "CANCEL", "");
            return;
        }

        log_line(
            transcript,
            "RECV",
            &String::from_utf8_lossy(&buf[..read]),
        );

        for signal in parser.feed(&buf[..read]) {
            if sender
                .send(IngestEvent::Signal(stream_id.clone(), signal))
                .is_err()
            {
                // Client is gone.
                return;
            }
        }
    }

    if token.is_cancelled() {
        log::debug!("stream {} cancelled at end of data", stream_id);
        log_line(transcript, "CANCEL", "");
        return;
    }

    if let Some(partial) = parser.finish() {
        log::debug!(
            "stream {} ended mid-record, discarding {} bytes",
            stream_id,
            partial.len()
        );
    }
    if parser.dropped_records() > 0 {
        log::warn!(
            "stream {} dropped {} malformed record(s)",
            stream_id,
            parser.dropped_records()
        );
    }

    log_line(transcript, "END", "");
    let _ = sender.send(IngestEvent::Finished(stream_id));
}
