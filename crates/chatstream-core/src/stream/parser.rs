//! Event stream parser.
//!
//! Turns raw response bytes into [`StreamSignal`]s.
//!
//! # How This Parser Works
//!
//! The server writes newline-delimited records. This parser:
//! 1. Decodes incoming bytes as UTF-8, carrying an incomplete code point over
//!    to the next chunk
//! 2. Buffers text until a full `\n`-terminated line is available
//! 3. Parses `data: ` lines as JSON [`StreamPayload`]s
//! 4. Translates each payload into a typed [`StreamSignal`]
//!
//! A malformed record is dropped and parsing continues with the next line.

use serde_json::Map;
use thiserror::Error;

use super::signal::StreamSignal;
use super::types::{PayloadKind, StreamPayload};
use crate::conversation::ServerMessage;

const DATA_PREFIX: &str = "data:";
const EVENT_PREFIX: &str = "event:";

/// Why a single record was dropped. Never fatal to the stream.
#[derive(Error, Debug)]
pub enum ProtocolDecodeError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("`{kind}` record is missing `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("invalid `complete` message: {0}")]
    Message(serde_json::Error),
}

/// Incremental parser state for one stream.
#[derive(Debug, Default)]
pub struct StreamParser {
    /// Text of the current, not yet terminated line.
    ///
    /// # Why We Need This
    ///
    /// Reads return arbitrary slices of the body. A chunk might be:
    /// - Complete line: `data: {"type":"delta"}\n`
    /// - Partial line: `data: {"typ` (rest comes in next chunk)
    /// - Multiple lines: `data: {...}\ndata: {...}\n`
    buffer: String,

    /// Trailing bytes of an incomplete UTF-8 sequence.
    pending_bytes: Vec<u8>,

    /// Tag from the `event:` line of the record being read. Informational
    /// only; cleared once the record's `data:` line or a blank line is seen.
    last_event: Option<String>,

    /// How many `data:` records were dropped as undecodable.
    dropped_records: usize,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `event:` tag of the record currently being read, if any.
    pub fn last_event(&self) -> Option<&str> {
        self.last_event.as_deref()
    }

    pub fn dropped_records(&self) -> usize {
        self.dropped_records
    }

    /// Feed a chunk of the response body and collect the signals it completes.
    ///
    /// # Rust Concept: std::mem::take
    ///
    /// We need to split the buffer into lines while also putting the last,
    /// incomplete line back into it. `std::mem::take(&mut self.buffer)` moves
    /// the text out (leaving an empty `String`), so we own it and can borrow
    /// slices of it freely while writing the remainder back to `self.buffer`.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamSignal> {
        let text = self.decode(chunk);
        self.buffer.push_str(&text);

        let buffer = std::mem::take(&mut self.buffer);
        let mut lines: Vec<&str> = buffer.split('\n').collect();

        // The last piece has no terminating newline yet.
        if let Some(incomplete) = lines.pop() {
            self.buffer = incomplete.to_string();
        }

        let mut signals = Vec::new();
        for line in lines {
            if let Some(signal) = self.parse_line(line) {
                signals.push(signal);
            }
        }
        signals
    }

    /// End of data. Returns the unterminated trailing text, which is an
    /// incomplete record and is never parsed.
    pub fn finish(&mut self) -> Option<String> {
        let mut remaining = std::mem::take(&mut self.buffer);
        let bytes = std::mem::take(&mut self.pending_bytes);
        remaining.push_str(&String::from_utf8_lossy(&bytes));

        if remaining.trim().is_empty() {
            None
        } else {
            Some(remaining)
        }
    }

    /// Decode as much of `chunk` as forms complete UTF-8.
    ///
    /// Invalid sequences become U+FFFD. An incomplete sequence at the very end
    /// is kept in `pending_bytes` and completed by the next chunk.
    fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending_bytes.extend_from_slice(chunk);
        let bytes = std::mem::take(&mut self.pending_bytes);

        let mut text = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));

                    match err.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.pending_bytes = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        text
    }

    /// Parse one complete line.
    fn parse_line(&mut self, line: &str) -> Option<StreamSignal> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        // A blank line ends the record; its tag does not carry over.
        if line.is_empty() {
            self.last_event = None;
            return None;
        }

        if let Some(tag) = line.strip_prefix(EVENT_PREFIX) {
            let tag = tag.trim();
            self.last_event = (!tag.is_empty()).then(|| tag.to_string());
            return None;
        }

        let data = line.strip_prefix(DATA_PREFIX)?;
        let data = data.strip_prefix(' ').unwrap_or(data);
        if data.trim().is_empty() {
            return None;
        }

        let parsed = parse_data(data);
        self.last_event = None;

        match parsed {
            Ok(signal) => signal,
            Err(err) => {
                self.dropped_records += 1;
                log::debug!("dropping stream record: {}", err);
                None
            }
        }
    }

}

/// Decode one `data:` payload. The payload's own `type` decides the signal;
/// a payload without one is ignored.
fn parse_data(data: &str) -> Result<Option<StreamSignal>, ProtocolDecodeError> {
    let payload: StreamPayload = serde_json::from_str(data)?;

    let kind = payload
        .payload_type
        .as_deref()
        .map(PayloadKind::from_tag)
        .unwrap_or(PayloadKind::Unknown);

    translate(kind, payload)
}

/// Translate a decoded payload into a signal.
///
/// # Rust Concept: Exhaustive match
///
/// `PayloadKind` is a closed enum. Adding a variant makes this `match` fail to
/// compile until the new case is handled, and the `Unknown` arm documents in
/// one place that everything else is ignored.
fn translate(
    kind: PayloadKind,
    payload: StreamPayload,
) -> Result<Option<StreamSignal>, ProtocolDecodeError> {
    let signal = match kind {
        PayloadKind::Text => StreamSignal::TextDelta {
            content: payload.content.unwrap_or_default(),
        },

        PayloadKind::ToolCall => {
            let id = payload.id.ok_or(ProtocolDecodeError::MissingField {
                kind: "tool_call",
                field: "id",
            })?;
            let tool = payload.tool.ok_or(ProtocolDecodeError::MissingField {
                kind: "tool_call",
                field: "tool",
            })?;
            let input = match payload.input {
                Some(serde_json::Value::Object(map)) => map,
                _ => Map::new(),
            };
            StreamSignal::ToolCallAnnounced { id, tool, input }
        }

        PayloadKind::Complete => {
            let raw = payload.message.ok_or(ProtocolDecodeError::MissingField {
                kind: "complete",
                field: "message",
            })?;
            let message: ServerMessage =
                serde_json::from_value(raw).map_err(ProtocolDecodeError::Message)?;
            StreamSignal::Complete {
                message,
                user_message_id: payload.user_message_id,
            }
        }

        PayloadKind::Error => StreamSignal::Error {
            message: payload
                .error
                .unwrap_or_else(|| "Unknown error".to_string()),
        },

        PayloadKind::Unknown => return Ok(None),
    };

    Ok(Some(signal))
}

// ============================================================================
// TESTS
// ============================================================================
