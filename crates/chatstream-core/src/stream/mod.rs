//! Stream ingestion: wire framing, payload types and the reader worker.
//!
//! Bytes flow one way: backend reader -> [`StreamParser`] -> [`StreamSignal`]
//! -> channel -> client.

pub mod ingest;
mod parser;
mod signal;
mod types;

pub use ingest::{CancelToken, IngestEvent, StreamId};
pub use parser::{ProtocolDecodeError, StreamParser};
pub use signal::StreamSignal;
pub use types::{PayloadKind, StreamPayload};
