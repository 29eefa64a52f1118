//! # chatstream-core
//!
//! Client-side core for streaming chat sessions.
//!
//! This crate is framework-agnostic and can be used by:
//! - The `chatstream` terminal client
//! - Any UI that wants read-only snapshots of the conversation
//!
//! ## Key Concepts
//!
//! - **Session**: A server-tracked conversation with its own message log
//! - **StreamSignal**: One parsed record of the server's event stream
//! - **Conversation**: The immutable message log the reducer produces
//! - **StreamingChatClient**: Ties the registry, ingestor and reducer together

pub mod backend;
pub mod client;
pub mod config;
pub mod conversation;
pub mod error;
pub mod event_bus;
pub mod logging;
pub mod paths;
pub mod session;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use backend::{BackendError, ChatBackend, HttpBackend};
pub use client::StreamingChatClient;
pub use config::ClientConfig;
pub use conversation::{Conversation, Message, Role, ToolCall};
pub use error::ChatError;
pub use event_bus::{ChatEvent, EventBus};
pub use session::{SessionDetail, SessionId, SessionRegistry, SessionSummary};
pub use stream::{CancelToken, StreamId, StreamParser, StreamSignal};
