//! The session and messaging endpoints the client talks to.
//!
//! [`ChatBackend`] is the seam between the client core and the server. The
//! core only ever calls these five operations; [`HttpBackend`] implements them
//! over HTTP, tests substitute an in-memory double.

mod http;

use std::io::Read;

use thiserror::Error;

use crate::session::{SessionDetail, SessionId, SessionSummary};

pub use http::HttpBackend;

/// A backend call failed.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server returned {code}: {body}")]
    Status { code: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Byte source for one send-message response.
pub type ByteStream = Box<dyn Read + Send>;

/// Backend operations consumed by the client.
pub trait ChatBackend: Send + Sync {
    /// All known sessions, in backend order.
    fn list_sessions(&self) -> Result<Vec<SessionSummary>, BackendError>;

    /// Create a new, empty session.
    fn create_session(&self) -> Result<SessionSummary, BackendError>;

    /// Full session state including its message log.
    fn get_session(&self, id: &SessionId) -> Result<SessionDetail, BackendError>;

    fn delete_session(&self, id: &SessionId) -> Result<(), BackendError>;

    /// Post a user message and return the framed event stream of the reply.
    fn send_message(&self, id: &SessionId, content: &str) -> Result<ByteStream, BackendError>;
}
