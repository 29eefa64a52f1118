//! Errors surfaced by [`crate::StreamingChatClient`].

use thiserror::Error;

use crate::backend::BackendError;
use crate::session::SessionId;

/// A client operation failed.
///
/// Session errors leave all local state as it was before the call. A
/// cancelled stream is not an error and never shows up here.
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Failed to create session: {0}")]
    SessionCreate(#[source] BackendError),

    #[error("Failed to load session {id}: {source}")]
    SessionLoad {
        id: SessionId,
        #[source]
        source: BackendError,
    },

    #[error("Failed to delete session {id}: {source}")]
    SessionDelete {
        id: SessionId,
        #[source]
        source: BackendError,
    },

    #[error("Failed to list sessions: {0}")]
    SessionList(#[source] BackendError),

    #[error("Stream failed: {0}")]
    StreamTransport(String),

    #[error("No active session")]
    NoActiveSession,
}
