//! Session tracking: the cached list and the active session.

mod registry;
mod state;

pub use registry::SessionRegistry;
pub use state::{SessionDetail, SessionId, SessionSummary};
