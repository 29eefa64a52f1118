//! The in-memory message log and the reducer that advances it.

mod message;
mod reducer;

pub use message::{Message, Role, ServerMessage, ToolCall, TEMP_ID_PREFIX};
pub use reducer::{reduce, Conversation, PendingStream};
