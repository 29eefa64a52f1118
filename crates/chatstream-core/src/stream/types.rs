//! Wire types for the send-message event stream.
//!
//! # Wire Format
//!
//! The response body is UTF-8, newline-delimited. Each record is one or more
//! lines:
//!
//! ```text
//! event: delta
//! data: {"type":"delta","content":"Hi"}
//! ```
//!
//! The JSON after `data: ` is a [`StreamPayload`]. Its `type` field decides
//! what the record means; the `event:` tag is only a fallback when `type` is
//! missing.

use serde::Deserialize;
use serde_json::Value;

/// A `data:` payload from the event stream.
///
/// Every field except `type` is optional because different record types
/// populate different fields.
///
/// # Rust Concept: Serde Field Attributes
///
/// - `#[serde(rename = "type")]` — `type` is a Rust keyword, so the field is
///   called `payload_type` on our side
/// - `#[serde(default)]` — a missing key becomes `None` instead of a parse error
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StreamPayload {
    /// `text`, `delta`, `tool_call`, `complete`, `error`, or something we ignore.
    #[serde(rename = "type", default)]
    pub payload_type: Option<String>,

    /// Text for `text` / `delta` records.
    #[serde(default)]
    pub content: Option<String>,

    /// Tool call id for `tool_call` records.
    #[serde(default)]
    pub id: Option<String>,

    /// Tool name for `tool_call` records.
    #[serde(default)]
    pub tool: Option<String>,

    /// Tool input for `tool_call` records. Kept loose; non-objects become `{}`.
    #[serde(default)]
    pub input: Option<Value>,

    /// Final message for `complete` records. Decoded only for that type, so a
    /// stray `message` on other records cannot break them.
    #[serde(default)]
    pub message: Option<Value>,

    /// Server id of the user message, sometimes sent with `complete`.
    #[serde(default)]
    pub user_message_id: Option<String>,

    /// Error text for `error` records.
    #[serde(default)]
    pub error: Option<String>,
}

/// The closed set of payload types we act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Text,
    ToolCall,
    Complete,
    Error,
    /// Anything else. Ignored, but kept as an explicit branch.
    Unknown,
}

impl PayloadKind {
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "text" | "delta" => Self::Text,
            "tool_call" => Self::ToolCall,
            "complete" => Self::Complete,
            "error" => Self::Error,
            _ => Self::Unknown,
        }
    }
}
