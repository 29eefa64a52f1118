//! Message log entries.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Prefix of identifiers the client assigns before the server confirms a message.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Last timestamp handed out for a temp id, process-wide.
static LAST_TEMP_MILLIS: AtomicI64 = AtomicI64::new(i64::MIN);

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A tool invocation announced by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub tool: String,
    #[serde(default)]
    pub input: Map<String, Value>,
}

/// A single entry in a session's message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Server id once durable, `temp-<millis>` before that.
    pub id: String,

    pub role: Role,

    #[serde(default)]
    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default)]
    pub created_at: String,

    /// Still being appended to by an in-flight stream.
    #[serde(default)]
    pub streaming: bool,
}

impl Message {
    /// The locally created user message for a send.
    pub fn user_placeholder(content: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: temp_id(now),
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            created_at: now.to_rfc3339(),
            streaming: false,
        }
    }

    /// The empty assistant message that stream deltas are written into.
    pub fn assistant_placeholder(now: DateTime<Utc>) -> Self {
        Self {
            id: temp_id(now),
            role: Role::Assistant,
            content: String::new(),
            tool_calls: Vec::new(),
            created_at: now.to_rfc3339(),
            streaming: true,
        }
    }

    /// Whether the id is still a client-side placeholder.
    pub fn has_temp_id(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }
}

/// `temp-<millis>`, where millis is `now` or, if that was already used, the
/// next unused millisecond. Ids are strictly increasing within the process,
/// so no two placeholders ever share one.
fn temp_id(now: DateTime<Utc>) -> String {
    let now = now.timestamp_millis();
    let previous = LAST_TEMP_MILLIS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last.saturating_add(1)))
        })
        .unwrap_or(now);
    format!("{TEMP_ID_PREFIX}{}", now.max(previous.saturating_add(1)))
}

/// A fully formed message as the server sends it in a `complete` record.
///
/// Unlike [`Message`], `tool_calls` stays optional so the reducer can tell
/// "the server sent no list" apart from "the server sent an empty list".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default)]
    pub created_at: String,
}

impl ServerMessage {
    /// Convert into a settled log entry, falling back to the tool calls
    /// accumulated during the stream when the server sent none.
    pub fn into_message(self, announced: &[ToolCall]) -> Message {
        Message {
            id: self.id,
            role: self.role,
            content: self.content,
            tool_calls: self.tool_calls.unwrap_or_else(|| announced.to_vec()),
            created_at: self.created_at,
            streaming: false,
        }
    }
}
