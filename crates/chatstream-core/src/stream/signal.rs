//! Typed signals produced from the server's event stream.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::conversation::ServerMessage;

/// The semantic payload of one stream record, independent of wire framing.
///
/// This is the only input the message reducer accepts from a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StreamSignal {
    /// A piece of assistant text.
    TextDelta { content: String },

    /// The assistant invoked a tool. Attached to the message on completion.
    ToolCallAnnounced {
        id: String,
        tool: String,
        input: Map<String, Value>,
    },

    /// The final server message that replaces the streaming placeholder.
    Complete {
        message: ServerMessage,
        /// Server id for the user message of this exchange, if the server sent one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_message_id: Option<String>,
    },

    /// The server reported a failure for this exchange.
    Error { message: String },
}

impl StreamSignal {
    /// Whether this signal ends the exchange.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}
