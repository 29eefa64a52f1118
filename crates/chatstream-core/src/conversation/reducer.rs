//! The message reducer.
//!
//! A [`Conversation`] is an immutable value. Every transition returns a new
//! conversation whose log is a fresh `Arc<[Message]>`; entries are never
//! edited in place, so a snapshot handed to a reader stays well-formed no
//! matter what happens afterwards.
//!
//! Invariant: at most one message in the log has `streaming = true`.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::message::{Message, Role, ToolCall};
use crate::stream::StreamSignal;

/// What the in-flight stream has accumulated so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingStream {
    /// Running concatenation of every `TextDelta` of this stream.
    pub text: String,
    /// Tool calls announced but not yet attached to a message.
    pub tool_calls: Vec<ToolCall>,
}

/// The message log plus the state the reducer needs between signals.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Arc<[Message]>,
    pending: PendingStream,
    last_error: Option<String>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    /// An empty log.
    pub fn new() -> Self {
        Self {
            messages: Arc::from(Vec::new()),
            pending: PendingStream::default(),
            last_error: None,
        }
    }

    /// A log loaded from server state. Loaded messages are never streaming.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let messages: Vec<Message> = messages
            .into_iter()
            .map(|mut message| {
                message.streaming = false;
                message
            })
            .collect();

        Self {
            messages: messages.into(),
            pending: PendingStream::default(),
            last_error: None,
        }
    }

    /// The current log snapshot.
    pub fn messages(&self) -> &Arc<[Message]> {
        &self.messages
    }

    pub fn pending(&self) -> &PendingStream {
        &self.pending
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Position of the message still being streamed into, if any.
    pub fn streaming_index(&self) -> Option<usize> {
        self.messages.iter().position(|m| m.streaming)
    }

    pub fn has_streaming_message(&self) -> bool {
        self.streaming_index().is_some()
    }

    /// Append the user message and the assistant placeholder for a new send.
    ///
    /// Any placeholder left behind by a cancelled stream is settled first so
    /// the new placeholder is the only streaming message.
    pub fn begin_exchange(&self, content: impl Into<String>, now: DateTime<Utc>) -> Self {
        let mut messages = settle(&self.messages);
        messages.push(Message::user_placeholder(content, now));
        messages.push(Message::assistant_placeholder(now));

        Self {
            messages: messages.into(),
            pending: PendingStream::default(),
            last_error: None,
        }
    }

    /// Apply one stream signal and return the next conversation.
    pub fn reduce(&self, signal: &StreamSignal) -> Self {
        match signal {
            StreamSignal::TextDelta { content } => {
                let Some(index) = self.streaming_index() else {
                    return self.clone();
                };

                let mut pending = self.pending.clone();
                pending.text.push_str(content);

                let mut messages = self.messages.to_vec();
                messages[index].content = pending.text.clone();

                Self {
                    messages: messages.into(),
                    pending,
                    last_error: self.last_error.clone(),
                }
            }

            StreamSignal::ToolCallAnnounced { id, tool, input } => {
                if !self.has_streaming_message() {
                    return self.clone();
                }

                let mut pending = self.pending.clone();
                pending.tool_calls.push(ToolCall {
                    id: id.clone(),
                    tool: tool.clone(),
                    input: input.clone(),
                });

                Self {
                    messages: Arc::clone(&self.messages),
                    pending,
                    last_error: self.last_error.clone(),
                }
            }

            StreamSignal::Complete {
                message,
                user_message_id,
            } => {
                let Some(index) = self.streaming_index() else {
                    return self.clone();
                };

                let mut messages = self.messages.to_vec();
                messages[index] = message.clone().into_message(&self.pending.tool_calls);

                // Best-effort: only the message right before the placeholder is
                // reconciled, and only while it still carries a temp id.
                if let (Some(server_id), Some(previous)) = (
                    user_message_id,
                    index.checked_sub(1).and_then(|i| messages.get_mut(i)),
                ) {
                    if previous.role == Role::User && previous.has_temp_id() {
                        previous.id = server_id.clone();
                    }
                }

                Self {
                    messages: messages.into(),
                    pending: PendingStream::default(),
                    last_error: self.last_error.clone(),
                }
            }

            StreamSignal::Error { message } => self.fail(message),
        }
    }

    /// The transport died mid-stream. Handled exactly like an `Error` signal.
    pub fn fail_transport(&self, message: &str) -> Self {
        self.fail(message)
    }

    /// The stream ended without a `complete` record.
    ///
    /// The placeholder keeps what it accumulated, gets the announced tool
    /// calls, and stops streaming.
    pub fn finish_stream(&self) -> Self {
        let Some(index) = self.streaming_index() else {
            return self.clone();
        };

        let mut messages = self.messages.to_vec();
        let placeholder = &mut messages[index];
        placeholder.streaming = false;
        placeholder.tool_calls = self.pending.tool_calls.clone();

        Self {
            messages: messages.into(),
            pending: PendingStream::default(),
            last_error: self.last_error.clone(),
        }
    }

    /// Remove a placeholder retained by a cancelled stream.
    pub fn discard_streaming(&self) -> Self {
        if !self.has_streaming_message() {
            return self.clone();
        }

        let messages: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| !m.streaming)
            .cloned()
            .collect();

        Self {
            messages: messages.into(),
            pending: PendingStream::default(),
            last_error: self.last_error.clone(),
        }
    }

    pub fn clear_error(&self) -> Self {
        Self {
            messages: Arc::clone(&self.messages),
            pending: self.pending.clone(),
            last_error: None,
        }
    }

    fn fail(&self, message: &str) -> Self {
        let messages: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| !m.streaming)
            .cloned()
            .collect();

        Self {
            messages: messages.into(),
            pending: PendingStream::default(),
            last_error: Some(message.to_string()),
        }
    }
}

/// Copy the log with every message marked as no longer streaming.
fn settle(messages: &[Message]) -> Vec<Message> {
    messages
        .iter()
        .cloned()
        .map(|mut message| {
            message.streaming = false;
            message
        })
        .collect()
}

/// Free-function form of [`Conversation::reduce`].
pub fn reduce(conversation: &Conversation, signal: &StreamSignal) -> Conversation {
    conversation.reduce(signal)
}
