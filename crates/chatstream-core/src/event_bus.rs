//! Framework-agnostic change notifications.
//!
//! The EventBus lets any number of observers (a terminal UI, a GUI bridge, a
//! test) follow the client's state without holding a reference to it. Every
//! payload is an immutable snapshot; observers never mutate client state.
//!
//! # Example
//!
//! ```rust
//! use chatstream_core::event_bus::{ChatEvent, EventBus};
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! bus.emit(ChatEvent::SessionsChanged);
//!
//! assert!(matches!(rx.try_recv(), Ok(ChatEvent::SessionsChanged)));
//! ```

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::conversation::Message;
use crate::session::SessionId;
use crate::stream::StreamId;

/// Snapshots buffered per subscriber before the oldest are overwritten.
///
/// A subscriber that falls further behind sees `RecvError::Lagged` and should
/// re-read the client's state instead of replaying.
const SNAPSHOT_BACKLOG: usize = 256;

/// A change in the client's observable state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ChatEvent {
    /// The cached session list changed.
    SessionsChanged,

    /// A different session (or none) is now active.
    ActiveSessionChanged { session_id: Option<SessionId> },

    /// A new message log snapshot.
    MessagesChanged { messages: Arc<[Message]> },

    StreamStarted { stream_id: StreamId },

    /// The exchange ended (complete, error, transport failure or end of data).
    StreamFinished { stream_id: StreamId },

    StreamCancelled { stream_id: StreamId },

    /// A stream-level error was recorded as the last error.
    Error { message: String },
}

impl ChatEvent {
    /// The stream this event belongs to, for stream lifecycle events.
    pub fn stream_id(&self) -> Option<&StreamId> {
        match self {
            Self::StreamStarted { stream_id }
            | Self::StreamFinished { stream_id }
            | Self::StreamCancelled { stream_id } => Some(stream_id),
            Self::SessionsChanged
            | Self::ActiveSessionChanged { .. }
            | Self::MessagesChanged { .. }
            | Self::Error { .. } => None,
        }
    }
}

/// Fans [`ChatEvent`]s out to observers.
///
/// Backed by a tokio broadcast channel: async observers `recv().await`, plain
/// threads use `try_recv` or `blocking_recv`. Publishing never blocks and
/// never fails; with nobody listening the event is simply dropped.
pub struct EventBus {
    tx: broadcast::Sender<ChatEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(SNAPSHOT_BACKLOG)
    }

    pub fn with_capacity(backlog: usize) -> Self {
        let (tx, _rx) = broadcast::channel(backlog);
        Self { tx }
    }

    /// Publish `event`. Returns how many observers will see it.
    pub fn emit(&self, event: ChatEvent) -> usize {
        match self.tx.send(event) {
            Ok(observers) => observers,
            Err(_) => 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.tx.subscribe()
    }

    /// Number of live observers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    mod chat_event {
        use super::*;

        #[test]
        fn serializes_with_kind_tag() {
            let event = ChatEvent::ActiveSessionChanged {
                session_id: Some(SessionId::from("s1")),
            };
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["kind"], "activeSessionChanged");
            assert_eq!(json["session_id"], "s1");
        }

        #[test]
        fn stream_id_only_for_stream_events() {
            let id = StreamId("s".to_string());
            assert_eq!(
                ChatEvent::StreamCancelled {
                    stream_id: id.clone()
                }
                .stream_id(),
                Some(&id)
            );
            assert!(ChatEvent::SessionsChanged.stream_id().is_none());
        }

        #[test]
        fn messages_snapshot_serializes_as_array() {
            let event = ChatEvent::MessagesChanged {
                messages: Arc::from(Vec::new()),
            };
            let json = serde_json::to_value(&event).unwrap();
            assert!(json["messages"].as_array().unwrap().is_empty());
        }
    }

    mod event_bus {
        use super::*;

        fn started(id: &str) -> ChatEvent {
            ChatEvent::StreamStarted {
                stream_id: StreamId(id.to_string()),
            }
        }

        #[test]
        fn observers_are_counted() {
            let bus = EventBus::new();
            assert_eq!(bus.subscriber_count(), 0);

            let ui = bus.subscribe();
            let _logger = bus.subscribe();
            assert_eq!(bus.subscriber_count(), 2);

            drop(ui);
            assert_eq!(bus.subscriber_count(), 1);
        }

        #[test]
        fn publishing_without_observers_is_dropped() {
            let bus = EventBus::default();
            assert_eq!(bus.emit(ChatEvent::SessionsChanged), 0);
        }

        #[tokio::test]
        async fn every_observer_sees_the_error() {
            let bus = EventBus::new();
            let mut ui = bus.subscribe();
            let mut logger = bus.subscribe();

            assert_eq!(
                bus.emit(ChatEvent::Error {
                    message: "boom".to_string(),
                }),
                2
            );

            for rx in [&mut ui, &mut logger] {
                match rx.recv().await.unwrap() {
                    ChatEvent::Error { message } => assert_eq!(message, "boom"),
                    other => panic!("unexpected event {other:?}"),
                }
            }
        }

        #[tokio::test]
        async fn observer_only_sees_events_after_subscribing() {
            let bus = EventBus::new();
            bus.emit(started("before"));

            let mut rx = bus.subscribe();
            bus.emit(started("after"));

            let event = rx.recv().await.unwrap();
            assert_eq!(event.stream_id().map(|id| id.0.as_str()), Some("after"));
        }

        #[test]
        fn slow_observer_lags_instead_of_blocking() {
            let bus = EventBus::with_capacity(2);
            let mut rx = bus.subscribe();

            for n in 0..3 {
                bus.emit(started(&n.to_string()));
            }

            assert!(matches!(
                rx.try_recv(),
                Err(broadcast::error::TryRecvError::Lagged(1))
            ));
        }
    }
}
