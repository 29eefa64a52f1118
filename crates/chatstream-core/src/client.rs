//! StreamingChatClient - ties the session registry, the stream ingestor and
//! the message reducer together.
//!
//! The client owns the message log and is its only writer. Each send spawns
//! an ingest worker that reports back over a channel; the caller decides when
//! those reports are applied:
//!
//! - [`StreamingChatClient::poll`] applies whatever has arrived and returns
//! - [`StreamingChatClient::step`] waits up to a timeout for the next report
//! - [`StreamingChatClient::wait`] blocks until the exchange ends
//!
//! Every applied report produces a new immutable [`Conversation`], so a
//! snapshot taken from [`StreamingChatClient::messages`] never changes under
//! the reader.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::backend::{ChatBackend, HttpBackend};
use crate::config::ClientConfig;
use crate::conversation::{Conversation, Message};
use crate::error::ChatError;
use crate::event_bus::{ChatEvent, EventBus};
use crate::logging;
use crate::session::{SessionId, SessionRegistry, SessionSummary};
use crate::stream::ingest::{self, CancelToken, IngestEvent, StreamId};
use crate::stream::StreamSignal;

/// The exchange currently in flight.
struct ActiveStream {
    id: StreamId,
    token: CancelToken,
}

pub struct StreamingChatClient {
    backend: Arc<dyn ChatBackend>,
    registry: SessionRegistry,
    conversation: Conversation,
    stream: Option<ActiveStream>,
    events_tx: Sender<IngestEvent>,
    events_rx: Receiver<IngestEvent>,
    event_bus: Arc<EventBus>,
    transcript_dir: Option<PathBuf>,
}

impl StreamingChatClient {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            backend,
            registry: SessionRegistry::new(),
            conversation: Conversation::new(),
            stream: None,
            events_tx,
            events_rx,
            event_bus: Arc::new(EventBus::new()),
            transcript_dir: None,
        }
    }

    /// A client talking HTTP to `config.base_url`.
    pub fn from_config(config: &ClientConfig) -> Self {
        let mut client = Self::new(Arc::new(HttpBackend::new(config)));
        client.transcript_dir = config.transcript_dir.clone();
        client
    }

    /// Mirror every stream into `{dir}/{stream_id}.log`.
    pub fn with_transcript_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.transcript_dir = Some(dir.into());
        self
    }

    /// Publish change notifications on a shared bus instead of a private one.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    // ------------------------------------------------------------------
    // Read-only snapshots
    // ------------------------------------------------------------------

    pub fn sessions(&self) -> &[SessionSummary] {
        self.registry.sessions()
    }

    pub fn active_session(&self) -> Option<&SessionId> {
        self.registry.active()
    }

    /// The current message log. Cheap to clone and never mutated afterwards.
    pub fn messages(&self) -> Arc<[Message]> {
        Arc::clone(self.conversation.messages())
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Whether an exchange is in flight. A cancelled stream is not.
    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    pub fn current_stream(&self) -> Option<&StreamId> {
        self.stream.as_ref().map(|s| &s.id)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.conversation.last_error()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ChatEvent> {
        self.event_bus.subscribe()
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Fetch the session list from the backend.
    pub fn load_sessions(&mut self) -> Result<&[SessionSummary], ChatError> {
        self.registry.refresh(self.backend.as_ref())?;
        self.event_bus.emit(ChatEvent::SessionsChanged);
        Ok(self.registry.sessions())
    }

    /// Create a session, make it active and start from an empty log.
    pub fn create_session(&mut self) -> Result<SessionId, ChatError> {
        let id = self.registry.create(self.backend.as_ref())?;

        self.cancel_streaming();
        self.set_conversation(Conversation::new());
        self.event_bus.emit(ChatEvent::SessionsChanged);
        self.emit_active();
        Ok(id)
    }

    /// Switch to `id`, replacing the log with the server's messages.
    pub fn load_session(&mut self, id: &SessionId) -> Result<(), ChatError> {
        let detail = self.registry.load(self.backend.as_ref(), id)?;

        self.cancel_streaming();
        self.set_conversation(Conversation::from_messages(detail.messages));
        self.event_bus.emit(ChatEvent::SessionsChanged);
        self.emit_active();
        Ok(())
    }

    /// Delete `id`. Deleting the active session also clears the log.
    pub fn delete_session(&mut self, id: &SessionId) -> Result<(), ChatError> {
        let was_active = self.registry.delete(self.backend.as_ref(), id)?;

        if was_active {
            self.cancel_streaming();
            self.set_conversation(Conversation::new());
            self.emit_active();
        }
        self.event_bus.emit(ChatEvent::SessionsChanged);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Streaming
    // ------------------------------------------------------------------

    /// Send `content` to the active session and start streaming the reply.
    ///
    /// The user message and an empty assistant placeholder are appended
    /// before this returns; the network request happens on the worker.
    /// Returns `Ok(None)` without doing anything while another exchange is
    /// in flight.
    pub fn send_message(&mut self, content: &str) -> Result<Option<StreamId>, ChatError> {
        let session = self
            .registry
            .active()
            .cloned()
            .ok_or(ChatError::NoActiveSession)?;

        if let Some(stream) = &self.stream {
            log::debug!("Ignoring send while stream {} is in flight", stream.id);
            return Ok(None);
        }

        self.set_conversation(self.conversation.begin_exchange(content, Utc::now()));

        let stream_id = StreamId::new();
        let token = CancelToken::new();
        let transcript =
            logging::open_log_file(self.transcript_dir.as_deref(), &stream_id.to_string());
        logging::log_line(&transcript, "SEND", content);

        let backend = Arc::clone(&self.backend);
        let target = session.clone();
        let body = content.to_string();
        ingest::spawn(
            stream_id.clone(),
            token.clone(),
            self.events_tx.clone(),
            transcript,
            move || backend.send_message(&target, &body),
        );

        log::info!("Started stream {} on session {}", stream_id, session);
        self.stream = Some(ActiveStream {
            id: stream_id.clone(),
            token,
        });
        self.event_bus.emit(ChatEvent::StreamStarted {
            stream_id: stream_id.clone(),
        });
        Ok(Some(stream_id))
    }

    /// Stop the in-flight stream.
    ///
    /// The placeholder keeps whatever it received and stays marked as
    /// streaming until [`Self::clear_streaming`] or the next send. Returns
    /// whether there was anything to cancel.
    pub fn cancel_streaming(&mut self) -> bool {
        let Some(stream) = self.stream.take() else {
            return false;
        };

        stream.token.cancel();
        log::info!("Cancelled stream {}", stream.id);
        self.event_bus
            .emit(ChatEvent::StreamCancelled { stream_id: stream.id });
        true
    }

    /// Cancel any stream and drop the placeholder it left behind.
    pub fn clear_streaming(&mut self) {
        self.cancel_streaming();
        self.set_conversation(self.conversation.discard_streaming());
    }

    pub fn clear_error(&mut self) {
        self.conversation = self.conversation.clear_error();
    }

    /// Apply every report that has already arrived. Never blocks.
    ///
    /// Returns the number of reports applied. A transport failure is applied
    /// to the log first and then returned as `Err`.
    pub fn poll(&mut self) -> Result<usize, ChatError> {
        let mut applied = 0;
        loop {
            match self.events_rx.try_recv() {
                Ok(event) => {
                    self.apply(event)?;
                    applied += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return Ok(applied),
            }
        }
    }

    /// Wait up to `timeout` for one report and apply it.
    ///
    /// Returns `Ok(false)` on timeout.
    pub fn step(&mut self, timeout: Duration) -> Result<bool, ChatError> {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => {
                self.apply(event)?;
                Ok(true)
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Ok(false),
        }
    }

    /// Block until the in-flight exchange ends.
    ///
    /// A server-reported error ends the exchange normally (see
    /// [`Self::last_error`]); only a transport failure is an `Err`.
    pub fn wait(&mut self) -> Result<(), ChatError> {
        while self.stream.is_some() {
            // The client keeps a sender alive, so this only fails if every
            // worker is gone, which cannot happen while a stream is tracked.
            let Ok(event) = self.events_rx.recv() else {
                break;
            };
            self.apply(event)?;
        }
        Ok(())
    }

    /// Apply one worker report. Reports from any stream other than the one
    /// in flight are dropped.
    fn apply(&mut self, event: IngestEvent) -> Result<(), ChatError> {
        let current = self.stream.as_ref().map(|s| &s.id);
        if current != Some(event.stream_id()) {
            log::debug!("Dropping report from stale stream {}", event.stream_id());
            return Ok(());
        }

        match event {
            IngestEvent::Signal(_, signal) => {
                self.set_conversation(self.conversation.reduce(&signal));
                if let StreamSignal::Error { message } = &signal {
                    log::warn!("Server reported stream error: {}", message);
                    self.event_bus.emit(ChatEvent::Error {
                        message: message.clone(),
                    });
                }
                if signal.is_terminal() {
                    self.end_stream();
                }
                Ok(())
            }
            IngestEvent::Finished(_) => {
                self.set_conversation(self.conversation.finish_stream());
                self.end_stream();
                Ok(())
            }
            IngestEvent::Failed(_, message) => {
                self.set_conversation(self.conversation.fail_transport(&message));
                self.event_bus.emit(ChatEvent::Error {
                    message: message.clone(),
                });
                self.end_stream();
                Err(ChatError::StreamTransport(message))
            }
        }
    }

    /// The exchange is over: stop the worker and forget the stream.
    fn end_stream(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.token.cancel();
            log::debug!("Stream {} finished", stream.id);
            self.event_bus
                .emit(ChatEvent::StreamFinished { stream_id: stream.id });
        }
    }

    fn set_conversation(&mut self, next: Conversation) {
        let changed = !Arc::ptr_eq(next.messages(), self.conversation.messages());
        self.conversation = next;
        if changed {
            self.event_bus.emit(ChatEvent::MessagesChanged {
                messages: self.messages(),
            });
        }
    }

    fn emit_active(&self) {
        self.event_bus.emit(ChatEvent::ActiveSessionChanged {
            session_id: self.registry.active().cloned(),
        });
    }
}

impl Drop for StreamingChatClient {
    fn drop(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.token.cancel();
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
