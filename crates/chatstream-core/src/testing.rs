//! In-memory test doubles for the backend and for response bodies.

use std::collections::{HashSet, VecDeque};
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

use crate::backend::{BackendError, ByteStream, ChatBackend};
use crate::conversation::Message;
use crate::session::{SessionDetail, SessionId, SessionSummary};

/// A reader that returns one scripted chunk per `read` call.
pub(crate) struct ChunkReader {
    chunks: VecDeque<Vec<u8>>,
    error: Option<String>,
}

impl ChunkReader {
    pub(crate) fn new(chunks: Vec<&str>) -> Self {
        Self {
            chunks: chunks.into_iter().map(|c| c.as_bytes().to_vec()).collect(),
            error: None,
        }
    }

    /// Fail with a connection reset once the chunks are exhausted.
    pub(crate) fn then_fail(mut self, message: &str) -> Self {
        self.error = Some(message.to_string());
        self
    }
}

impl Read for ChunkReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(mut chunk) = self.chunks.pop_front() else {
            return match self.error.take() {
                Some(message) => Err(io::Error::new(io::ErrorKind::ConnectionReset, message)),
                None => Ok(0),
            };
        };

        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.chunks.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
}

/// A reader fed from a channel, for tests that need to act mid-stream.
///
/// `read` blocks until the test sends the next chunk; dropping the sender
/// ends the stream.
pub(crate) struct GatedReader {
    rx: Receiver<Vec<u8>>,
    leftover: Vec<u8>,
}

impl GatedReader {
    pub(crate) fn new() -> (Self, Sender<Vec<u8>>) {
        let (tx, rx) = mpsc::channel();
        (
            Self {
                rx,
                leftover: Vec::new(),
            },
            tx,
        )
    }
}

impl Read for GatedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.leftover.is_empty() {
            match self.rx.recv() {
                Ok(chunk) => self.leftover = chunk,
                Err(_) => return Ok(0),
            }
        }

        let n = self.leftover.len().min(buf.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);
        Ok(n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Op {
    List,
    Create,
    Get,
    Delete,
    Send,
}

enum Script {
    Chunks(ChunkReader),
    Gated(GatedReader),
}

/// A `ChatBackend` backed by plain collections.
///
/// Send-message responses are taken from a queue of scripts, one per send.
/// A send with no script queued gets an empty body.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    sessions: Mutex<Vec<SessionDetail>>,
    failing: Mutex<HashSet<Op>>,
    scripts: Mutex<VecDeque<Script>>,
    sent: Mutex<Vec<(SessionId, String)>>,
    next_id: AtomicUsize,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_sessions(ids: &[&str]) -> Self {
        let backend = Self::new();
        {
            let mut sessions = backend.sessions.lock().unwrap();
            for id in ids {
                sessions.push(SessionDetail {
                    id: SessionId::from(*id),
                    created_at: "T".to_string(),
                    messages: Vec::new(),
                });
            }
        }
        backend
    }

    pub(crate) fn set_messages(&self, id: &str, messages: Vec<Message>) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.iter_mut().find(|s| s.id.as_str() == id) {
            session.messages = messages;
        }
    }

    pub(crate) fn fail(&self, op: Op) {
        self.failing.lock().unwrap().insert(op);
    }

    pub(crate) fn recover(&self, op: Op) {
        self.failing.lock().unwrap().remove(&op);
    }

    /// Queue a response body delivered in exactly these chunks.
    pub(crate) fn push_stream(&self, chunks: Vec<&str>) {
        self.scripts
            .lock()
            .unwrap()
            .push_back(Script::Chunks(ChunkReader::new(chunks)));
    }

    /// Queue a response body that breaks after these chunks.
    pub(crate) fn push_failing_stream(&self, chunks: Vec<&str>, message: &str) {
        self.scripts
            .lock()
            .unwrap()
            .push_back(Script::Chunks(ChunkReader::new(chunks).then_fail(message)));
    }

    /// Queue a response body the test feeds by hand.
    pub(crate) fn push_gated_stream(&self) -> Sender<Vec<u8>> {
        let (reader, tx) = GatedReader::new();
        self.scripts.lock().unwrap().push_back(Script::Gated(reader));
        tx
    }

    /// Every `(session, content)` pair sent so far.
    pub(crate) fn sent(&self) -> Vec<(SessionId, String)> {
        self.sent.lock().unwrap().clone()
    }

    fn check(&self, op: Op) -> Result<(), BackendError> {
        if self.failing.lock().unwrap().contains(&op) {
            Err(BackendError::Status {
                code: 500,
                body: format!("{:?} failed", op),
            })
        } else {
            Ok(())
        }
    }

    fn not_found(id: &SessionId) -> BackendError {
        BackendError::Status {
            code: 404,
            body: format!("session {} not found", id),
        }
    }
}

impl ChatBackend for ScriptedBackend {
    fn list_sessions(&self) -> Result<Vec<SessionSummary>, BackendError> {
        self.check(Op::List)?;
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .map(SessionDetail::summary)
            .collect())
    }

    fn create_session(&self) -> Result<SessionSummary, BackendError> {
        self.check(Op::Create)?;
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let detail = SessionDetail {
            id: SessionId(format!("new-{}", n)),
            created_at: "T".to_string(),
            messages: Vec::new(),
        };
        let summary = SessionSummary {
            id: detail.id.clone(),
            created_at: detail.created_at.clone(),
            message_count: None,
        };
        self.sessions.lock().unwrap().insert(0, detail);
        Ok(summary)
    }

    fn get_session(&self, id: &SessionId) -> Result<SessionDetail, BackendError> {
        self.check(Op::Get)?;
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| &s.id == id)
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }

    fn delete_session(&self, id: &SessionId) -> Result<(), BackendError> {
        self.check(Op::Delete)?;
        let mut sessions = self.sessions.lock().unwrap();
        let before = sessions.len();
        sessions.retain(|s| &s.id != id);
        if sessions.len() == before {
            return Err(Self::not_found(id));
        }
        Ok(())
    }

    fn send_message(&self, id: &SessionId, content: &str) -> Result<ByteStream, BackendError> {
        self.check(Op::Send)?;
        self.sent
            .lock()
            .unwrap()
            .push((id.clone(), content.to_string()));

        let script = self.scripts.lock().unwrap().pop_front();
        Ok(match script {
            Some(Script::Chunks(reader)) => Box::new(reader),
            Some(Script::Gated(reader)) => Box::new(reader),
            None => Box::new(ChunkReader::new(Vec::new())),
        })
    }
}
