//! HTTP implementation of [`ChatBackend`] over `ureq`.
//!
//! Routes, relative to the configured base URL:
//!
//! | operation | request |
//! |---|---|
//! | list | `GET /sessions` |
//! | create | `POST /sessions` |
//! | get | `GET /sessions/{id}` |
//! | delete | `DELETE /sessions/{id}` |
//! | send | `POST /sessions/{id}/messages` with `{"content": ...}` |
//!
//! `send` asks for `text/event-stream` and hands the unread body back as a
//! reader; nothing here buffers the stream.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::json;

use super::{BackendError, ByteStream, ChatBackend};
use crate::config::ClientConfig;
use crate::session::{SessionDetail, SessionId, SessionSummary};

/// Talks to the chat server over HTTP.
pub struct HttpBackend {
    agent: ureq::Agent,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Self {
        // No read timeout: a stalled stream blocks until cancelled or the
        // transport gives up.
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(config.connect_timeout_secs))
            .build();

        Self {
            agent,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let request = self.agent.request(method, &self.url(path));
        match &self.auth_token {
            Some(token) => request.set("Authorization", &format!("Bearer {}", token)),
            None => request,
        }
    }
}

fn read_json<T: DeserializeOwned>(response: ureq::Response) -> Result<T, BackendError> {
    response
        .into_json::<T>()
        .map_err(|e| BackendError::Decode(e.to_string()))
}

impl From<ureq::Error> for BackendError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, response) => BackendError::Status {
                code,
                body: response.into_string().unwrap_or_default(),
            },
            ureq::Error::Transport(transport) => BackendError::Transport(transport.to_string()),
        }
    }
}

impl ChatBackend for HttpBackend {
    fn list_sessions(&self) -> Result<Vec<SessionSummary>, BackendError> {
        let response = self.request("GET", "/sessions").call()?;
        read_json(response)
    }

    fn create_session(&self) -> Result<SessionSummary, BackendError> {
        let response = self.request("POST", "/sessions").send_json(json!({}))?;
        read_json(response)
    }

    fn get_session(&self, id: &SessionId) -> Result<SessionDetail, BackendError> {
        let response = self.request("GET", &format!("/sessions/{}", id)).call()?;
        read_json(response)
    }

    fn delete_session(&self, id: &SessionId) -> Result<(), BackendError> {
        self.request("DELETE", &format!("/sessions/{}", id)).call()?;
        Ok(())
    }

    fn send_message(&self, id: &SessionId, content: &str) -> Result<ByteStream, BackendError> {
        log::debug!("POST /sessions/{}/messages ({} bytes)", id, content.len());
        let response = self
            .request("POST", &format!("/sessions/{}/messages", id))
            .set("Accept", "text/event-stream")
            .send_json(json!({ "content": content }))?;
        Ok(Box::new(response.into_reader()))
    }
}
