//! Client configuration.
//!
//! Sources, later wins: built-in defaults, a JSON config file, environment
//! variables, then whatever the embedding application sets explicitly.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_BASE_URL: &str = "CHATSTREAM_BASE_URL";
pub const ENV_TOKEN: &str = "CHATSTREAM_TOKEN";
pub const ENV_TRANSCRIPT_DIR: &str = "CHATSTREAM_TRANSCRIPT_DIR";

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Settings for a [`crate::StreamingChatClient`] and its HTTP backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the chat API, without a trailing slash.
    pub base_url: String,

    /// Sent as `Authorization: Bearer <token>` when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    pub connect_timeout_secs: u64,

    /// Directory for per-stream transcripts. Disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_token: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            transcript_dir: None,
        }
    }
}

impl ClientConfig {
    /// Load a JSON config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path` if it exists, otherwise start from defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Apply overrides from the process environment.
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup. Empty values are ignored.
    pub fn with_env_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(base_url) = get(ENV_BASE_URL) {
            self.base_url = base_url;
        }
        if let Some(token) = get(ENV_TOKEN) {
            self.auth_token = Some(token);
        }
        if let Some(dir) = get(ENV_TRANSCRIPT_DIR) {
            self.transcript_dir = Some(PathBuf::from(dir));
        }
        self
    }
}
