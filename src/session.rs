//! Host session registry: which kernels the notebook server currently runs.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tracing::debug;

/// Kernel reference inside a session record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct KernelModel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// One entry of the server's session list (`GET /api/sessions`).
///
/// Only the fields used for attribution are kept; the rest of the payload
/// is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub path: Option<String>,
    pub kernel: KernelModel,
}

impl Session {
    pub fn new(id: impl Into<String>, kernel_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: None,
            kernel: KernelModel {
                id: kernel_id.into(),
                name: None,
            },
        }
    }
}

/// Error type for session list queries.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("session request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Server answered with a non-success status.
    #[error("session request returned HTTP {0}")]
    Status(u16),
    /// Response body is not a session list.
    #[error("invalid session list: {0}")]
    Decode(String),
    /// Registry has no answer right now.
    #[error("session registry unavailable: {0}")]
    Unavailable(String),
}

/// Source of the host's current sessions.
pub trait SessionRegistry: Send + Sync {
    /// Returns the sessions the host currently knows about.
    fn list_sessions(&self) -> impl Future<Output = Result<Vec<Session>, RegistryError>> + Send;
}

impl<R: SessionRegistry> SessionRegistry for Arc<R> {
    fn list_sessions(&self) -> impl Future<Output = Result<Vec<Session>, RegistryError>> + Send {
        (**self).list_sessions()
    }
}

/// Connection settings for [`JupyterSessionRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Base URL of the notebook server, e.g. `http://127.0.0.1:8888`.
    pub server_url: String,
    /// API token, sent as `Authorization: token <token>`.
    pub token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// Session registry backed by the Jupyter server REST API.
pub struct JupyterSessionRegistry {
    http: reqwest::Client,
    sessions_url: String,
    token: Option<String>,
}

impl JupyterSessionRegistry {
    pub fn new(cfg: &RegistryConfig) -> Result<Self, RegistryError> {
        let timeout = if cfg.timeout.is_zero() {
            Duration::from_secs(5)
        } else {
            cfg.timeout
        };

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            sessions_url: format!("{}/api/sessions", cfg.server_url.trim_end_matches('/')),
            token: cfg.token.clone().filter(|t| !t.is_empty()),
        })
    }

    pub fn sessions_url(&self) -> &str {
        &self.sessions_url
    }
}

impl SessionRegistry for JupyterSessionRegistry {
    async fn list_sessions(&self) -> Result<Vec<Session>, RegistryError> {
        let mut request = self.http.get(&self.sessions_url);
        if let Some(ref token) = self.token {
            request = request.header(AUTHORIZATION, format!("token {token}"));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let sessions: Vec<Session> =
            serde_json::from_slice(&body).map_err(|e| RegistryError::Decode(e.to_string()))?;

        debug!(count = sessions.len(), "fetched sessions");
        Ok(sessions)
    }
}

/// In-memory registry whose answer is set by the caller.
#[derive(Debug)]
pub struct StaticSessionRegistry {
    state: Mutex<Result<Vec<Session>, String>>,
}

impl StaticSessionRegistry {
    pub fn new(sessions: Vec<Session>) -> Self {
        Self {
            state: Mutex::new(Ok(sessions)),
        }
    }

    /// Replaces the session list returned from now on.
    pub fn set_sessions(&self, sessions: Vec<Session>) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Ok(sessions);
    }

    /// Makes every following query fail with `message`.
    pub fn set_unavailable(&self, message: impl Into<String>) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Err(message.into());
    }
}

impl SessionRegistry for StaticSessionRegistry {
    async fn list_sessions(&self) -> Result<Vec<Session>, RegistryError> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .map_err(RegistryError::Unavailable)
    }
}
