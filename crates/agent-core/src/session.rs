//! Session Management
//!
//! In-memory store of per-browser-tab sessions. Each session remembers the
//! MCP endpoint, region and model it was opened with, the caller's access
//! token, and the ordered (query, response) history.
//!
//! The map lock is only held long enough to find or insert an entry; each
//! session sits behind its own mutex so appends to one session never wait on
//! another, while appends to the same session are serialized.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::message::{Conversation, Message};

/// Default number of exchanges retained per session
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Random v4 UUID (122 bits of entropy)
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One query and the agent's answer to it
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Exchange {
    pub query: String,
    pub response: String,
    pub at: DateTime<Utc>,
}

/// Connection parameters supplied when a session is opened
#[derive(Clone, Debug)]
pub struct NewSession {
    pub endpoint: String,
    pub region: String,
    pub model_id: String,
    pub auth_token: Option<String>,
}

/// A snapshot of one session
#[derive(Clone, Debug, Serialize)]
pub struct Session {
    pub id: SessionId,

    /// MCP server endpoint this session talks to
    pub endpoint: String,

    pub region: String,

    pub model_id: String,

    /// Access token of the user who opened the session
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,

    /// Ordered exchanges, oldest first
    pub history: Vec<Exchange>,

    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,
}

impl Session {
    fn new(id: SessionId, params: NewSession) -> Self {
        let now = Utc::now();
        Self {
            id,
            endpoint: params.endpoint,
            region: params.region,
            model_id: params.model_id,
            auth_token: params.auth_token,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append the stored exchanges to `conversation` as user/assistant turns
    pub fn replay_into(&self, conversation: &mut Conversation) {
        for exchange in &self.history {
            conversation.push(Message::user(&exchange.query));
            conversation.push(Message::assistant(&exchange.response));
        }
    }

    pub fn last_exchange(&self) -> Option<&Exchange> {
        self.history.last()
    }

    fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.updated_at).to_std().unwrap_or_default()
    }
}

/// `None` once the session has been removed, so a writer that grabbed the
/// slot before removal observes the deletion.
type Slot = Arc<Mutex<Option<Session>>>;

/// In-memory session store
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Slot>>,
    history_limit: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Store that keeps at most `limit` exchanges per session, dropping the oldest
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            history_limit: limit.max(1),
        }
    }

    /// Create a session with an empty history and return its id
    pub async fn create(&self, params: NewSession) -> SessionId {
        let mut sessions = self.sessions.write().await;
        loop {
            let id = SessionId::new();
            if let Entry::Vacant(slot) = sessions.entry(id.clone()) {
                tracing::debug!(session_id = %id, endpoint = %params.endpoint, "Session created");
                slot.insert(Arc::new(Mutex::new(Some(Session::new(id.clone(), params)))));
                return id;
            }
        }
    }

    async fn slot(&self, id: &SessionId) -> Result<Slot> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AgentError::SessionNotFound(id.to_string()))
    }

    /// Snapshot of a session
    pub async fn get(&self, id: &SessionId) -> Result<Session> {
        let slot = self.slot(id).await?;
        let guard = slot.lock().await;
        guard
            .clone()
            .ok_or_else(|| AgentError::SessionNotFound(id.to_string()))
    }

    /// Mark the session active and return a snapshot of it
    pub async fn touch(&self, id: &SessionId) -> Result<Session> {
        let slot = self.slot(id).await?;
        let mut guard = slot.lock().await;
        let session = guard
            .as_mut()
            .ok_or_else(|| AgentError::SessionNotFound(id.to_string()))?;
        session.updated_at = Utc::now();
        Ok(session.clone())
    }

    /// Append an exchange to the session's history
    pub async fn record_exchange(
        &self,
        id: &SessionId,
        query: impl Into<String>,
        response: impl Into<String>,
    ) -> Result<()> {
        let slot = self.slot(id).await?;
        let mut guard = slot.lock().await;
        let session = guard
            .as_mut()
            .ok_or_else(|| AgentError::SessionNotFound(id.to_string()))?;

        let now = Utc::now();
        session.history.push(Exchange {
            query: query.into(),
            response: response.into(),
            at: now,
        });
        if session.history.len() > self.history_limit {
            let excess = session.history.len() - self.history_limit;
            session.history.drain(..excess);
        }
        session.updated_at = now;
        Ok(())
    }

    /// Delete a session. Unknown ids yield `SessionNotFound` and touch nothing.
    pub async fn remove(&self, id: &SessionId) -> Result<()> {
        let slot = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| AgentError::SessionNotFound(id.to_string()))?;
        slot.lock().await.take();
        tracing::debug!(session_id = %id, "Session removed");
        Ok(())
    }

    /// Drop sessions with no activity for longer than `max_idle`
    pub async fn reap_idle(&self, max_idle: Duration) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let mut stale = Vec::new();

        for (id, slot) in sessions.iter() {
            let guard = slot.lock().await;
            if guard.as_ref().is_none_or(|s| s.idle_for(now) > max_idle) {
                stale.push(id.clone());
            }
        }

        for id in &stale {
            if let Some(slot) = sessions.remove(id) {
                slot.lock().await.take();
                tracing::info!(session_id = %id, "Reaping idle session");
            }
        }

        stale.len()
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
