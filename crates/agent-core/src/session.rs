//! Session Management
//!
//! One session per cookie token. Each session sits behind its own async
//! mutex so a turn holds it exclusively from first oracle call to commit.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::message::{Memory, Turn};

/// Opaque session token
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
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

/// A user's isolated conversational context
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub memory: Memory,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        let now = Utc::now();
        Self {
            id,
            memory: Memory::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Append a completed turn
    pub fn record(&mut self, turn: Turn) {
        self.memory.push(turn);
        self.touch();
    }

    /// Forget the conversation
    pub fn reset(&mut self) {
        self.memory.clear();
        self.touch();
    }

    pub fn turn_count(&self) -> usize {
        self.memory.len()
    }
}

/// Shared, exclusively-lockable session
pub type SessionHandle = Arc<Mutex<Session>>;

/// Narrow interface over session storage
pub trait SessionStore: Send + Sync {
    /// Look up a live session
    fn get(&self, id: &SessionId) -> Option<SessionHandle>;

    /// Create and register a fresh session
    fn create(&self) -> (SessionId, SessionHandle);

    /// Drop a session entirely
    fn remove(&self, id: &SessionId) -> bool;

    /// Number of live sessions
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve `id` or create a new session; the flag is `true` when created
    fn get_or_create(&self, id: Option<&SessionId>) -> (SessionId, SessionHandle, bool) {
        if let Some(id) = id {
            if let Some(handle) = self.get(id) {
                return (id.clone(), handle, false);
            }
        }
        let (id, handle) = self.create();
        (id, handle, true)
    }
}

/// In-process session store
///
/// With a maximum age set, sessions idle for longer are dropped whenever a
/// new one is created. A session locked by a running turn is never dropped.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    max_idle: Option<TimeDelta>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire sessions idle for more than `seconds`
    pub fn with_max_age(seconds: i64) -> Self {
        Self {
            sessions: RwLock::default(),
            max_idle: TimeDelta::try_seconds(seconds.max(0)),
        }
    }

    /// Drop idle sessions, returning how many went
    pub fn prune_idle(&self) -> usize {
        let Some(max_idle) = self.max_idle else {
            return 0;
        };
        let cutoff = Utc::now() - max_idle;
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let before = sessions.len();
        sessions.retain(|_, handle| {
            handle
                .try_lock()
                .map_or(true, |session| session.updated_at > cutoff)
        });
        let pruned = before - sessions.len();
        if pruned > 0 {
            tracing::info!(pruned, live = sessions.len(), "expired idle sessions");
        }
        pruned
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, id: &SessionId) -> Option<SessionHandle> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(id).cloned()
    }

    fn create(&self) -> (SessionId, SessionHandle) {
        self.prune_idle();
        let id = SessionId::new();
        let handle = Arc::new(Mutex::new(Session::new(id.clone())));
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(id.clone(), Arc::clone(&handle));
        tracing::info!(session = %id, "created session");
        (id, handle)
    }

    fn remove(&self, id: &SessionId) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(id).is_some()
    }

    fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
