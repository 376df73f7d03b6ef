//! Session store: session id → conversation history.
//!
//! The orchestrator consumes this interface only; backends are free to be a
//! process-local map or a networked key/value store. A missing session reads
//! as an empty, new history.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::warn;

use crate::history::MessageHistory;

/// Backend holding one [`MessageHistory`] per session.
///
/// Implementations must be safe to call from concurrent request handlers and
/// may apply a TTL to idle sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the session's history, or `None` when unknown or expired.
    async fn get(&self, session_id: &str) -> Option<MessageHistory>;

    /// Stores (or replaces) the session's history and refreshes its TTL.
    async fn set(&self, session_id: &str, history: MessageHistory);

    /// Drops the session.
    async fn delete(&self, session_id: &str);

    /// True when the session is present and not expired.
    async fn exists(&self, session_id: &str) -> bool;
}

struct SessionEntry {
    history: MessageHistory,
    expires_at: Instant,
}

/// Default in-process store: one mutex-guarded map, per-entry TTL.
///
/// The lock is taken per operation and never held across an await, so
/// concurrent turns on different sessions do not contend beyond the map
/// access itself.
pub struct InMemorySessionStore {
    entries: Mutex<HashMap<String, SessionEntry>>,
    ttl: Duration,
}

impl InMemorySessionStore {
    /// Creates a store whose entries expire `ttl` after their last write.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    fn entries(&self) -> Option<MutexGuard<'_, HashMap<String, SessionEntry>>> {
        match self.entries.lock() {
            Ok(guard) => Some(guard),
            Err(e) => {
                warn!(error = %e, "session map lock poisoned");
                None
            }
        }
    }

    fn live_entry<T>(&self, session_id: &str, f: impl FnOnce(&SessionEntry) -> T) -> Option<T> {
        let mut entries = self.entries()?;
        let expired = entries
            .get(session_id)
            .map(|e| e.expires_at <= Instant::now())
            .unwrap_or(false);
        if expired {
            entries.remove(session_id);
            return None;
        }
        entries.get(session_id).map(f)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Option<MessageHistory> {
        self.live_entry(session_id, |e| e.history.clone())
    }

    async fn set(&self, session_id: &str, history: MessageHistory) {
        if let Some(mut entries) = self.entries() {
            entries.insert(
                session_id.to_string(),
                SessionEntry {
                    history,
                    expires_at: Instant::now() + self.ttl,
                },
            );
        }
    }

    async fn delete(&self, session_id: &str) {
        if let Some(mut entries) = self.entries() {
            entries.remove(session_id);
        }
    }

    async fn exists(&self, session_id: &str) -> bool {
        self.live_entry(session_id, |_| ()).is_some()
    }
}
