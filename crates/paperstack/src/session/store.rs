//! Session store: the process-wide map from user id to session.
//!
//! A session exists in the store iff an interaction is in progress for that
//! user. The store is the only mutable state shared across users; `DashMap`
//! gives atomic per-key operations, which is all the required discipline since
//! the transport serializes events per user.

use std::sync::Arc;

use dashmap::DashMap;

use super::{Session, SessionState};

// ============================================================================
// SessionStore Trait
// ============================================================================

/// Store of active sessions, keyed by user id. Thread-safe.
pub trait SessionStore: Send + Sync {
    /// Look up a user's session.
    fn get(&self, user_id: &str) -> Option<Session>;

    /// Create or replace a user's session.
    fn insert(&self, session: Session);

    /// Remove a user's session, returning it if present.
    fn remove(&self, user_id: &str) -> Option<Session>;

    /// Number of active sessions.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply a transition outcome: upsert a live session, drop a terminal
    /// one, and leave the store untouched when no session was involved.
    fn apply(&self, user_id: &str, outcome: Option<Session>) {
        match outcome {
            Some(s) if s.state == SessionState::Terminal => {
                self.remove(user_id);
            }
            Some(s) => self.insert(s),
            None => {}
        }
    }
}

// ============================================================================
// In-Memory Implementation
// ============================================================================

/// In-memory session store. Cheap to clone; no persistence across restarts.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<DashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, user_id: &str) -> Option<Session> {
        self.sessions.get(user_id).map(|s| s.clone())
    }

    fn insert(&self, session: Session) {
        self.sessions.insert(session.user_id.clone(), session);
    }

    fn remove(&self, user_id: &str) -> Option<Session> {
        self.sessions.remove(user_id).map(|(_, s)| s)
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}
