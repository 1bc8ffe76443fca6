//! The process-wide session map.
//!
//! The registry is the only intentionally global mutable structure in
//! the broker. It is constructed once at startup and handed by `Arc` to
//! every component that needs it; mutation is serialized behind a
//! single writer lock, and iteration always works on a snapshot so a
//! fleet-wide directive never races session creation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::session::Session;
use termgate_types::{BrokerError, BrokerResult, SessionId};

pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions,
        }
    }

    /// Register a new session. Fails with `ResourceExhausted` at the
    /// session cap; the capacity check and the insert happen under one
    /// write lock so concurrent creates cannot overshoot.
    pub async fn register(&self, session: Arc<Session>) -> BrokerResult<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.max_sessions {
            return Err(BrokerError::ResourceExhausted(format!(
                "maximum concurrent sessions ({}) reached",
                self.max_sessions
            )));
        }
        sessions.insert(session.id, session);
        Ok(())
    }

    pub async fn lookup(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn unregister(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(id)
    }

    /// Snapshot of every live session, for fleet-wide iteration.
    pub async fn list_active(&self) -> Vec<Arc<Session>> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
