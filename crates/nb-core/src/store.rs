//! Session store
//!
//! The MCP server never owns sessions directly; it reads and edits them
//! through a [`SessionStore`]. Each session sits behind its own mutex so
//! work on one session never waits on another.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{NewSession, Session, SessionId};

/// Exclusive access to one session, released on drop
pub type SessionGuard = OwnedMutexGuard<Session>;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Open a new session with a fresh id
    async fn open_session(&self, params: NewSession) -> Result<Session>;

    /// Remove a session from the registry, returning its final state
    async fn close_session(&self, id: &SessionId) -> Result<Session>;

    /// Point-in-time snapshot of every open session, oldest first
    async fn open_sessions(&self) -> Result<Vec<Session>>;

    /// Snapshot of a single session
    async fn get_session(&self, id: &SessionId) -> Result<Session>;

    /// Lock a session for exclusive reads/edits
    async fn lock_session(&self, id: &SessionId) -> Result<SessionGuard>;
}

/// In-process session store
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn entry(&self, id: &SessionId) -> Result<Arc<Mutex<Session>>> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::session_not_found(id.as_str()))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn open_session(&self, params: NewSession) -> Result<Session> {
        let session = Session::open(params);
        let id = session.id().clone();

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(Error::internal(format!("session id collision: {}", id)));
        }
        sessions.insert(id.clone(), Arc::new(Mutex::new(session.clone())));

        info!(
            session = %id,
            directory = %session.directory().display(),
            language = %session.language(),
            "Session opened"
        );
        Ok(session)
    }

    async fn close_session(&self, id: &SessionId) -> Result<Session> {
        let entry = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| Error::session_not_found(id.as_str()))?;

        // Wait for in-flight work on this session before handing back its state
        let session = entry.lock().await.clone();
        info!(session = %id, "Session closed");
        Ok(session)
    }

    async fn open_sessions(&self) -> Result<Vec<Session>> {
        let entries: Vec<_> = self.sessions.read().await.values().cloned().collect();

        let mut snapshot = Vec::with_capacity(entries.len());
        for entry in entries {
            snapshot.push(entry.lock().await.clone());
        }
        snapshot.sort_by(|a, b| {
            a.opened_at()
                .cmp(&b.opened_at())
                .then_with(|| a.id().cmp(b.id()))
        });

        debug!(count = snapshot.len(), "Snapshot of open sessions");
        Ok(snapshot)
    }

    async fn get_session(&self, id: &SessionId) -> Result<Session> {
        let entry = self.entry(id).await?;
        let session = entry.lock().await.clone();
        Ok(session)
    }

    async fn lock_session(&self, id: &SessionId) -> Result<SessionGuard> {
        let entry = self.entry(id).await?;
        Ok(entry.lock_owned().await)
    }
}
