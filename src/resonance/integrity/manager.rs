//! Integrity manager: begin/commit/rollback around a unit of work.
//!
//! Sessions live in a concurrent table keyed by id. Every session sits behind
//! its own async mutex, and each transition holds that lock for the whole
//! check-and-set (including the durable write on commit). Two racing
//! `commit`/`rollback` calls on one id therefore serialize, and only the first
//! one finds the session `Active`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::resonance::core::errors::{ResonanceError, ResonanceResult};
use crate::resonance::core::ids::{SessionId, UserId};
use crate::resonance::integrity::operation_store::DurableStore;
use crate::resonance::integrity::session::{Operation, Session, SessionSnapshot, SessionState};

/// Session counts by state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Sessions still open (including ones mid-transition).
    pub active: usize,
    /// Committed sessions not yet pruned.
    pub committed: usize,
    /// Rolled-back sessions not yet pruned.
    pub rolled_back: usize,
}

impl SessionStats {
    /// Total number of tracked sessions.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.active + self.committed + self.rolled_back
    }
}

/// Owner of the session table.
pub struct IntegrityManager {
    sessions: DashMap<SessionId, Arc<Mutex<Session>>>,
    store: Arc<dyn DurableStore>,
    store_timeout: Option<Duration>,
}

impl IntegrityManager {
    /// Create a manager persisting commits to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self {
            sessions: DashMap::new(),
            store,
            store_timeout: None,
        }
    }

    /// Bound every durable write by `limit`.
    #[must_use]
    pub const fn with_store_timeout(mut self, limit: Option<Duration>) -> Self {
        self.store_timeout = limit;
        self
    }

    /// Begin a new session for `user_id`.
    pub fn begin(&self, user_id: UserId) -> SessionId {
        loop {
            let session_id = SessionId::new();
            match self.sessions.entry(session_id) {
                Entry::Occupied(_) => {
                    warn!(%session_id, "Session id collision, regenerating");
                }
                Entry::Vacant(slot) => {
                    debug!(%session_id, user = %user_id, "Session started");
                    slot.insert(Arc::new(Mutex::new(Session::new(session_id, user_id))));
                    return session_id;
                }
            }
        }
    }

    /// Buffer an operation in an active session.
    ///
    /// # Errors
    /// Returns `ResonanceError::InvalidSessionState` if the session is unknown or terminal.
    pub async fn stage(&self, session_id: SessionId, operation: Operation) -> ResonanceResult<()> {
        let handle = self.handle(session_id)?;
        let mut session = handle.lock().await;
        session.ensure_active()?;
        debug!(%session_id, kind = operation.kind(), "Staged operation");
        session.operations.push(operation);
        Ok(())
    }

    /// Commit an active session and return its operations.
    ///
    /// Operations are persisted through the durable store first. If the store
    /// fails or exceeds the store timeout, the session stays `Active` and can
    /// still be rolled back.
    ///
    /// # Errors
    /// Returns `ResonanceError::InvalidSessionState` if the session is unknown or
    /// terminal, or the store error if persistence fails or times out.
    pub async fn commit(&self, session_id: SessionId) -> ResonanceResult<Vec<Operation>> {
        let handle = self.handle(session_id)?;
        let mut session = handle.lock().await;
        session.ensure_active()?;

        let persist = self
            .store
            .persist(session.id, &session.user_id, &session.operations);
        match self.store_timeout {
            Some(limit) => tokio::time::timeout(limit, persist).await.map_err(|_| {
                ResonanceError::Store(format!(
                    "{} store timed out after {limit:?}",
                    self.store.name()
                ))
            })??,
            None => persist.await?,
        }

        let operations = session.finish(SessionState::Committed);
        info!(
            %session_id,
            operations = operations.len(),
            store = self.store.name(),
            "Session committed"
        );
        Ok(operations)
    }

    /// Roll back an active session, discarding its operations.
    ///
    /// Returns how many operations were discarded.
    ///
    /// # Errors
    /// Returns `ResonanceError::InvalidSessionState` if the session is unknown or terminal.
    pub async fn rollback(&self, session_id: SessionId) -> ResonanceResult<usize> {
        let handle = self.handle(session_id)?;
        let mut session = handle.lock().await;
        session.ensure_active()?;

        let discarded = session.finish(SessionState::RolledBack).len();
        info!(%session_id, discarded, "Session rolled back");
        Ok(discarded)
    }

    /// Current state of a session, or `None` if unknown.
    pub async fn state(&self, session_id: SessionId) -> Option<SessionState> {
        let handle = self.handle(session_id).ok()?;
        let session = handle.lock().await;
        Some(session.state)
    }

    /// Snapshot of a session, or `None` if unknown.
    pub async fn snapshot(&self, session_id: SessionId) -> Option<SessionSnapshot> {
        let handle = self.handle(session_id).ok()?;
        let session = handle.lock().await;
        Some(session.snapshot())
    }

    /// Count tracked sessions by state.
    ///
    /// Sessions locked by an in-flight transition are counted as active.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        let mut stats = SessionStats::default();
        for entry in &self.sessions {
            match entry.value().try_lock().map(|session| session.state) {
                Ok(SessionState::Committed) => stats.committed += 1,
                Ok(SessionState::RolledBack) => stats.rolled_back += 1,
                Ok(SessionState::Active) | Err(_) => stats.active += 1,
            }
        }
        stats
    }

    /// Drop terminal sessions that finished more than `retention` ago.
    ///
    /// Active sessions are never pruned. Returns how many sessions were removed.
    pub fn prune_finished(&self, retention: Duration) -> usize {
        let Some(cutoff) = TimeDelta::from_std(retention)
            .ok()
            .and_then(|window| Utc::now().checked_sub_signed(window))
        else {
            return 0;
        };

        let before = self.sessions.len();
        self.sessions.retain(|_, handle| {
            handle.try_lock().map_or(true, |session| {
                !(session.state.is_terminal()
                    && session.finished_at.is_some_and(|finished| finished <= cutoff))
            })
        });
        before.saturating_sub(self.sessions.len())
    }

    /// Number of tracked sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn handle(&self, session_id: SessionId) -> ResonanceResult<Arc<Mutex<Session>>> {
        self.sessions
            .get(&session_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(ResonanceError::InvalidSessionState {
                session_id,
                state: None,
            })
    }
}
