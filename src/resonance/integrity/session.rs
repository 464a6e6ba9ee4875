//! Session model and state machine.
//!
//! ```text
//! begin ──> Active ──commit──> Committed
//!              └────rollback──> RolledBack
//! ```
//!
//! Both terminal states are final: a session is never reused.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resonance::core::errors::{ResonanceError, ResonanceResult};
use crate::resonance::core::ids::{SessionId, UserId};
use crate::resonance::core::record::MemoryRecord;

/// Lifecycle state of a session.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Open; operations may be staged.
    Active,
    /// Operations were made durable and visible.
    Committed,
    /// Operations were discarded.
    RolledBack,
}

impl SessionState {
    /// Stable string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work buffered inside a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Operation {
    /// Append a record to the memory buffer.
    AppendMemory(MemoryRecord),
}

impl Operation {
    /// Stable operation name.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AppendMemory(_) => "append_memory",
        }
    }
}

/// Session owned by the integrity manager.
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) id: SessionId,
    pub(crate) user_id: UserId,
    pub(crate) state: SessionState,
    pub(crate) operations: Vec<Operation>,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) finished_at: Option<DateTime<Utc>>,
}

impl Session {
    pub(crate) fn new(id: SessionId, user_id: UserId) -> Self {
        Self {
            id,
            user_id,
            state: SessionState::Active,
            operations: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) const fn ensure_active(&self) -> ResonanceResult<()> {
        match self.state {
            SessionState::Active => Ok(()),
            state => Err(ResonanceError::InvalidSessionState {
                session_id: self.id,
                state: Some(state),
            }),
        }
    }

    /// Move to a terminal state and hand back the buffered operations.
    pub(crate) fn finish(&mut self, state: SessionState) -> Vec<Operation> {
        self.state = state;
        self.finished_at = Some(Utc::now());
        std::mem::take(&mut self.operations)
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            user_id: self.user_id.clone(),
            state: self.state,
            pending_operations: self.operations.len(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// Read-only view of a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Session identifier.
    pub session_id: SessionId,
    /// Owning user.
    pub user_id: UserId,
    /// Current state.
    pub state: SessionState,
    /// Operations buffered and not yet committed or discarded.
    pub pending_operations: usize,
    /// When the session began.
    pub started_at: DateTime<Utc>,
    /// When the session reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}
