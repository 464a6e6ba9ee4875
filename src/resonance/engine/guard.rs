//! Scope guard rolling back a session when a response is abandoned.

use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::resonance::core::ids::SessionId;
use crate::resonance::integrity::IntegrityManager;

/// Rolls the session back on drop unless disarmed.
///
/// Covers the exit paths `?` cannot see: the response future being dropped
/// mid-flight (client disconnect, outer timeout) and panics.
pub(crate) struct SessionGuard {
    integrity: Arc<IntegrityManager>,
    session_id: SessionId,
    armed: bool,
}

impl SessionGuard {
    pub(crate) const fn arm(integrity: Arc<IntegrityManager>, session_id: SessionId) -> Self {
        Self {
            integrity,
            session_id,
            armed: true,
        }
    }

    /// Hand responsibility for the session back to the caller.
    pub(crate) const fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let session_id = self.session_id;
        let Ok(runtime) = Handle::try_current() else {
            warn!(%session_id, "No runtime to roll back abandoned session");
            return;
        };

        let integrity = Arc::clone(&self.integrity);
        runtime.spawn(async move {
            match integrity.rollback(session_id).await {
                Ok(discarded) => debug!(%session_id, discarded, "Abandoned session rolled back"),
                Err(err) => warn!(%session_id, error = %err, "Abandoned session rollback failed"),
            }
        });
    }
}
