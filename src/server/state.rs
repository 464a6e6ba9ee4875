//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::resonance::ResonanceEngine;

/// Shared application state.
pub struct AppState {
    /// Engine answering queries.
    pub engine: Arc<ResonanceEngine>,
}

impl AppState {
    /// Wrap an engine for the router.
    #[must_use]
    pub const fn new(engine: Arc<ResonanceEngine>) -> Self {
        Self { engine }
    }
}
