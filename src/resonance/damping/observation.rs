//! Exponential damping of user-state signals.
//!
//! Damping shrinks every signal by the same factor so the latest interaction
//! does not pull the state too hard. It is a stateless transform: the input is
//! borrowed, a new mapping is returned, nothing is retained.
//!
//! The factor is only required to be finite. Values outside `[0, 1]` are applied
//! as given: a factor above 1 flips the sign of every signal, a negative factor
//! amplifies them.

use std::collections::BTreeMap;

use crate::resonance::core::config::DampingConfig;
use crate::resonance::core::errors::{ResonanceError, ResonanceResult};

/// Named signals and their magnitudes.
pub type UserState = BTreeMap<String, f64>;

/// Applies `value * (1 - factor)` to every signal.
#[derive(Clone, Copy, Debug)]
pub struct ObservationDamping {
    factor: f64,
}

impl ObservationDamping {
    /// Create a damping transform.
    ///
    /// # Errors
    /// Returns `ResonanceError::Config` if `factor` is NaN or infinite.
    pub fn new(factor: f64) -> ResonanceResult<Self> {
        if !factor.is_finite() {
            return Err(ResonanceError::Config(format!(
                "damping factor must be finite, got {factor}"
            )));
        }
        Ok(Self { factor })
    }

    /// Create a damping transform from configuration.
    ///
    /// # Errors
    /// Returns `ResonanceError::Config` if the configured factor is not finite.
    pub fn from_config(config: &DampingConfig) -> ResonanceResult<Self> {
        Self::new(config.factor)
    }

    /// Configured damping factor.
    #[must_use]
    pub const fn factor(&self) -> f64 {
        self.factor
    }

    /// Damp every signal; the output has the same key set as the input.
    #[must_use]
    pub fn apply(&self, state: &UserState) -> UserState {
        let retain = 1.0 - self.factor;
        state
            .iter()
            .map(|(signal, value)| (signal.clone(), value * retain))
            .collect()
    }
}
