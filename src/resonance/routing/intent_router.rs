//! Intent router: picks the retrieval channel for a query.
//!
//! The current policy is a token-count heuristic: short queries are treated as
//! precise lookups and go to the lexical channel, longer ones go to the vector
//! channel. Routing is a pure function of the query text and the configuration.

use tracing::debug;

use crate::resonance::core::channel::Channel;
use crate::resonance::core::config::RouterConfig;
use crate::resonance::core::errors::{ResonanceError, ResonanceResult};

/// Classifies queries into a [`Channel`].
#[derive(Clone, Debug)]
pub struct IntentRouter {
    max_lexical_tokens: usize,
    lexical_threshold: f64,
}

impl Default for IntentRouter {
    fn default() -> Self {
        let config = RouterConfig::default();
        Self {
            max_lexical_tokens: config.max_lexical_tokens,
            lexical_threshold: config.lexical_threshold,
        }
    }
}

impl IntentRouter {
    /// Create a router from configuration.
    ///
    /// # Errors
    /// Returns `ResonanceError::Config` if `lexical_threshold` is not finite.
    pub fn new(config: &RouterConfig) -> ResonanceResult<Self> {
        if !config.lexical_threshold.is_finite() {
            return Err(ResonanceError::Config(
                "router.lexical_threshold must be finite".to_string(),
            ));
        }
        Ok(Self {
            max_lexical_tokens: config.max_lexical_tokens,
            lexical_threshold: config.lexical_threshold,
        })
    }

    /// Route a query to exactly one channel.
    #[must_use]
    pub fn route(&self, query: &str) -> Channel {
        let channel = if self.is_precise(query) {
            Channel::Lexical
        } else {
            Channel::Vector
        };
        debug!(%channel, "Routed query");
        channel
    }

    /// Whether the query looks like a precise lookup.
    #[must_use]
    pub fn is_precise(&self, query: &str) -> bool {
        token_count(query) < self.max_lexical_tokens
    }

    /// Reserved classifier threshold.
    #[must_use]
    pub const fn lexical_threshold(&self) -> f64 {
        self.lexical_threshold
    }

    /// Token count at which queries switch to the vector channel.
    #[must_use]
    pub const fn max_lexical_tokens(&self) -> usize {
        self.max_lexical_tokens
    }
}

/// Count whitespace-delimited tokens.
#[must_use]
pub fn token_count(query: &str) -> usize {
    query.split_whitespace().count()
}
