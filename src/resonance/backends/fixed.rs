//! Backend returning a fixed result list, regardless of the query.

use crate::resonance::backends::search::{BackendError, SearchBackend, SearchFuture};
use crate::resonance::core::channel::Channel;
use crate::resonance::core::errors::ResonanceResult;
use crate::resonance::core::record::{Query, ResultRecord};

/// Search backend answering every query with the same records.
///
/// Useful as a stand-in while a real index is wired up, and as a deterministic
/// test double.
#[derive(Clone, Debug)]
pub struct FixedResults {
    name: String,
    results: Vec<ResultRecord>,
}

impl FixedResults {
    /// Create a backend returning `results`.
    #[must_use]
    pub fn new(name: impl Into<String>, results: Vec<ResultRecord>) -> Self {
        Self {
            name: name.into(),
            results,
        }
    }

    /// Backend returning no results.
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new())
    }

    /// Demo lexical backend: a single `"Lexical match result"` hit scored `0.6`.
    ///
    /// # Errors
    /// Never fails in practice; the score is a finite constant.
    pub fn lexical_demo() -> ResonanceResult<Self> {
        Ok(Self::new(
            "fixed-lexical",
            vec![ResultRecord::new(
                "Lexical match result",
                0.6,
                Channel::Lexical,
            )?],
        ))
    }

    /// Demo vector backend: a single `"Vector match result"` hit scored `0.9`.
    ///
    /// # Errors
    /// Never fails in practice; the score is a finite constant.
    pub fn vector_demo() -> ResonanceResult<Self> {
        Ok(Self::new(
            "fixed-vector",
            vec![ResultRecord::new("Vector match result", 0.9, Channel::Vector)?],
        ))
    }
}

impl SearchBackend for FixedResults {
    fn search<'a>(
        &'a self,
        _query: &'a Query,
    ) -> SearchFuture<'a, Result<Vec<ResultRecord>, BackendError>> {
        let results = self.results.clone();
        Box::pin(async move { Ok(results) })
    }

    fn name(&self) -> &str {
        &self.name
    }
}
