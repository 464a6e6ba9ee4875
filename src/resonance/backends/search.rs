//! Search backend abstraction for the lexical and vector channels.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use crate::resonance::core::record::{Query, ResultRecord};

/// Boxed future type for search operations.
pub type SearchFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors raised by a search backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Backend is unreachable or refused the request.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// Backend did not answer in time.
    #[error("backend timed out after {0:?}")]
    Timeout(Duration),
    /// Any other backend-specific failure.
    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Check if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }
}

/// Trait abstraction over a retrieval backend (inverted index, ANN index, ...).
///
/// The same trait serves both channels; the engine holds one instance per channel.
pub trait SearchBackend: Send + Sync {
    /// Search for records matching the query.
    ///
    /// # Errors
    /// Returns a backend-specific error if the search cannot be executed.
    fn search<'a>(
        &'a self,
        query: &'a Query,
    ) -> SearchFuture<'a, Result<Vec<ResultRecord>, BackendError>>;

    /// Short backend name for logs.
    fn name(&self) -> &str;
}
