//! Append-only buffer of remembered queries.
//!
//! The buffer is a log, not an index: records are appended in insertion order
//! and read back only as snapshots. Each append is atomic with respect to
//! concurrent writers.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use crate::resonance::core::config::{EmbeddingConfig, EngineConfig, MemoryConfig};
use crate::resonance::core::errors::{ResonanceError, ResonanceResult};
use crate::resonance::core::record::{FixedLengthVector, MemoryMetadata, MemoryRecord};
use crate::resonance::embedding::embedder::Embedder;

/// In-process history of query records.
pub struct MemoryBuffer {
    embedder: Arc<dyn Embedder>,
    ndims: usize,
    capacity: Option<NonZeroUsize>,
    embedding_timeout: Option<Duration>,
    records: Mutex<VecDeque<MemoryRecord>>,
}

impl MemoryBuffer {
    /// Create a new buffer backed by `embedder`.
    ///
    /// The dimensionality is fixed by `embedding.ndims`; the embedder must
    /// declare the same.
    ///
    /// # Errors
    /// Returns `ResonanceError::Config` if the configured dimensionality is zero
    /// or differs from the embedder's, or the configured capacity is zero.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        embedding: &EmbeddingConfig,
        memory: &MemoryConfig,
        engine: &EngineConfig,
    ) -> ResonanceResult<Self> {
        let ndims = embedding.ndims;
        if ndims == 0 {
            return Err(ResonanceError::Config(
                "embedding.ndims must be > 0".to_string(),
            ));
        }
        if embedder.ndims() != ndims {
            return Err(ResonanceError::Config(format!(
                "embedder declares {} dimensions, embedding.ndims is {ndims}",
                embedder.ndims()
            )));
        }
        let capacity = memory
            .capacity
            .map(|capacity| {
                NonZeroUsize::new(capacity).ok_or_else(|| {
                    ResonanceError::Config("memory.capacity must be > 0".to_string())
                })
            })
            .transpose()?;

        Ok(Self {
            embedder,
            ndims,
            capacity,
            embedding_timeout: engine.embedding_timeout(),
            records: Mutex::new(VecDeque::new()),
        })
    }

    /// Declared embedding dimensionality.
    #[must_use]
    pub const fn ndims(&self) -> usize {
        self.ndims
    }

    /// Encode text into a vector of exactly [`Self::ndims`] dimensions.
    ///
    /// # Errors
    /// Returns `ResonanceError::Embedding` if the embedder fails, times out, or
    /// returns a vector of the wrong length.
    pub async fn encode_to_vector(&self, text: &str) -> ResonanceResult<FixedLengthVector> {
        let values = match self.embedding_timeout {
            Some(limit) => tokio::time::timeout(limit, self.embedder.embed_text(text))
                .await
                .map_err(|_| ResonanceError::Embedding {
                    text_len: text.len(),
                    reason: format!("timed out after {limit:?}"),
                })??,
            None => self.embedder.embed_text(text).await?,
        };

        if values.len() != self.ndims {
            return Err(ResonanceError::Embedding {
                text_len: text.len(),
                reason: format!("expected {} dimensions, got {}", self.ndims, values.len()),
            });
        }

        Ok(FixedLengthVector::new(values))
    }

    /// Build a record for `query` without appending it.
    ///
    /// # Errors
    /// Returns `ResonanceError::Embedding` if the query cannot be encoded.
    pub async fn prepare(
        &self,
        query: &str,
        metadata: MemoryMetadata,
    ) -> ResonanceResult<MemoryRecord> {
        let embedding = self.encode_to_vector(query).await?;
        Ok(MemoryRecord::new(query, embedding, metadata))
    }

    /// Append a prepared record.
    ///
    /// When a capacity is configured, the oldest records are evicted first.
    pub async fn append(&self, record: MemoryRecord) {
        let mut records = self.records.lock().await;
        records.push_back(record);
        if let Some(capacity) = self.capacity {
            let overflow = records.len().saturating_sub(capacity.get());
            if overflow > 0 {
                records.drain(..overflow).for_each(drop);
                debug!(evicted = overflow, "Evicted oldest memory records");
            }
        }
    }

    /// Encode and append a record for `query`.
    ///
    /// # Errors
    /// Returns `ResonanceError::Embedding` if the query cannot be encoded; nothing
    /// is appended in that case.
    pub async fn store(
        &self,
        query: &str,
        metadata: MemoryMetadata,
    ) -> ResonanceResult<MemoryRecord> {
        let record = self.prepare(query, metadata).await?;
        self.append(record.clone()).await;
        Ok(record)
    }

    /// Snapshot of all records in insertion order.
    pub async fn records(&self) -> Vec<MemoryRecord> {
        self.records.lock().await.iter().cloned().collect()
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Whether the buffer holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}
