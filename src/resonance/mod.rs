//! Resonance subsystem.
//!
//! This module routes a query to a retrieval channel and runs the whole
//! retrieve-and-store step as one transactional unit of work:
//! - `core`: Configuration, errors, IDs, channels, and records
//! - `routing`: Intent classification into a lexical or vector channel
//! - `embedding`: Embedding model abstraction and implementations
//! - `memory`: Append-only buffer of query records
//! - `ranking`: Hybrid ranking over both channels' results
//! - `damping`: Exponential damping of user-state signals
//! - `backends`: Search backend abstraction and fixed-result backends
//! - `integrity`: Session state machine and durable operation stores
//! - `engine`: Main orchestration of a response
//! - `maintenance`: Background pruning of finished sessions

pub mod backends;
pub mod core;
pub mod damping;
pub mod embedding;
pub mod engine;
pub mod integrity;
pub mod maintenance;
pub mod memory;
pub mod ranking;
pub mod routing;

// Re-export commonly used types for convenience
pub use backends::{BackendError, FixedResults, SearchBackend, SearchFuture};
pub use self::core::{
    Channel, DampingConfig, EmbeddingConfig, EmbeddingProvider, EngineConfig, FixedLengthVector,
    MaintenanceConfig, MemoryConfig, MemoryMetadata, MemoryRecord, PipelineStep, Query,
    RankingConfig, RecordId, ResonanceConfig, ResonanceError, ResonanceResult, ResultRecord,
    RouterConfig, SessionId, StorageConfig, UserId,
};
pub use damping::{ObservationDamping, UserState};
pub use embedding::{EmbedFuture, Embedder, OllamaEmbedder, ZeroEmbedder};
pub use engine::{EngineBackends, ResonanceEngine};
pub use integrity::{
    DurableStore, IntegrityManager, NoopStore, Operation, SessionSnapshot, SessionState,
    SessionStats, SqliteOperationStore, StoreFuture,
};
pub use maintenance::{SessionSweeper, SweepStats};
pub use memory::MemoryBuffer;
pub use ranking::{HybridRanker, PassThroughScorer, RelevanceScorer};
pub use routing::IntentRouter;
