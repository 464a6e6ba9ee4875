//! Core resonance types and identifiers.

pub mod channel;
pub mod config;
pub mod errors;
pub mod ids;
pub mod record;

pub use channel::{Channel, ChannelParseError};
pub use config::{
    DampingConfig, EmbeddingConfig, EmbeddingProvider, EngineConfig, MaintenanceConfig,
    MemoryConfig, RankingConfig, ResonanceConfig, RouterConfig, StorageConfig,
};
pub use errors::{PipelineStep, ResonanceError, ResonanceResult};
pub use ids::{RecordId, SessionId, UserId, UserIdError};
pub use record::{FixedLengthVector, MemoryMetadata, MemoryRecord, Query, ResultRecord};
