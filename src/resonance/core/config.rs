//! Configuration for the resonance subsystem.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::resonance::core::errors::{ResonanceError, ResonanceResult};

/// Top-level configuration for the resonance engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResonanceConfig {
    /// Intent routing settings.
    pub router: RouterConfig,
    /// Memory buffer settings.
    pub memory: MemoryConfig,
    /// Ranking settings.
    pub ranking: RankingConfig,
    /// Observation damping settings.
    pub damping: DampingConfig,
    /// Embedding model settings.
    pub embedding: EmbeddingConfig,
    /// Durable storage settings.
    pub storage: StorageConfig,
    /// Orchestration timeouts.
    pub engine: EngineConfig,
    /// Session table maintenance.
    pub maintenance: MaintenanceConfig,
}

impl ResonanceConfig {
    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ResonanceResult<()> {
        if !self.router.lexical_threshold.is_finite() {
            return Err(ResonanceError::Config(
                "router.lexical_threshold must be finite".to_string(),
            ));
        }

        if !self.damping.factor.is_finite() {
            return Err(ResonanceError::Config(
                "damping.factor must be finite".to_string(),
            ));
        }

        if self.memory.capacity == Some(0) {
            return Err(ResonanceError::Config(
                "memory.capacity must be > 0 when set".to_string(),
            ));
        }

        if self.ranking.max_results == Some(0) {
            return Err(ResonanceError::Config(
                "ranking.max_results must be > 0 when set".to_string(),
            ));
        }

        if self.embedding.ndims == 0 {
            return Err(ResonanceError::Config(
                "embedding.ndims must be > 0".to_string(),
            ));
        }

        if self.maintenance.sweep_interval_seconds == 0 {
            return Err(ResonanceError::Config(
                "maintenance.sweep_interval_seconds must be > 0".to_string(),
            ));
        }

        if !is_sql_identifier(&self.storage.operations_table) {
            return Err(ResonanceError::Config(format!(
                "storage.operations_table {:?} is not a valid table name",
                self.storage.operations_table
            )));
        }

        if let Some(base_url) = &self.embedding.base_url {
            Url::parse(base_url)?;
        }

        Ok(())
    }

    /// Load a configuration from a JSON file.
    ///
    /// Missing sections fall back to their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> ResonanceResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|err| {
            ResonanceError::Config(format!("cannot read {}: {err}", path.as_ref().display()))
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Overlay `RESONANCE_*` environment variables on top of this configuration.
    ///
    /// # Errors
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn with_env_overrides(self) -> ResonanceResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ResonanceResult<Self> {
        if let Some(value) = parse_var(&lookup, "RESONANCE_MAX_LEXICAL_TOKENS")? {
            self.router.max_lexical_tokens = value;
        }
        if let Some(value) = parse_var(&lookup, "RESONANCE_LEXICAL_THRESHOLD")? {
            self.router.lexical_threshold = value;
        }
        if let Some(value) = parse_var(&lookup, "RESONANCE_MEMORY_CAPACITY")? {
            self.memory.capacity = Some(value);
        }
        if let Some(value) = parse_var(&lookup, "RESONANCE_MAX_RESULTS")? {
            self.ranking.max_results = Some(value);
        }
        if let Some(value) = parse_var(&lookup, "RESONANCE_DAMPING_FACTOR")? {
            self.damping.factor = value;
        }
        if let Some(value) = lookup("RESONANCE_EMBEDDING_PROVIDER") {
            self.embedding.provider = value.parse()?;
        }
        if let Some(value) = lookup("RESONANCE_EMBEDDING_MODEL") {
            self.embedding.model = value;
        }
        if let Some(value) = parse_var(&lookup, "RESONANCE_EMBEDDING_NDIMS")? {
            self.embedding.ndims = value;
        }
        if let Some(value) = lookup("RESONANCE_OLLAMA_URL") {
            self.embedding.base_url = Some(value);
        }
        if let Some(value) = lookup("RESONANCE_SQLITE_PATH") {
            self.storage.sqlite_path = Some(PathBuf::from(value));
        }
        if let Some(value) = parse_var(&lookup, "RESONANCE_BACKEND_TIMEOUT_MS")? {
            self.engine.backend_timeout_ms = Some(value);
        }
        if let Some(value) = parse_var(&lookup, "RESONANCE_EMBEDDING_TIMEOUT_MS")? {
            self.engine.embedding_timeout_ms = Some(value);
        }
        if let Some(value) = parse_var(&lookup, "RESONANCE_STORE_TIMEOUT_MS")? {
            self.engine.store_timeout_ms = Some(value);
        }
        Ok(self)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> ResonanceResult<Option<T>> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|_| ResonanceError::Config(format!("{key} has an invalid value: {raw:?}")))
        })
        .transpose()
}

pub(crate) fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(first) if first.is_ascii_alphabetic() || first == '_')
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Intent routing settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Queries with strictly fewer whitespace-delimited tokens route to the lexical channel.
    pub max_lexical_tokens: usize,
    /// Confidence threshold reserved for a learned classifier (not used by the token rule).
    pub lexical_threshold: f64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_lexical_tokens: 4,
            lexical_threshold: 0.85,
        }
    }
}

/// Memory buffer settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Keep only the most recent records; `None` keeps everything.
    pub capacity: Option<usize>,
}

/// Ranking settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Truncate ranked output; `None` returns every result.
    pub max_results: Option<usize>,
}

/// Observation damping settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DampingConfig {
    /// Fraction removed from each signal; values are scaled by `1 - factor`.
    pub factor: f64,
}

impl Default for DampingConfig {
    fn default() -> Self {
        Self { factor: 0.1 }
    }
}

/// Embedding provider selector.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Zero vectors of the configured dimension.
    Zero,
    /// Ollama embedding model through Rig.
    Ollama,
}

impl FromStr for EmbeddingProvider {
    type Err = ResonanceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zero" => Ok(Self::Zero),
            "ollama" => Ok(Self::Ollama),
            other => Err(ResonanceError::Config(format!(
                "unknown embedding provider {other:?}"
            ))),
        }
    }
}

/// Embedding model settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which embedder to build.
    pub provider: EmbeddingProvider,
    /// Ollama embedding model name.
    pub model: String,
    /// Embedding vector dimensions.
    pub ndims: usize,
    /// Optional custom base URL.
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Zero,
            model: "nomic-embed-text".to_string(),
            ndims: 768,
            base_url: None,
        }
    }
}

/// Durable storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `SQLite` database path; `None` commits without durable writes.
    pub sqlite_path: Option<PathBuf>,
    /// Table receiving committed operations.
    pub operations_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: None,
            operations_table: "resonance_operations".to_string(),
        }
    }
}

/// Orchestration timeouts.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on a single backend search, in milliseconds.
    pub backend_timeout_ms: Option<u64>,
    /// Upper bound on a single embedding call, in milliseconds.
    pub embedding_timeout_ms: Option<u64>,
    /// Upper bound on persisting a commit to the durable store, in milliseconds.
    pub store_timeout_ms: Option<u64>,
}

impl EngineConfig {
    /// Backend timeout as a `Duration`.
    #[must_use]
    pub fn backend_timeout(&self) -> Option<Duration> {
        self.backend_timeout_ms.map(Duration::from_millis)
    }

    /// Embedding timeout as a `Duration`.
    #[must_use]
    pub fn embedding_timeout(&self) -> Option<Duration> {
        self.embedding_timeout_ms.map(Duration::from_millis)
    }

    /// Durable store timeout as a `Duration`.
    #[must_use]
    pub fn store_timeout(&self) -> Option<Duration> {
        self.store_timeout_ms.map(Duration::from_millis)
    }
}

/// Session table maintenance settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Whether the background sweeper runs.
    pub enabled: bool,
    /// Interval between sweeps (in seconds).
    pub sweep_interval_seconds: u64,
    /// How long committed or rolled-back sessions stay queryable (in seconds).
    pub finished_retention_seconds: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_seconds: 60,
            finished_retention_seconds: 300,
        }
    }
}
