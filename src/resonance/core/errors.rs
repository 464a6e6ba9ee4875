//! Error types for the resonance subsystem.

use std::fmt;

use thiserror::Error;

use crate::resonance::backends::BackendError;
use crate::resonance::core::channel::Channel;
use crate::resonance::core::ids::SessionId;
use crate::resonance::integrity::session::SessionState;

/// Resonance subsystem error type.
#[derive(Debug, Error)]
pub enum ResonanceError {
    /// Commit, rollback, or staging on a missing or non-active session.
    #[error("invalid session state for {session_id}: {}", describe_state(.state))]
    InvalidSessionState {
        /// Session the call targeted.
        session_id: SessionId,
        /// Current state, or `None` if the session is unknown.
        state: Option<SessionState>,
    },
    /// A search backend failed or timed out.
    #[error("{channel} backend failure: {source}")]
    Backend {
        /// Channel whose backend failed.
        channel: Channel,
        /// Backend-specific cause.
        #[source]
        source: BackendError,
    },
    /// The embedding collaborator failed or returned a malformed vector.
    #[error("embedding failure for text of {text_len} bytes: {reason}")]
    Embedding {
        /// Length of the input text in bytes (the text itself is never carried).
        text_len: usize,
        /// Failure description.
        reason: String,
    },
    /// A malformed result record was encountered while ranking.
    #[error("ranking failure on {document:?}: {reason}")]
    Ranking {
        /// Document reference of the offending record.
        document: String,
        /// Failure description.
        reason: String,
    },
    /// Durable store failure.
    #[error("store error: {0}")]
    Store(String),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// Invalid user identifier.
    #[error("invalid user id: {0}")]
    InvalidUserId(String),
    /// The caller cancelled the request before it committed.
    #[error("request cancelled")]
    Cancelled,
    /// The step failed and the compensating rollback failed as well.
    #[error("{original} (rollback also failed: {rollback})")]
    RollbackFailed {
        /// Error that triggered the rollback.
        original: Box<ResonanceError>,
        /// Error raised by the rollback itself.
        rollback: Box<ResonanceError>,
    },
    /// An error re-attributed to the pipeline step it was raised in.
    #[error("{step} step failed: {source}")]
    AtStep {
        /// Step the error was raised in.
        step: PipelineStep,
        /// Underlying error.
        #[source]
        source: Box<ResonanceError>,
    },
    /// A spawned task panicked or was aborted.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Step of the response pipeline an error originated from.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PipelineStep {
    /// Backend search dispatch.
    Search,
    /// Hybrid ranking.
    Rank,
    /// Preparing and staging the memory record.
    Store,
    /// Session commit.
    Commit,
}

impl PipelineStep {
    /// Stable string representation (for logs).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Rank => "rank",
            Self::Store => "store",
            Self::Commit => "commit",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ResonanceError {
    /// Pipeline step this error is attributed to, if any.
    ///
    /// Compound rollback errors report the step of the original failure.
    #[must_use]
    pub fn step(&self) -> Option<PipelineStep> {
        match self {
            Self::Backend { .. } => Some(PipelineStep::Search),
            Self::Ranking { .. } => Some(PipelineStep::Rank),
            Self::Embedding { .. } => Some(PipelineStep::Store),
            Self::InvalidSessionState { .. }
            | Self::Store(_)
            | Self::Sqlite(_)
            | Self::TokioSqlite(_)
            | Self::Serialization(_)
            | Self::Task(_) => Some(PipelineStep::Commit),
            Self::AtStep { step, .. } => Some(*step),
            Self::RollbackFailed { original, .. } => original.step(),
            Self::Config(_) | Self::Url(_) | Self::InvalidUserId(_) | Self::Cancelled => None,
        }
    }

    /// Check if retrying the whole request may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Backend { source, .. } => source.is_retryable(),
            Self::AtStep { source, .. } => source.is_retryable(),
            Self::Cancelled | Self::Store(_) | Self::TokioSqlite(_) => true,
            _ => false,
        }
    }

    /// Attribute this error to `step`, keeping it as the source.
    ///
    /// Errors already attributed to `step` are returned unchanged.
    #[must_use]
    pub fn at_step(self, step: PipelineStep) -> Self {
        if self.step() == Some(step) {
            return self;
        }
        Self::AtStep {
            step,
            source: Box::new(self),
        }
    }

    /// Innermost error, looking through step attribution.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::AtStep { source, .. } => source.root(),
            _ => self,
        }
    }
}

const fn describe_state(state: &Option<SessionState>) -> &'static str {
    match state {
        Some(state) => state.as_str(),
        None => "unknown session",
    }
}

/// Convenience result alias for resonance operations.
pub type ResonanceResult<T> = Result<T, ResonanceError>;
