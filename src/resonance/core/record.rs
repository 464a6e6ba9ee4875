//! Query, result, and memory record models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resonance::core::channel::Channel;
use crate::resonance::core::errors::{ResonanceError, ResonanceResult};
use crate::resonance::core::ids::{RecordId, SessionId, UserId};

/// A user query: immutable text plus the owning user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    text: String,
    user_id: UserId,
}

impl Query {
    /// Create a new query.
    #[must_use]
    pub fn new(text: impl Into<String>, user_id: UserId) -> Self {
        Self {
            text: text.into(),
            user_id,
        }
    }

    /// Query text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Owning user.
    #[must_use]
    pub const fn user_id(&self) -> &UserId {
        &self.user_id
    }
}

/// A single search hit from one of the channels.
///
/// Scores have no fixed range; only their relative order matters. Non-finite
/// scores are rejected at construction and on deserialization, so every
/// `ResultRecord` in circulation carries a finite score. A missing score in
/// serialized input defaults to `0.0`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawResultRecord")]
pub struct ResultRecord {
    document: String,
    score: f64,
    channel: Channel,
}

#[derive(Deserialize)]
struct RawResultRecord {
    document: String,
    #[serde(default)]
    score: f64,
    channel: Channel,
}

impl TryFrom<RawResultRecord> for ResultRecord {
    type Error = ResonanceError;

    fn try_from(raw: RawResultRecord) -> Result<Self, Self::Error> {
        Self::new(raw.document, raw.score, raw.channel)
    }
}

impl ResultRecord {
    /// Create a validated result record.
    ///
    /// # Errors
    /// Returns `ResonanceError::Ranking` if the score is NaN or infinite.
    pub fn new(document: impl Into<String>, score: f64, channel: Channel) -> ResonanceResult<Self> {
        let document = document.into();
        check_score(&document, score)?;
        Ok(Self {
            document,
            score,
            channel,
        })
    }

    /// Create a record without a score; it ranks with minimal relevance (`0.0`).
    #[must_use]
    pub fn unscored(document: impl Into<String>, channel: Channel) -> Self {
        Self {
            document: document.into(),
            score: 0.0,
            channel,
        }
    }

    /// Opaque document reference.
    #[must_use]
    pub fn document(&self) -> &str {
        &self.document
    }

    /// Relevance score (higher is more relevant).
    #[must_use]
    pub const fn score(&self) -> f64 {
        self.score
    }

    /// Channel that produced this record.
    #[must_use]
    pub const fn channel(&self) -> Channel {
        self.channel
    }

    /// Return the record re-attributed to `channel`.
    #[must_use]
    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    /// Return the record with a replacement score.
    ///
    /// # Errors
    /// Returns `ResonanceError::Ranking` if the score is NaN or infinite.
    pub fn with_score(mut self, score: f64) -> ResonanceResult<Self> {
        check_score(&self.document, score)?;
        self.score = score;
        Ok(self)
    }
}

fn check_score(document: &str, score: f64) -> ResonanceResult<()> {
    if score.is_finite() {
        return Ok(());
    }
    Err(ResonanceError::Ranking {
        document: document.to_string(),
        reason: format!("score must be finite, got {score}"),
    })
}

/// Fixed-length embedding vector.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixedLengthVector(Vec<f64>);

impl FixedLengthVector {
    /// Wrap raw values.
    #[must_use]
    pub const fn new(values: Vec<f64>) -> Self {
        Self(values)
    }

    /// Number of dimensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the vector has no dimensions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the values.
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// Metadata attached to a memory record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    /// Channel the query was routed to.
    pub channel: Channel,
    /// User who issued the query.
    pub user_id: UserId,
    /// Session that wrote the record, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl MemoryMetadata {
    /// Create metadata for a channel and user.
    #[must_use]
    pub const fn new(channel: Channel, user_id: UserId) -> Self {
        Self {
            channel,
            user_id,
            session_id: None,
        }
    }

    /// Attach the writing session.
    #[must_use]
    pub const fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }
}

/// A query remembered by the memory buffer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique record identifier.
    pub id: RecordId,
    /// Query text.
    pub query: String,
    /// Embedding of the query text.
    pub embedding: FixedLengthVector,
    /// Channel, user, and session metadata.
    pub metadata: MemoryMetadata,
    /// When the record was built.
    pub recorded_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Create a new record stamped with the current time.
    #[must_use]
    pub fn new(
        query: impl Into<String>,
        embedding: FixedLengthVector,
        metadata: MemoryMetadata,
    ) -> Self {
        Self {
            id: RecordId::new(),
            query: query.into(),
            embedding,
            metadata,
            recorded_at: Utc::now(),
        }
    }
}
