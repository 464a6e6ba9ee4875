//! Retrieval channels.
//!
//! A query is answered by exactly one channel. The channel is decided once by the
//! intent router and is carried on every result and memory record produced for it.
//!
//! Notes:
//! - The string forms (`lexical`, `vector`) are stable and used for storage,
//!   serde, and logs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Retrieval strategy selected for a query.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Exact / keyword matching (e.g. an inverted index).
    Lexical,
    /// Semantic similarity (e.g. an approximate nearest-neighbour index).
    Vector,
}

impl Channel {
    /// All channels, lexical first.
    pub const ALL: [Self; 2] = [Self::Lexical, Self::Vector];

    /// Stable string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lexical => "lexical",
            Self::Vector => "vector",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a channel tag cannot be parsed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChannelParseError {
    /// The rejected input.
    pub input: String,
}

impl fmt::Display for ChannelParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown channel {:?}", self.input)
    }
}

impl std::error::Error for ChannelParseError {}

impl FromStr for Channel {
    type Err = ChannelParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexical" => Ok(Self::Lexical),
            "vector" => Ok(Self::Vector),
            _ => Err(ChannelParseError {
                input: s.to_string(),
            }),
        }
    }
}
