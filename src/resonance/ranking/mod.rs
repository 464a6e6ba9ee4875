//! Ranking modules for combined search results.

pub mod hybrid_ranker;

pub use hybrid_ranker::{HybridRanker, PassThroughScorer, RelevanceScorer};
