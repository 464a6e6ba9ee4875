//! Hybrid ranking over lexical and vector results.
//!
//! Both lists are concatenated (lexical first), scored, and sorted by score
//! descending with a stable sort: records with equal scores keep their
//! concatenated order. The default scorer passes the backend score through, so
//! the default ranking is a plain sort.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::resonance::core::config::RankingConfig;
use crate::resonance::core::errors::ResonanceResult;
use crate::resonance::core::record::ResultRecord;

/// Query-aware scoring hook (e.g. a cross-encoder).
pub trait RelevanceScorer: Send + Sync {
    /// Score `record` for `query`; higher is more relevant. Must be finite.
    fn score(&self, query: &str, record: &ResultRecord) -> f64;
}

/// Scorer returning the backend score unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassThroughScorer;

impl RelevanceScorer for PassThroughScorer {
    fn score(&self, _query: &str, record: &ResultRecord) -> f64 {
        record.score()
    }
}

/// Merges and orders results from both channels.
#[derive(Clone)]
pub struct HybridRanker {
    scorer: Arc<dyn RelevanceScorer>,
    max_results: Option<usize>,
}

impl fmt::Debug for HybridRanker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridRanker")
            .field("max_results", &self.max_results)
            .finish_non_exhaustive()
    }
}

impl Default for HybridRanker {
    fn default() -> Self {
        Self::new(&RankingConfig::default())
    }
}

impl HybridRanker {
    /// Create a pass-through ranker.
    #[must_use]
    pub fn new(config: &RankingConfig) -> Self {
        Self {
            scorer: Arc::new(PassThroughScorer),
            max_results: config.max_results,
        }
    }

    /// Replace the scorer.
    #[must_use]
    pub fn with_scorer(mut self, scorer: Arc<dyn RelevanceScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    /// Rank the combined results for `query`.
    ///
    /// # Errors
    /// Returns `ResonanceError::Ranking` if the scorer yields a non-finite score.
    pub fn rank(
        &self,
        query: &str,
        lexical: Vec<ResultRecord>,
        vector: Vec<ResultRecord>,
    ) -> ResonanceResult<Vec<ResultRecord>> {
        let mut ranked = Vec::with_capacity(lexical.len() + vector.len());
        for record in lexical.into_iter().chain(vector) {
            let score = self.scorer.score(query, &record);
            ranked.push(record.with_score(score)?);
        }

        // Scores are finite here, so `partial_cmp` is total; `-0.0` ties with `0.0`.
        ranked.sort_by(|a, b| b.score().partial_cmp(&a.score()).unwrap_or(Ordering::Equal));

        if let Some(max_results) = self.max_results {
            ranked.truncate(max_results);
        }

        debug!(count = ranked.len(), "Ranked results");
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resonance::core::channel::Channel;
    use crate::resonance::core::errors::ResonanceError;

    fn record(document: &str, score: f64, channel: Channel) -> ResultRecord {
        ResultRecord::new(document, score, channel).unwrap()
    }

    fn documents(records: &[ResultRecord]) -> Vec<&str> {
        records.iter().map(ResultRecord::document).collect()
    }

    #[test]
    fn test_stable_tie_break() {
        let ranker = HybridRanker::default();
        let lexical = vec![
            record("A", 0.5, Channel::Lexical),
            record("B", 0.9, Channel::Lexical),
            record("C", 0.5, Channel::Lexical),
        ];

        let ranked = ranker.rank("q", lexical, Vec::new()).unwrap();
        assert_eq!(documents(&ranked), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_ties_across_channels_keep_lexical_first() {
        let ranker = HybridRanker::default();
        let ranked = ranker
            .rank(
                "q",
                vec![record("lex", 0.7, Channel::Lexical)],
                vec![
                    record("vec-high", 0.8, Channel::Vector),
                    record("vec", 0.7, Channel::Vector),
                ],
            )
            .unwrap();
        assert_eq!(documents(&ranked), vec!["vec-high", "lex", "vec"]);
    }

    #[test]
    fn test_unscored_records_rank_last() {
        let ranker = HybridRanker::default();
        let ranked = ranker
            .rank(
                "q",
                vec![ResultRecord::unscored("none", Channel::Lexical)],
                vec![record("some", 0.1, Channel::Vector)],
            )
            .unwrap();
        assert_eq!(documents(&ranked), vec!["some", "none"]);
    }

    #[test]
    fn test_negative_zero_ties_with_zero() {
        let ranker = HybridRanker::default();
        let ranked = ranker
            .rank(
                "q",
                vec![record("neg", -0.0, Channel::Lexical)],
                vec![record("pos", 0.0, Channel::Vector)],
            )
            .unwrap();
        assert_eq!(documents(&ranked), vec!["neg", "pos"]);
    }

    #[test]
    fn test_empty_inputs() {
        let ranker = HybridRanker::default();
        assert!(ranker.rank("", Vec::new(), Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_max_results_truncates() {
        let ranker = HybridRanker::new(&RankingConfig {
            max_results: Some(1),
        });
        let ranked = ranker
            .rank(
                "q",
                vec![record("a", 0.2, Channel::Lexical)],
                vec![record("b", 0.4, Channel::Vector)],
            )
            .unwrap();
        assert_eq!(documents(&ranked), vec!["b"]);
    }

    struct LengthScorer;

    impl RelevanceScorer for LengthScorer {
        fn score(&self, query: &str, record: &ResultRecord) -> f64 {
            let overlap = record
                .document()
                .split_whitespace()
                .filter(|word| query.contains(word))
                .count();
            f64::from(u32::try_from(overlap).unwrap_or(u32::MAX))
        }
    }

    #[test]
    fn test_custom_scorer_rescores() {
        let ranker = HybridRanker::default().with_scorer(Arc::new(LengthScorer));
        let ranked = ranker
            .rank(
                "rust ownership rules",
                vec![
                    record("python tips", 0.9, Channel::Lexical),
                    record("rust ownership", 0.1, Channel::Lexical),
                ],
                Vec::new(),
            )
            .unwrap();
        assert_eq!(documents(&ranked), vec!["rust ownership", "python tips"]);
        assert!((ranked[0].score() - 2.0).abs() < f64::EPSILON);
    }

    struct NanScorer;

    impl RelevanceScorer for NanScorer {
        fn score(&self, _query: &str, _record: &ResultRecord) -> f64 {
            f64::NAN
        }
    }

    #[test]
    fn test_non_finite_scorer_output_is_ranking_failure() {
        let ranker = HybridRanker::default().with_scorer(Arc::new(NanScorer));
        let err = ranker
            .rank("q", vec![record("a", 0.5, Channel::Lexical)], Vec::new())
            .unwrap_err();
        assert!(matches!(err, ResonanceError::Ranking { ref document, .. } if document == "a"));
    }
}
