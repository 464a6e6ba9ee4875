//! Resonance engine orchestration.

use std::future::{Future, pending};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::resonance::backends::{BackendError, SearchBackend};
use crate::resonance::core::channel::Channel;
use crate::resonance::core::config::ResonanceConfig;
use crate::resonance::core::errors::{PipelineStep, ResonanceError, ResonanceResult};
use crate::resonance::core::ids::{SessionId, UserId};
use crate::resonance::core::record::{MemoryMetadata, Query, ResultRecord};
use crate::resonance::damping::ObservationDamping;
use crate::resonance::embedding::{Embedder, build_embedder};
use crate::resonance::engine::guard::SessionGuard;
use crate::resonance::integrity::{DurableStore, IntegrityManager, Operation, build_store};
use crate::resonance::memory::MemoryBuffer;
use crate::resonance::ranking::{HybridRanker, RelevanceScorer};
use crate::resonance::routing::IntentRouter;

/// Collaborators the engine dispatches to.
pub struct EngineBackends {
    /// Backend serving the lexical channel.
    pub lexical: Arc<dyn SearchBackend>,
    /// Backend serving the vector channel.
    pub vector: Arc<dyn SearchBackend>,
    /// Embedding model for memory records.
    pub embedder: Arc<dyn Embedder>,
    /// Durable store receiving committed operations.
    pub store: Arc<dyn DurableStore>,
    /// Relevance scorer for the ranker; the backend score is kept when `None`.
    pub scorer: Option<Arc<dyn RelevanceScorer>>,
}

impl EngineBackends {
    /// Pair the given search backends with the embedder and store selected by `config`.
    ///
    /// # Errors
    /// Returns an error if the embedder or the store cannot be initialized.
    pub async fn with_search(
        lexical: Arc<dyn SearchBackend>,
        vector: Arc<dyn SearchBackend>,
        config: &ResonanceConfig,
    ) -> ResonanceResult<Self> {
        let embedder = build_embedder(&config.embedding)?;
        let store = build_store(&config.storage).await?;

        Ok(Self {
            lexical,
            vector,
            embedder,
            store,
            scorer: None,
        })
    }

    /// Rank results with `scorer` instead of the backend score.
    #[must_use]
    pub fn with_scorer(mut self, scorer: Arc<dyn RelevanceScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }
}

/// Routes, searches, ranks, and remembers a query inside one session.
pub struct ResonanceEngine {
    config: ResonanceConfig,
    router: IntentRouter,
    lexical: Arc<dyn SearchBackend>,
    vector: Arc<dyn SearchBackend>,
    ranker: HybridRanker,
    damping: ObservationDamping,
    memory: Arc<MemoryBuffer>,
    integrity: Arc<IntegrityManager>,
}

impl ResonanceEngine {
    /// Create a new engine.
    ///
    /// # Errors
    /// Returns `ResonanceError::Config` if the configuration is invalid or the
    /// embedder's dimensionality differs from `embedding.ndims`.
    pub fn new(config: ResonanceConfig, backends: EngineBackends) -> ResonanceResult<Self> {
        config.validate()?;
        let router = IntentRouter::new(&config.router)?;
        let damping = ObservationDamping::from_config(&config.damping)?;
        let mut ranker = HybridRanker::new(&config.ranking);
        if let Some(scorer) = backends.scorer {
            ranker = ranker.with_scorer(scorer);
        }
        let memory = MemoryBuffer::new(
            backends.embedder,
            &config.embedding,
            &config.memory,
            &config.engine,
        )?;
        let integrity =
            IntegrityManager::new(backends.store).with_store_timeout(config.engine.store_timeout());

        info!(
            lexical = backends.lexical.name(),
            vector = backends.vector.name(),
            ndims = memory.ndims(),
            "Resonance engine ready"
        );

        Ok(Self {
            config,
            router,
            lexical: backends.lexical,
            vector: backends.vector,
            ranker,
            damping,
            memory: Arc::new(memory),
            integrity: Arc::new(integrity),
        })
    }

    /// Answer a query with ranked results.
    ///
    /// The query is routed to one channel, searched, ranked, and remembered in a
    /// single session. The memory record becomes visible only once the session
    /// commits; on any failure the session is rolled back and the error returned.
    ///
    /// # Errors
    /// Returns the error of the failing step (see [`ResonanceError::step`]), or
    /// `ResonanceError::RollbackFailed` if the rollback failed too.
    pub async fn respond(
        &self,
        query: &str,
        user_id: &UserId,
    ) -> ResonanceResult<Vec<ResultRecord>> {
        self.respond_until(query, user_id, pending::<()>()).await
    }

    /// Like [`Self::respond`], abandoning the request when `cancel` resolves first.
    ///
    /// Cancellation is honored up to the commit. Once the commit has started it
    /// runs to completion.
    ///
    /// # Errors
    /// Returns `ResonanceError::Cancelled` if `cancel` wins, otherwise as [`Self::respond`].
    pub async fn respond_until<C>(
        &self,
        query: &str,
        user_id: &UserId,
        cancel: C,
    ) -> ResonanceResult<Vec<ResultRecord>>
    where
        C: Future<Output = ()>,
    {
        let query = Query::new(query, user_id.clone());
        let channel = self.router.route(query.text());
        let session_id = self.integrity.begin(user_id.clone());
        let mut guard = SessionGuard::arm(Arc::clone(&self.integrity), session_id);

        let outcome = tokio::select! {
            biased;
            () = cancel => Err(ResonanceError::Cancelled),
            result = self.run_session(session_id, &query, channel) => result,
        };

        let ranked = match outcome {
            Ok(ranked) => ranked,
            Err(err) => {
                let err = abort_session(&self.integrity, session_id, err).await;
                guard.disarm();
                return Err(err);
            }
        };

        guard.disarm();
        self.commit(session_id).await?;

        debug!(%session_id, %channel, results = ranked.len(), "Responded");
        Ok(ranked)
    }

    async fn run_session(
        &self,
        session_id: SessionId,
        query: &Query,
        channel: Channel,
    ) -> ResonanceResult<Vec<ResultRecord>> {
        let results = self.search(channel, query).await?;
        let (lexical, vector) = match channel {
            Channel::Lexical => (results, Vec::new()),
            Channel::Vector => (Vec::new(), results),
        };
        let ranked = self.ranker.rank(query.text(), lexical, vector)?;

        let metadata = MemoryMetadata::new(channel, query.user_id().clone()).with_session(session_id);
        let record = self.memory.prepare(query.text(), metadata).await?;
        self.integrity
            .stage(session_id, Operation::AppendMemory(record))
            .await
            .map_err(|err| err.at_step(PipelineStep::Store))?;

        Ok(ranked)
    }

    async fn search(&self, channel: Channel, query: &Query) -> ResonanceResult<Vec<ResultRecord>> {
        let backend = match channel {
            Channel::Lexical => &self.lexical,
            Channel::Vector => &self.vector,
        };

        let outcome = match self.config.engine.backend_timeout() {
            Some(limit) => tokio::time::timeout(limit, backend.search(query))
                .await
                .unwrap_or_else(|_| Err(BackendError::Timeout(limit))),
            None => backend.search(query).await,
        };

        let results = outcome.map_err(|source| ResonanceError::Backend { channel, source })?;
        debug!(%channel, backend = backend.name(), hits = results.len(), "Search complete");

        Ok(results
            .into_iter()
            .map(|record| record.with_channel(channel))
            .collect())
    }

    /// Commit on a detached task so a dropped caller cannot interrupt it halfway.
    async fn commit(&self, session_id: SessionId) -> ResonanceResult<()> {
        let integrity = Arc::clone(&self.integrity);
        let memory = Arc::clone(&self.memory);

        tokio::spawn(async move {
            let operations = match integrity.commit(session_id).await {
                Ok(operations) => operations,
                Err(err) => return Err(abort_session(&integrity, session_id, err).await),
            };
            for operation in operations {
                match operation {
                    Operation::AppendMemory(record) => memory.append(record).await,
                }
            }
            Ok(())
        })
        .await?
    }

    /// Intent router.
    #[must_use]
    pub const fn router(&self) -> &IntentRouter {
        &self.router
    }

    /// Hybrid ranker.
    #[must_use]
    pub const fn ranker(&self) -> &HybridRanker {
        &self.ranker
    }

    /// Observation damping; independent of [`Self::respond`].
    #[must_use]
    pub const fn damping(&self) -> &ObservationDamping {
        &self.damping
    }

    /// Memory buffer.
    #[must_use]
    pub const fn memory(&self) -> &Arc<MemoryBuffer> {
        &self.memory
    }

    /// Session manager.
    #[must_use]
    pub const fn integrity(&self) -> &Arc<IntegrityManager> {
        &self.integrity
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ResonanceConfig {
        &self.config
    }
}

/// Roll back after a failed step, returning the error to surface.
async fn abort_session(
    integrity: &IntegrityManager,
    session_id: SessionId,
    err: ResonanceError,
) -> ResonanceError {
    let step = err.step().map_or("none", PipelineStep::as_str);
    warn!(%session_id, step, error = %err, "Step failed, rolling back");

    match integrity.rollback(session_id).await {
        Ok(_) => err,
        Err(rollback) => {
            error!(%session_id, error = %rollback, "Rollback failed");
            ResonanceError::RollbackFailed {
                original: Box::new(err),
                rollback: Box::new(rollback),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::resonance::backends::{FixedResults, SearchFuture};
    use crate::resonance::embedding::{EmbedFuture, ZeroEmbedder};
    use crate::resonance::integrity::{NoopStore, SessionState, SqliteOperationStore, StoreFuture};

    const NDIMS: usize = 8;

    struct FailingBackend {
        calls: AtomicUsize,
    }

    impl SearchBackend for FailingBackend {
        fn search<'a>(
            &'a self,
            _query: &'a Query,
        ) -> SearchFuture<'a, Result<Vec<ResultRecord>, BackendError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(BackendError::Unavailable("index offline".to_string())) })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct SlowBackend(Duration);

    impl SearchBackend for SlowBackend {
        fn search<'a>(
            &'a self,
            _query: &'a Query,
        ) -> SearchFuture<'a, Result<Vec<ResultRecord>, BackendError>> {
            let delay = self.0;
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                Ok(Vec::new())
            })
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    struct BrokenEmbedder;

    impl Embedder for BrokenEmbedder {
        fn embed_text<'a>(&'a self, text: &'a str) -> EmbedFuture<'a, ResonanceResult<Vec<f64>>> {
            let text_len = text.len();
            Box::pin(async move {
                Err(ResonanceError::Embedding {
                    text_len,
                    reason: "model not loaded".to_string(),
                })
            })
        }

        fn ndims(&self) -> usize {
            NDIMS
        }
    }

    struct NanScorer;

    impl RelevanceScorer for NanScorer {
        fn score(&self, _query: &str, _record: &ResultRecord) -> f64 {
            f64::NAN
        }
    }

    struct ReverseScorer;

    impl RelevanceScorer for ReverseScorer {
        fn score(&self, _query: &str, record: &ResultRecord) -> f64 {
            -record.score()
        }
    }

    struct HungStore;

    impl DurableStore for HungStore {
        fn persist<'a>(
            &'a self,
            _session_id: SessionId,
            _user_id: &'a UserId,
            _operations: &'a [Operation],
        ) -> StoreFuture<'a, ResonanceResult<()>> {
            Box::pin(pending())
        }

        fn name(&self) -> &'static str {
            "hung"
        }
    }

    fn user() -> UserId {
        UserId::new("seema@threshold").unwrap()
    }

    fn test_config() -> ResonanceConfig {
        let mut config = ResonanceConfig::default();
        config.embedding.ndims = NDIMS;
        config
    }

    fn backends(lexical: Arc<dyn SearchBackend>, vector: Arc<dyn SearchBackend>) -> EngineBackends {
        EngineBackends {
            lexical,
            vector,
            embedder: Arc::new(ZeroEmbedder::new(NDIMS)),
            store: Arc::new(NoopStore),
            scorer: None,
        }
    }

    fn demo_engine() -> ResonanceEngine {
        ResonanceEngine::new(
            test_config(),
            backends(
                Arc::new(FixedResults::lexical_demo().unwrap()),
                Arc::new(FixedResults::vector_demo().unwrap()),
            ),
        )
        .unwrap()
    }

    fn failing_lexical_engine() -> ResonanceEngine {
        ResonanceEngine::new(
            test_config(),
            backends(
                Arc::new(FailingBackend {
                    calls: AtomicUsize::new(0),
                }),
                Arc::new(FixedResults::vector_demo().unwrap()),
            ),
        )
        .unwrap()
    }

    async fn wait_for_rollbacks(engine: &ResonanceEngine, expected: usize) {
        for _ in 0..100 {
            if engine.integrity().stats().rolled_back == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(engine.integrity().stats().rolled_back, expected);
    }

    #[tokio::test]
    async fn test_short_query_returns_lexical_result_and_remembers_it() {
        let engine = demo_engine();

        let results = engine.respond("define resonance", &user()).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document(), "Lexical match result");
        assert!((results[0].score() - 0.6).abs() < f64::EPSILON);
        assert_eq!(results[0].channel(), Channel::Lexical);

        let records = engine.memory().records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].query, "define resonance");
        assert_eq!(records[0].metadata.channel, Channel::Lexical);
        assert_eq!(records[0].metadata.user_id, user());
        assert_eq!(records[0].embedding.len(), NDIMS);

        let stats = engine.integrity().stats();
        assert_eq!(stats.committed, 1);
        assert_eq!(stats.active, 0);
    }

    #[tokio::test]
    async fn test_long_query_goes_to_vector_backend() {
        let engine = demo_engine();

        let results = engine
            .respond("what is the capital of France", &user())
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document(), "Vector match result");
        let records = engine.memory().records().await;
        assert_eq!(records[0].metadata.channel, Channel::Vector);
    }

    #[tokio::test]
    async fn test_backend_failure_rolls_back_and_propagates() {
        let engine = failing_lexical_engine();

        let err = engine.respond("hi", &user()).await.unwrap_err();

        assert!(matches!(
            err,
            ResonanceError::Backend {
                channel: Channel::Lexical,
                source: BackendError::Unavailable(_),
            }
        ));
        assert_eq!(err.step(), Some(PipelineStep::Search));
        assert!(engine.memory().is_empty().await);
        let stats = engine.integrity().stats();
        assert_eq!(stats.rolled_back, 1);
        assert_eq!(stats.committed, 0);
    }

    #[tokio::test]
    async fn test_only_the_routed_backend_is_called() {
        let failing = Arc::new(FailingBackend {
            calls: AtomicUsize::new(0),
        });
        let engine = ResonanceEngine::new(
            test_config(),
            backends(
                Arc::new(FixedResults::lexical_demo().unwrap()),
                Arc::clone(&failing) as Arc<dyn SearchBackend>,
            ),
        )
        .unwrap();

        engine.respond("hi", &user()).await.unwrap();
        assert_eq!(failing.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_backend_timeout_is_a_backend_failure() {
        let mut config = test_config();
        config.engine.backend_timeout_ms = Some(20);
        let engine = ResonanceEngine::new(
            config,
            backends(
                Arc::new(SlowBackend(Duration::from_secs(5))),
                Arc::new(FixedResults::vector_demo().unwrap()),
            ),
        )
        .unwrap();

        let err = engine.respond("hi", &user()).await.unwrap_err();

        assert!(matches!(
            err,
            ResonanceError::Backend {
                source: BackendError::Timeout(_),
                ..
            }
        ));
        assert!(err.is_retryable());
        assert_eq!(engine.integrity().stats().rolled_back, 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_attributed_to_store_step() {
        let engine = ResonanceEngine::new(
            test_config(),
            EngineBackends {
                lexical: Arc::new(FixedResults::lexical_demo().unwrap()),
                vector: Arc::new(FixedResults::vector_demo().unwrap()),
                embedder: Arc::new(BrokenEmbedder),
                store: Arc::new(NoopStore),
                scorer: None,
            },
        )
        .unwrap();

        let err = engine.respond("hi", &user()).await.unwrap_err();

        assert!(matches!(err, ResonanceError::Embedding { text_len: 2, .. }));
        assert_eq!(err.step(), Some(PipelineStep::Store));
        assert!(engine.memory().is_empty().await);
        assert_eq!(engine.integrity().stats().rolled_back, 1);
    }

    #[tokio::test]
    async fn test_cancellation_rolls_back() {
        let engine = ResonanceEngine::new(
            test_config(),
            backends(
                Arc::new(SlowBackend(Duration::from_secs(5))),
                Arc::new(FixedResults::vector_demo().unwrap()),
            ),
        )
        .unwrap();

        let err = engine
            .respond_until("hi", &user(), tokio::time::sleep(Duration::from_millis(20)))
            .await
            .unwrap_err();

        assert!(matches!(err, ResonanceError::Cancelled));
        assert!(engine.memory().is_empty().await);
        assert_eq!(engine.integrity().stats().rolled_back, 1);
    }

    #[tokio::test]
    async fn test_dropped_response_rolls_back() {
        let engine = ResonanceEngine::new(
            test_config(),
            backends(
                Arc::new(SlowBackend(Duration::from_secs(5))),
                Arc::new(FixedResults::vector_demo().unwrap()),
            ),
        )
        .unwrap();

        let user = user();
        let outcome =
            tokio::time::timeout(Duration::from_millis(20), engine.respond("hi", &user)).await;
        assert!(outcome.is_err());

        wait_for_rollbacks(&engine, 1).await;
        assert!(engine.memory().is_empty().await);
        assert_eq!(engine.integrity().stats().active, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_responses_are_isolated() {
        let engine = Arc::new(demo_engine());

        let tasks = (0..16).map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let user = UserId::new(format!("user-{i}")).unwrap();
                let query = if i % 2 == 0 {
                    "define resonance"
                } else {
                    "what is the capital of France"
                };
                engine.respond(query, &user).await
            })
        });

        for outcome in futures::future::join_all(tasks).await {
            assert_eq!(outcome.unwrap().unwrap().len(), 1);
        }

        assert_eq!(engine.memory().len().await, 16);
        let stats = engine.integrity().stats();
        assert_eq!(stats.committed, 16);
        assert_eq!(stats.total(), 16);
    }

    #[tokio::test]
    async fn test_rolled_back_sessions_persist_nothing() {
        let store = Arc::new(SqliteOperationStore::in_memory("ops").await.unwrap());
        let engine = ResonanceEngine::new(
            test_config(),
            EngineBackends {
                lexical: Arc::new(FailingBackend {
                    calls: AtomicUsize::new(0),
                }),
                vector: Arc::new(FixedResults::vector_demo().unwrap()),
                embedder: Arc::new(ZeroEmbedder::new(NDIMS)),
                store: Arc::clone(&store) as Arc<dyn DurableStore>,
                scorer: None,
            },
        )
        .unwrap();

        assert!(engine.respond("hi", &user()).await.is_err());
        assert_eq!(store.count().await.unwrap(), 0);

        engine
            .respond("what is the capital of France", &user())
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(engine.memory().len().await, 1);
    }

    #[tokio::test]
    async fn test_invalid_damping_factor_fails_at_construction() {
        let mut config = test_config();
        config.damping.factor = f64::NAN;
        let err = ResonanceEngine::new(
            config,
            backends(
                Arc::new(FixedResults::empty("lexical")),
                Arc::new(FixedResults::empty("vector")),
            ),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ResonanceError::Config(_)));
    }

    #[tokio::test]
    async fn test_session_is_terminal_after_respond() {
        let engine = failing_lexical_engine();
        engine.respond("hi", &user()).await.unwrap_err();
        engine
            .respond("a much longer vector query", &user())
            .await
            .unwrap();

        let stats = engine.integrity().stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.committed, 1);
        assert_eq!(stats.rolled_back, 1);
        assert_eq!(engine.integrity().len(), 2);
        assert!(SessionState::Committed.is_terminal());
    }

    #[test]
    fn test_embedder_dimensions_must_match_config() {
        let err = ResonanceEngine::new(
            ResonanceConfig::default(),
            backends(
                Arc::new(FixedResults::lexical_demo().unwrap()),
                Arc::new(FixedResults::vector_demo().unwrap()),
            ),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ResonanceError::Config(_)));
    }

    #[tokio::test]
    async fn test_custom_scorer_reaches_respond() {
        let lexical = FixedResults::new(
            "lexical",
            vec![
                ResultRecord::new("low", 0.2, Channel::Lexical).unwrap(),
                ResultRecord::new("high", 0.9, Channel::Lexical).unwrap(),
            ],
        );
        let engine = ResonanceEngine::new(
            test_config(),
            backends(
                Arc::new(lexical),
                Arc::new(FixedResults::vector_demo().unwrap()),
            )
            .with_scorer(Arc::new(ReverseScorer)),
        )
        .unwrap();

        let results = engine.respond("hi", &user()).await.unwrap();
        let documents: Vec<&str> = results.iter().map(ResultRecord::document).collect();
        assert_eq!(documents, vec!["low", "high"]);
    }

    #[tokio::test]
    async fn test_ranking_failure_rolls_back() {
        let engine = ResonanceEngine::new(
            test_config(),
            backends(
                Arc::new(FixedResults::lexical_demo().unwrap()),
                Arc::new(FixedResults::vector_demo().unwrap()),
            )
            .with_scorer(Arc::new(NanScorer)),
        )
        .unwrap();

        let err = engine.respond("define resonance", &user()).await.unwrap_err();

        assert!(matches!(err, ResonanceError::Ranking { .. }));
        assert_eq!(err.step(), Some(PipelineStep::Rank));
        assert!(engine.memory().is_empty().await);
        let stats = engine.integrity().stats();
        assert_eq!(stats.rolled_back, 1);
        assert_eq!(stats.committed, 0);
    }

    #[tokio::test]
    async fn test_staging_on_finished_session_is_a_store_failure() {
        let engine = demo_engine();
        let session_id = engine.integrity().begin(user());
        engine.integrity().rollback(session_id).await.unwrap();

        let query = Query::new("define resonance", user());
        let err = engine
            .run_session(session_id, &query, Channel::Lexical)
            .await
            .unwrap_err();

        assert_eq!(err.step(), Some(PipelineStep::Store));
        assert!(matches!(
            err.root(),
            ResonanceError::InvalidSessionState {
                state: Some(SessionState::RolledBack),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_hung_store_times_out_and_rolls_back() {
        let mut config = test_config();
        config.engine.store_timeout_ms = Some(20);
        let engine = ResonanceEngine::new(
            config,
            EngineBackends {
                lexical: Arc::new(FixedResults::lexical_demo().unwrap()),
                vector: Arc::new(FixedResults::vector_demo().unwrap()),
                embedder: Arc::new(ZeroEmbedder::new(NDIMS)),
                store: Arc::new(HungStore),
                scorer: None,
            },
        )
        .unwrap();

        let err = engine.respond("hi", &user()).await.unwrap_err();

        assert!(matches!(err, ResonanceError::Store(_)));
        assert_eq!(err.step(), Some(PipelineStep::Commit));
        assert!(engine.memory().is_empty().await);
        let stats = engine.integrity().stats();
        assert_eq!(stats.rolled_back, 1);
        assert_eq!(stats.active, 0);
    }
}
