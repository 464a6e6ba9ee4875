//! Embedding model wrappers.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use reqwest::Client as ReqwestClient;
use rig::client::{EmbeddingsClient, Nothing};
use rig::embeddings::EmbeddingModel;
use rig::providers::ollama;

use crate::resonance::core::config::{EmbeddingConfig, EmbeddingProvider};
use crate::resonance::core::errors::{ResonanceError, ResonanceResult};

/// Boxed future type for embedder operations.
pub type EmbedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait abstraction over embedding models.
///
/// Implementations must be deterministic for a given model and input.
pub trait Embedder: Send + Sync {
    /// Embed a single text string.
    ///
    /// # Errors
    /// Returns `ResonanceError::Embedding` if the embedding request fails.
    fn embed_text<'a>(&'a self, text: &'a str) -> EmbedFuture<'a, ResonanceResult<Vec<f64>>>;
    /// Return embedding dimensionality.
    fn ndims(&self) -> usize;
}

/// Embedder returning a zero vector for every input.
///
/// Stand-in for deployments without an embedding model: records still carry a
/// vector of the declared dimension.
#[derive(Clone, Copy, Debug)]
pub struct ZeroEmbedder {
    ndims: usize,
}

impl ZeroEmbedder {
    /// Create a zero embedder with `ndims` dimensions.
    #[must_use]
    pub const fn new(ndims: usize) -> Self {
        Self { ndims }
    }
}

impl Embedder for ZeroEmbedder {
    fn embed_text<'a>(&'a self, _text: &'a str) -> EmbedFuture<'a, ResonanceResult<Vec<f64>>> {
        let ndims = self.ndims;
        Box::pin(async move { Ok(vec![0.0; ndims]) })
    }

    fn ndims(&self) -> usize {
        self.ndims
    }
}

type OllamaEmbeddingModel = ollama::EmbeddingModel<ReqwestClient>;

/// Ollama embedder using Rig provider.
#[derive(Clone)]
pub struct OllamaEmbedder {
    model: OllamaEmbeddingModel,
    ndims: usize,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder from config.
    ///
    /// # Errors
    /// Returns an error if the base URL is invalid or the client cannot be built.
    pub fn new(config: &EmbeddingConfig) -> ResonanceResult<Self> {
        let builder = ollama::Client::<ReqwestClient>::builder().api_key(Nothing);
        let builder = if let Some(base_url) = &config.base_url {
            builder.base_url(base_url)
        } else {
            builder
        };
        let client = builder
            .build()
            .map_err(|err| ResonanceError::Config(format!("ollama client: {err}")))?;
        let model = client.embedding_model_with_ndims(config.model.clone(), config.ndims);
        Ok(Self {
            model,
            ndims: config.ndims,
        })
    }
}

impl Embedder for OllamaEmbedder {
    fn embed_text<'a>(&'a self, text: &'a str) -> EmbedFuture<'a, ResonanceResult<Vec<f64>>> {
        Box::pin(async move {
            self.model
                .embed_text(text)
                .await
                .map(|embedding| embedding.vec)
                .map_err(|err| ResonanceError::Embedding {
                    text_len: text.len(),
                    reason: err.to_string(),
                })
        })
    }

    fn ndims(&self) -> usize {
        self.ndims
    }
}

/// Build the embedder selected by configuration.
///
/// # Errors
/// Returns an error if the selected embedder cannot be initialized.
pub fn build_embedder(config: &EmbeddingConfig) -> ResonanceResult<Arc<dyn Embedder>> {
    Ok(match config.provider {
        EmbeddingProvider::Zero => Arc::new(ZeroEmbedder::new(config.ndims)),
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbedder::new(config)?),
    })
}
