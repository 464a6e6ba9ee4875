//! Embedding model modules.

pub mod embedder;

pub use embedder::{EmbedFuture, Embedder, OllamaEmbedder, ZeroEmbedder, build_embedder};
