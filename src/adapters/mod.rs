//! Concrete capability providers.

pub mod embeddings;
pub mod normalizers;

use std::sync::Arc;

use crate::domain::errors::GuardResult;
use crate::domain::models::{EmbeddingBackendConfig, NormalizerBackendConfig};
use crate::domain::ports::{EmbeddingProvider, ThoughtNormalizer};

pub use embeddings::{HashedBagOfWordsEmbedder, OpenAiEmbeddingConfig, OpenAiEmbeddingProvider};
pub use normalizers::{OpenAiNormalizerConfig, OpenAiThoughtNormalizer, StaticNormalizer};

/// Build the embedding provider selected in configuration.
pub fn build_embedder(config: &EmbeddingBackendConfig) -> GuardResult<Arc<dyn EmbeddingProvider>> {
    Ok(match config {
        EmbeddingBackendConfig::OpenAi {
            base_url,
            model,
            dimension,
        } => Arc::new(OpenAiEmbeddingProvider::new(OpenAiEmbeddingConfig {
            base_url: base_url.clone(),
            model: model.clone(),
            dimension: *dimension,
            ..Default::default()
        })?),
        EmbeddingBackendConfig::HashedBagOfWords { dimension } => {
            Arc::new(HashedBagOfWordsEmbedder::new(*dimension)?)
        }
    })
}

/// Build the thought normalizer selected in configuration.
pub fn build_normalizer(
    config: &NormalizerBackendConfig,
    max_words: usize,
) -> GuardResult<Arc<dyn ThoughtNormalizer>> {
    Ok(match config {
        NormalizerBackendConfig::OpenAi { base_url, model } => {
            Arc::new(OpenAiThoughtNormalizer::new(OpenAiNormalizerConfig {
                base_url: base_url.clone(),
                model: model.clone(),
                max_words,
                ..Default::default()
            })?)
        }
    })
}
