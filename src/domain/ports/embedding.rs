//! Embedding provider port for semantic similarity.
//!
//! Defines the trait for providers that convert action text into dense
//! vectors. The insanity detector is the only consumer; when no provider is
//! configured the detector reports unmatched.

use async_trait::async_trait;

use crate::domain::errors::GuardResult;

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name (e.g., "openai", "hashed_bow").
    fn name(&self) -> &'static str;

    /// Embedding dimension for this provider/model.
    fn dimension(&self) -> usize;

    /// Generate an embedding for a single text.
    ///
    /// Failures should be reported as `GuardError::EmbeddingUnavailable`.
    async fn embed(&self, text: &str) -> GuardResult<Vec<f32>>;
}
