//! Local hashed bag-of-words embedder.
//!
//! Tokens are lowercased, hashed with SHA-256 and folded into a fixed number
//! of buckets, then the vector is L2-normalized. Deterministic and offline;
//! texts sharing most of their tokens land close together under cosine
//! similarity.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::domain::errors::{GuardError, GuardResult};
use crate::domain::ports::EmbeddingProvider;

#[derive(Debug, Clone)]
pub struct HashedBagOfWordsEmbedder {
    dimension: usize,
}

impl HashedBagOfWordsEmbedder {
    pub fn new(dimension: usize) -> GuardResult<Self> {
        if dimension == 0 {
            return Err(GuardError::Configuration(
                "hashed embedder dimension must be > 0".to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    fn bucket(&self, token: &str) -> (usize, f32) {
        let digest = Sha256::digest(token.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let value = u64::from_le_bytes(head);
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        ((value % self.dimension as u64) as usize, sign)
    }

    /// Synchronous embedding, shared by the async port and tests.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let (index, sign) = self.bucket(&token.to_lowercase());
            vector[index] += sign;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashedBagOfWordsEmbedder {
    fn name(&self) -> &'static str {
        "hashed_bow"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> GuardResult<Vec<f32>> {
        Ok(self.embed_text(text))
    }
}
