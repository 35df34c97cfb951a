//! Embedding provider adapters.

pub mod hashed;
pub mod openai;

pub use hashed::HashedBagOfWordsEmbedder;
pub use openai::{OpenAiEmbeddingConfig, OpenAiEmbeddingProvider};
