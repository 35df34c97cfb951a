//! Port trait definitions (Hexagonal Architecture)
//!
//! Optional external capabilities the engine can be handed at construction:
//! - EmbeddingProvider: text -> vector, used by the insanity detector
//! - ThoughtNormalizer: thought -> canonical intent label, used by the intent guard
//!
//! Absence of either is a normal configuration, not an error path.

pub mod embedding;
pub mod thought_normalizer;

pub use embedding::EmbeddingProvider;
pub use thought_normalizer::ThoughtNormalizer;
