//! Thought normalizer adapters.

pub mod openai;
pub mod static_map;

pub use openai::{OpenAiNormalizerConfig, OpenAiThoughtNormalizer};
pub use static_map::{IntentPattern, IntentTable, StaticNormalizer};
