//! Common test utilities for integration tests
//!
//! Stub capabilities and request builders shared across test files.

#![allow(dead_code)]

use async_trait::async_trait;
use loopwarden::{CheckRequest, EmbeddingProvider, GuardError, GuardResult, ThoughtNormalizer};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Setup test logging
///
/// Initializes a tracing subscriber that writes through the test harness.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// A step with the given state page and a single-argument action.
pub fn request(page: &str, tool: &str, query: &str) -> CheckRequest {
    CheckRequest::new(json!({ "page": page })).with_action(tool, json!({ "q": query }))
}

pub fn request_with(state: Value, tool: &str, args: Value) -> CheckRequest {
    CheckRequest::new(state).with_action(tool, args)
}

/// Normalizer backed by a fixed thought -> label map; counts every call.
#[derive(Default)]
pub struct MapNormalizer {
    labels: HashMap<String, String>,
    calls: AtomicUsize,
}

impl MapNormalizer {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        Self {
            labels: pairs
                .iter()
                .map(|(thought, label)| ((*thought).to_string(), (*label).to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ThoughtNormalizer for MapNormalizer {
    fn name(&self) -> &'static str {
        "map"
    }

    async fn normalize(&self, text: &str) -> GuardResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.labels
            .get(text)
            .cloned()
            .ok_or_else(|| GuardError::NormalizationUnavailable(format!("unmapped: {text}")))
    }
}

/// Normalizer that never repeats itself: call N yields `label N`.
#[derive(Default)]
pub struct CountingNormalizer {
    calls: AtomicUsize,
}

impl CountingNormalizer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ThoughtNormalizer for CountingNormalizer {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn normalize(&self, _text: &str) -> GuardResult<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("label {n}"))
    }
}

/// Embedder that always fails.
pub struct BrokenEmbedder;

#[async_trait]
impl EmbeddingProvider for BrokenEmbedder {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn dimension(&self) -> usize {
        8
    }

    async fn embed(&self, _text: &str) -> GuardResult<Vec<f32>> {
        Err(GuardError::EmbeddingUnavailable("backend down".to_string()))
    }
}
