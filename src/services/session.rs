//! Mutable state owned by one guarded session.

use std::collections::HashMap;

use serde::Serialize;

use super::failure_memory::FailureMemory;
use super::intent_guard::GuardState;
use super::intervention::OccurrenceCounters;
use super::ledger::SessionLedger;
use super::loop_scorer::ScoreState;
use super::thought_cache::{EmbeddingCache, ThoughtCache};
use crate::domain::models::{FailureRecord, GuardConfig, LoopType, ScoreVerdict, Step};

/// Everything a session remembers between `check()` calls.
#[derive(Debug)]
pub struct Session {
    pub(crate) id: String,
    pub(crate) ledger: SessionLedger,
    pub(crate) score: ScoreState,
    pub(crate) guard: GuardState,
    pub(crate) failures: FailureMemory,
    pub(crate) counters: OccurrenceCounters,
    pub(crate) thoughts: ThoughtCache,
    pub(crate) embeddings_by_text: EmbeddingCache,
    /// Embeddings of the steps currently in the ledger, keyed by step index.
    pub(crate) step_embeddings: HashMap<u64, Vec<f32>>,
    /// Heaviest loop matched most recently.
    pub(crate) last_pattern: Option<PatternMemory>,
}

/// The dominant loop of the last step that matched any detector.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PatternMemory {
    pub(crate) loop_type: LoopType,
    pub(crate) evidence_len: usize,
    /// Tool of the step that matched, named in nudges issued while the score decays.
    pub(crate) tool: Option<String>,
}

impl Session {
    pub fn new(id: impl Into<String>, config: &GuardConfig) -> Self {
        let embedding_capacity = config.window_size.saturating_mul(4).max(16);
        Self {
            id: id.into(),
            ledger: SessionLedger::new(config.window_size),
            score: ScoreState::default(),
            guard: GuardState::default(),
            failures: FailureMemory::new(),
            counters: OccurrenceCounters::default(),
            thoughts: ThoughtCache::unbounded(),
            embeddings_by_text: EmbeddingCache::new(embedding_capacity),
            step_embeddings: HashMap::new(),
            last_pattern: None,
        }
    }

    /// Append a step and keep the per-step embedding map aligned with the ledger.
    pub(crate) fn append(&mut self, step: Step, embedding: Option<Vec<f32>>) -> u64 {
        let (index, evicted) = self.ledger.append(step);
        if let Some(evicted) = evicted {
            self.step_embeddings.remove(&evicted.index);
        }
        if let Some(vector) = embedding {
            self.step_embeddings.insert(index, vector);
        }
        index
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let mut action_failures: Vec<FailureRecord> =
            self.failures.action_records().cloned().collect();
        action_failures.sort_by(|a, b| a.first_seen.cmp(&b.first_seen).then(a.key.cmp(&b.key)));
        let mut intent_failures: Vec<FailureRecord> =
            self.failures.intent_records().cloned().collect();
        intent_failures.sort_by(|a, b| a.first_seen.cmp(&b.first_seen).then(a.key.cmp(&b.key)));

        SessionSnapshot {
            session_id: self.id.clone(),
            steps: self.ledger.len(),
            next_index: self.ledger.next_index(),
            score: self.score.score,
            score_verdict: self.score.verdict,
            consecutive_repeats: self.guard.consecutive(),
            active_intent: self.guard.active_intent().map(ToString::to_string),
            action_failures,
            intent_failures,
        }
    }
}

/// Point-in-time view of a session, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    /// Steps currently held in the ledger.
    pub steps: usize,
    pub next_index: u64,
    pub score: f64,
    pub score_verdict: ScoreVerdict,
    pub consecutive_repeats: u32,
    pub active_intent: Option<String>,
    pub action_failures: Vec<FailureRecord>,
    pub intent_failures: Vec<FailureRecord>,
}
