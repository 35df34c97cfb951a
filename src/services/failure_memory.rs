//! Per-session failure history, keyed by action hash and by intent label.

use std::collections::HashMap;

use crate::domain::models::{FailureRecord, Outcome, SignatureTable};

/// Failure history for one session.
///
/// Only failure-classified outcomes create or grow records. A success under
/// an intent clears that intent's attempt set.
#[derive(Debug, Clone, Default)]
pub struct FailureMemory {
    by_action: HashMap<String, FailureRecord>,
    by_intent: HashMap<String, FailureRecord>,
}

impl FailureMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one outcome for the given action/intent pair.
    ///
    /// Returns the failure signature when the outcome was a failure.
    pub fn record(
        &mut self,
        table: &SignatureTable,
        action_hash: Option<&str>,
        intent_label: Option<&str>,
        index: u64,
        outcome: &Outcome,
    ) -> Option<String> {
        match outcome {
            Outcome::Success => {
                if let Some(label) = intent_label {
                    self.clear_intent(label);
                }
                None
            }
            Outcome::Failure { message } => {
                let signature = table.classify(message).to_string();
                if let Some(hash) = action_hash {
                    Self::bump(&mut self.by_action, hash, Some(hash), index, &signature);
                }
                if let Some(label) = intent_label {
                    Self::bump(&mut self.by_intent, label, action_hash, index, &signature);
                }
                Some(signature)
            }
        }
    }

    fn bump(
        records: &mut HashMap<String, FailureRecord>,
        key: &str,
        attempted: Option<&str>,
        index: u64,
        signature: &str,
    ) {
        let record = records
            .entry(key.to_string())
            .or_insert_with(|| FailureRecord::new(key, index, signature));
        record.failure_count += 1;
        record.last_seen = index;
        signature.clone_into(&mut record.last_signature);
        if let Some(hash) = attempted {
            record.attempted_actions.insert(hash.to_string());
        }
    }

    /// Forget the attempt set of an intent.
    pub fn clear_intent(&mut self, label: &str) {
        self.by_intent.remove(label);
    }

    pub fn action_record(&self, action_hash: &str) -> Option<&FailureRecord> {
        self.by_action.get(action_hash)
    }

    pub fn intent_record(&self, label: &str) -> Option<&FailureRecord> {
        self.by_intent.get(label)
    }

    /// Distinct failed actions recorded under `label`.
    pub fn distinct_failed_attempts(&self, label: &str) -> usize {
        self.by_intent
            .get(label)
            .map_or(0, FailureRecord::distinct_attempts)
    }

    pub fn action_records(&self) -> impl Iterator<Item = &FailureRecord> {
        self.by_action.values()
    }

    pub fn intent_records(&self) -> impl Iterator<Item = &FailureRecord> {
        self.by_intent.values()
    }
}
