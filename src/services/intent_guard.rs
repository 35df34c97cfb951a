//! Two-level exhaustion guard.
//!
//! Level 1 counts consecutive repeats of one action hash and needs no
//! capability. Level 2 blocks once enough distinct actions have failed under
//! one canonical intent; it only runs when the step has an intent label and
//! level 1 did not already block.

use tracing::debug;

use super::failure_memory::FailureMemory;
use crate::domain::models::{GuardConfig, GuardFinding, GuardReason, Verdict};

/// Per-session guard counters.
#[derive(Debug, Clone, Default)]
pub struct GuardState {
    last_action_hash: Option<String>,
    consecutive: u32,
    active_intent: Option<String>,
}

impl GuardState {
    /// Consecutive occurrences of the most recent action hash.
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn active_intent(&self) -> Option<&str> {
        self.active_intent.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct IntentGuard {
    action_repeat_threshold: u32,
    intent_repeat_threshold: u32,
}

impl IntentGuard {
    pub fn new(action_repeat_threshold: u32, intent_repeat_threshold: u32) -> Self {
        Self {
            action_repeat_threshold,
            intent_repeat_threshold,
        }
    }

    pub fn from_config(config: &GuardConfig) -> Self {
        Self::new(config.action_repeat_threshold, config.intent_repeat_threshold)
    }

    /// Level 1. Updates the repeat counter with this step's action hash.
    ///
    /// `repeats` is the number of consecutive occurrences before this one:
    /// WARN at `threshold - 1`, BLOCK at `threshold`.
    pub fn check_action(
        &self,
        state: &mut GuardState,
        action_hash: Option<&str>,
    ) -> Option<GuardFinding> {
        let Some(hash) = action_hash else {
            state.last_action_hash = None;
            state.consecutive = 0;
            return None;
        };

        if state.last_action_hash.as_deref() == Some(hash) {
            state.consecutive += 1;
        } else {
            state.last_action_hash = Some(hash.to_string());
            state.consecutive = 1;
        }

        let repeats = state.consecutive - 1;
        let verdict = if repeats >= self.action_repeat_threshold {
            Verdict::Block
        } else if repeats > 0 && repeats + 1 == self.action_repeat_threshold {
            Verdict::Warn
        } else {
            return None;
        };

        debug!(repeats, verdict = %verdict, "Action repeat guard triggered");
        Some(GuardFinding {
            reason: GuardReason::ActionRepeated,
            verdict,
            message: format!("same action repeated ({} consecutive calls)", state.consecutive),
            count: state.consecutive,
            intent_label: None,
        })
    }

    /// Track the active intent; switching labels clears the previous label's attempts.
    pub fn track_intent(
        &self,
        state: &mut GuardState,
        memory: &mut FailureMemory,
        intent_label: Option<&str>,
    ) {
        let Some(label) = intent_label else {
            return;
        };
        if state.active_intent.as_deref() == Some(label) {
            return;
        }
        if let Some(previous) = state.active_intent.take() {
            memory.clear_intent(&previous);
        }
        state.active_intent = Some(label.to_string());
    }

    /// Level 2. Judges an attempt under `intent_label` from the recorded failures.
    pub fn check_intent(&self, memory: &FailureMemory, intent_label: &str) -> Option<GuardFinding> {
        let attempts = u32::try_from(memory.distinct_failed_attempts(intent_label)).unwrap_or(u32::MAX);
        let verdict = if attempts >= self.intent_repeat_threshold {
            Verdict::Block
        } else if attempts > 0 && attempts + 1 == self.intent_repeat_threshold {
            Verdict::Warn
        } else {
            return None;
        };

        debug!(intent = intent_label, attempts, verdict = %verdict, "Intent guard triggered");
        let message = if verdict == Verdict::Block {
            format!(
                "intent exhausted: try a different approach ({attempts} distinct attempts failed for '{intent_label}')"
            )
        } else {
            format!("intent nearly exhausted ({attempts} distinct attempts failed for '{intent_label}')")
        };
        Some(GuardFinding {
            reason: GuardReason::IntentExhausted,
            verdict,
            message,
            count: attempts,
            intent_label: Some(intent_label.to_string()),
        })
    }
}
