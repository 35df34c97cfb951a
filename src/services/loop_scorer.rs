//! Decay-weighted severity score over detector matches.
//!
//! `score(i) = score(j) * decay^(i - j) + sum(weights matched at i)` where `j`
//! is the index of the previous update. The verdict is a pure function of the
//! resulting score: strict threshold crossing, no cooldown band.

use serde::Serialize;

use crate::domain::models::{DetectionResult, GuardConfig, ScoreVerdict};

/// Per-session score state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreState {
    /// Current score, never negative.
    pub score: f64,
    /// Step index of the last update.
    pub last_index: Option<u64>,
    pub verdict: ScoreVerdict,
}

impl Default for ScoreState {
    fn default() -> Self {
        Self {
            score: 0.0,
            last_index: None,
            verdict: ScoreVerdict::Allow,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoopScorer {
    decay_rate: f64,
    nudge_threshold: f64,
    stop_threshold: f64,
}

impl LoopScorer {
    pub fn new(decay_rate: f64, nudge_threshold: f64, stop_threshold: f64) -> Self {
        Self {
            decay_rate,
            nudge_threshold,
            stop_threshold,
        }
    }

    pub fn from_config(config: &GuardConfig) -> Self {
        Self::new(
            config.decay_rate,
            config.score_nudge_threshold,
            config.score_stop_threshold,
        )
    }

    pub fn verdict_for(&self, score: f64) -> ScoreVerdict {
        if score >= self.stop_threshold {
            ScoreVerdict::Stop
        } else if score >= self.nudge_threshold {
            ScoreVerdict::Nudge
        } else {
            ScoreVerdict::Allow
        }
    }

    /// Decay the state to `index`, add matched weights, and re-derive the verdict.
    pub fn update(
        &self,
        state: &mut ScoreState,
        index: u64,
        results: &[DetectionResult],
    ) -> ScoreVerdict {
        let elapsed = state
            .last_index
            .map_or(0, |last| index.saturating_sub(last));
        let decayed = state.score * self.decay_rate.powf(elapsed as f64);
        let added: f64 = results
            .iter()
            .filter(|r| r.matched)
            .map(|r| r.weight.max(0.0))
            .sum();

        state.score = (decayed + added).max(0.0);
        state.last_index = Some(index);
        state.verdict = self.verdict_for(state.score);
        state.verdict
    }
}
