use std::collections::HashSet;

use super::{DetectionContext, Detector};
use crate::domain::errors::GuardResult;
use crate::domain::models::{DetectionResult, LoopType};

/// Different actions, frozen state.
///
/// Matches when the last `length` steps have pairwise-distinct action hashes
/// but an identical state hash.
#[derive(Debug, Clone)]
pub struct PhantomProgressDetector {
    length: usize,
    weight: f64,
}

impl PhantomProgressDetector {
    pub fn new(length: usize, weight: f64) -> Self {
        Self { length, weight }
    }
}

impl Detector for PhantomProgressDetector {
    fn name(&self) -> &'static str {
        "phantom_progress"
    }

    fn loop_type(&self) -> LoopType {
        LoopType::PhantomProgress
    }

    fn evaluate(&self, ctx: &DetectionContext<'_>) -> GuardResult<DetectionResult> {
        let unmatched = || DetectionResult::unmatched(self.name(), self.loop_type());
        let Some(tail) = ctx.tail(self.length) else {
            return Ok(unmatched());
        };
        let Some(state) = tail.first().map(|s| s.state_hash.as_str()) else {
            return Ok(unmatched());
        };

        let mut actions = HashSet::with_capacity(tail.len());
        for step in tail {
            let Some(action) = step.action_hash.as_deref() else {
                return Ok(unmatched());
            };
            if step.state_hash != state || !actions.insert(action) {
                return Ok(unmatched());
            }
        }

        Ok(DetectionResult::matched(
            self.name(),
            self.loop_type(),
            self.weight,
            tail.iter().map(|s| s.index).collect(),
        ))
    }
}
