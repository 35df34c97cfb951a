use super::{DetectionContext, Detector};
use crate::domain::errors::GuardResult;
use crate::domain::models::{DetectionResult, LoopType};

/// Strict two-actor handoff: A, B, A, B, ...
///
/// Matches when the last `2 * cycles` steps all carry an actor label and
/// alternate between exactly two distinct labels.
#[derive(Debug, Clone)]
pub struct PingPongDetector {
    cycles: usize,
    weight: f64,
}

impl PingPongDetector {
    pub fn new(cycles: usize, weight: f64) -> Self {
        Self { cycles, weight }
    }
}

impl Detector for PingPongDetector {
    fn name(&self) -> &'static str {
        "ping_pong"
    }

    fn loop_type(&self) -> LoopType {
        LoopType::PingPong
    }

    fn evaluate(&self, ctx: &DetectionContext<'_>) -> GuardResult<DetectionResult> {
        let unmatched = || DetectionResult::unmatched(self.name(), self.loop_type());
        let Some(tail) = ctx.tail(self.cycles * 2) else {
            return Ok(unmatched());
        };
        let actors: Option<Vec<&str>> = tail.iter().map(|s| s.actor.as_deref()).collect();
        let Some(actors) = actors else {
            return Ok(unmatched());
        };
        let (Some(&a), Some(&b)) = (actors.first(), actors.get(1)) else {
            return Ok(unmatched());
        };
        if a == b {
            return Ok(unmatched());
        }

        let alternating = actors
            .iter()
            .enumerate()
            .all(|(i, actor)| *actor == if i % 2 == 0 { a } else { b });
        if !alternating {
            return Ok(unmatched());
        }

        Ok(DetectionResult::matched(
            self.name(),
            self.loop_type(),
            self.weight,
            tail.iter().map(|s| s.index).collect(),
        ))
    }
}
