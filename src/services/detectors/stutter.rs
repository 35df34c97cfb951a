use super::{DetectionContext, Detector};
use crate::domain::errors::GuardResult;
use crate::domain::models::{DetectionResult, LoopType};

/// Matches when the last `length` steps carry the same action hash.
#[derive(Debug, Clone)]
pub struct StutterDetector {
    length: usize,
    weight: f64,
}

impl StutterDetector {
    pub fn new(length: usize, weight: f64) -> Self {
        Self { length, weight }
    }
}

impl Detector for StutterDetector {
    fn name(&self) -> &'static str {
        "stutter"
    }

    fn loop_type(&self) -> LoopType {
        LoopType::Stutter
    }

    fn evaluate(&self, ctx: &DetectionContext<'_>) -> GuardResult<DetectionResult> {
        let Some(tail) = ctx.tail(self.length) else {
            return Ok(DetectionResult::unmatched(self.name(), self.loop_type()));
        };
        let Some(first) = tail.first().and_then(|s| s.action_hash.as_deref()) else {
            return Ok(DetectionResult::unmatched(self.name(), self.loop_type()));
        };

        let repeated = tail
            .iter()
            .all(|step| step.action_hash.as_deref() == Some(first));
        if repeated {
            let evidence = tail.iter().map(|s| s.index).collect();
            Ok(DetectionResult::matched(
                self.name(),
                self.loop_type(),
                self.weight,
                evidence,
            ))
        } else {
            Ok(DetectionResult::unmatched(self.name(), self.loop_type()))
        }
    }
}
