use super::{DetectionContext, Detector};
use crate::domain::errors::GuardResult;
use crate::domain::models::{DetectionResult, LoopType};

/// Cosine similarity of two vectors; 0.0 for mismatched or zero-length input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

/// Doing semantically the same thing over and over.
///
/// Compares the latest action's embedding with the embeddings of the previous
/// `lookback` steps and matches when at least `min_matches` of them reach the
/// similarity threshold. Without embeddings it never matches.
#[derive(Debug, Clone)]
pub struct InsanityDetector {
    lookback: usize,
    min_matches: usize,
    threshold: f32,
    weight: f64,
}

impl InsanityDetector {
    pub fn new(lookback: usize, min_matches: usize, threshold: f32, weight: f64) -> Self {
        Self {
            lookback,
            min_matches,
            threshold,
            weight,
        }
    }
}

impl Detector for InsanityDetector {
    fn name(&self) -> &'static str {
        "insanity"
    }

    fn loop_type(&self) -> LoopType {
        LoopType::Insanity
    }

    fn evaluate(&self, ctx: &DetectionContext<'_>) -> GuardResult<DetectionResult> {
        let unmatched = || DetectionResult::unmatched(self.name(), self.loop_type());
        let Some(latest) = ctx.latest() else {
            return Ok(unmatched());
        };
        let Some(current) = ctx.embeddings.get(&latest.index) else {
            return Ok(unmatched());
        };

        let previous = &ctx.window[..ctx.window.len() - 1];
        let similar: Vec<u64> = previous
            .iter()
            .rev()
            .take(self.lookback)
            .filter_map(|step| {
                let other = ctx.embeddings.get(&step.index)?;
                (cosine_similarity(current, other) >= self.threshold).then_some(step.index)
            })
            .collect();

        if similar.len() < self.min_matches {
            return Ok(unmatched());
        }

        let mut evidence: Vec<u64> = similar.into_iter().rev().collect();
        evidence.push(latest.index);
        Ok(DetectionResult::matched(
            self.name(),
            self.loop_type(),
            self.weight,
            evidence,
        ))
    }
}
