//! Pattern detector pipeline.
//!
//! Every detector is a pure function of the ledger window (plus the step
//! embeddings the orchestrator resolved before the pipeline runs). Detectors
//! never share state, and a detector that errors or panics is reported as
//! unmatched for that step so the remaining detectors still run.

mod insanity;
mod phantom_progress;
mod ping_pong;
mod stutter;

pub use insanity::{cosine_similarity, InsanityDetector};
pub use phantom_progress::PhantomProgressDetector;
pub use ping_pong::PingPongDetector;
pub use stutter::StutterDetector;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{debug, warn};

use crate::domain::errors::GuardResult;
use crate::domain::models::{DetectionResult, GuardConfig, LoopType, Step};

/// Read-only view handed to each detector.
#[derive(Debug, Clone, Copy)]
pub struct DetectionContext<'a> {
    /// Ledger window, oldest first; the step under evaluation is last.
    pub window: &'a [&'a Step],
    /// Action embeddings keyed by step index. Empty without an embedding capability.
    pub embeddings: &'a HashMap<u64, Vec<f32>>,
}

impl<'a> DetectionContext<'a> {
    pub fn new(window: &'a [&'a Step], embeddings: &'a HashMap<u64, Vec<f32>>) -> Self {
        Self { window, embeddings }
    }

    /// The last `n` steps of the window, or `None` when fewer are available.
    pub fn tail(&self, n: usize) -> Option<&'a [&'a Step]> {
        let window: &'a [&'a Step] = self.window;
        window.len().checked_sub(n).map(|start| &window[start..])
    }

    pub fn latest(&self) -> Option<&'a Step> {
        self.window.last().copied()
    }
}

/// A single loop-pattern detector.
pub trait Detector: Send + Sync {
    /// Stable identity reported in results and logs.
    fn name(&self) -> &'static str;

    fn loop_type(&self) -> LoopType;

    fn evaluate(&self, ctx: &DetectionContext<'_>) -> GuardResult<DetectionResult>;
}

/// Ordered set of detectors run against every step.
pub struct DetectorPipeline {
    detectors: Vec<Box<dyn Detector>>,
}

impl std::fmt::Debug for DetectorPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorPipeline")
            .field("detectors", &self.names())
            .finish()
    }
}

impl DetectorPipeline {
    pub fn new(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { detectors }
    }

    /// The four built-in detectors, tuned from configuration.
    pub fn from_config(config: &GuardConfig) -> Self {
        Self::new(vec![
            Box::new(StutterDetector::new(
                config.stutter_length,
                config.weights.stutter,
            )),
            Box::new(InsanityDetector::new(
                config.insanity_lookback,
                config.insanity_min_matches,
                config.insanity_similarity_threshold,
                config.weights.insanity,
            )),
            Box::new(PhantomProgressDetector::new(
                config.phantom_length,
                config.weights.phantom_progress,
            )),
            Box::new(PingPongDetector::new(
                config.ping_pong_cycles,
                config.weights.ping_pong,
            )),
        ])
    }

    /// Append an extra detector.
    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Run every detector; one result per detector, in pipeline order.
    pub fn run(&self, ctx: &DetectionContext<'_>) -> Vec<DetectionResult> {
        self.detectors
            .iter()
            .map(|detector| Self::run_isolated(detector.as_ref(), ctx))
            .collect()
    }

    fn run_isolated(detector: &dyn Detector, ctx: &DetectionContext<'_>) -> DetectionResult {
        match catch_unwind(AssertUnwindSafe(|| detector.evaluate(ctx))) {
            Ok(Ok(result)) => {
                if result.matched {
                    debug!(
                        detector = detector.name(),
                        weight = result.weight,
                        evidence = ?result.evidence,
                        "Detector matched"
                    );
                }
                result
            }
            Ok(Err(e)) => {
                warn!(detector = detector.name(), error = %e, "Detector failed; treating as unmatched");
                DetectionResult::unmatched(detector.name(), detector.loop_type())
            }
            Err(_) => {
                warn!(detector = detector.name(), "Detector panicked; treating as unmatched");
                DetectionResult::unmatched(detector.name(), detector.loop_type())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::errors::GuardError;
    use crate::services::ledger::tests::blank_step;

    /// Build steps with the given action hashes, state hashes and actors.
    pub(crate) fn steps(specs: &[(Option<&str>, &str, Option<&str>)]) -> Vec<Step> {
        specs
            .iter()
            .enumerate()
            .map(|(i, (action, state, actor))| {
                let mut step = blank_step();
                step.index = i as u64;
                step.action_hash = action.map(ToString::to_string);
                step.state_hash = (*state).to_string();
                step.actor = actor.map(ToString::to_string);
                step
            })
            .collect()
    }

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn loop_type(&self) -> LoopType {
            LoopType::Stutter
        }
        fn evaluate(&self, _ctx: &DetectionContext<'_>) -> GuardResult<DetectionResult> {
            Err(GuardError::Provider("boom".into()))
        }
    }

    struct PanickingDetector;

    impl Detector for PanickingDetector {
        fn name(&self) -> &'static str {
            "panicking"
        }
        fn loop_type(&self) -> LoopType {
            LoopType::PingPong
        }
        fn evaluate(&self, _ctx: &DetectionContext<'_>) -> GuardResult<DetectionResult> {
            panic!("detector bug");
        }
    }

    #[test]
    fn test_default_pipeline_order() {
        let pipeline = DetectorPipeline::from_config(&GuardConfig::default());
        assert_eq!(
            pipeline.names(),
            vec!["stutter", "insanity", "phantom_progress", "ping_pong"]
        );
    }

    #[test]
    fn test_faulty_detectors_are_isolated() {
        let pipeline = DetectorPipeline::from_config(&GuardConfig::default())
            .with_detector(Box::new(FailingDetector))
            .with_detector(Box::new(PanickingDetector));

        let owned = steps(&[
            (Some("a"), "s1", None),
            (Some("a"), "s2", None),
            (Some("a"), "s3", None),
        ]);
        let window: Vec<&Step> = owned.iter().collect();
        let embeddings = HashMap::new();
        let results = pipeline.run(&DetectionContext::new(&window, &embeddings));

        assert_eq!(results.len(), 6);
        assert!(results[0].matched, "stutter should still match");
        assert!(!results[4].matched);
        assert!(!results[5].matched);
        assert_eq!(results[5].detector, "panicking");
    }

    #[test]
    fn test_context_tail() {
        let owned = steps(&[(None, "s", None), (None, "s", None)]);
        let window: Vec<&Step> = owned.iter().collect();
        let embeddings = HashMap::new();
        let ctx = DetectionContext::new(&window, &embeddings);
        assert_eq!(ctx.tail(2).map(<[&Step]>::len), Some(2));
        assert!(ctx.tail(3).is_none());
        assert_eq!(ctx.latest().map(|s| s.index), Some(1));
    }
}
