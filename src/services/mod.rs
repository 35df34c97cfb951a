pub mod detectors;
pub mod failure_memory;
pub mod hashing;
pub mod integration;
pub mod intent_guard;
pub mod intervention;
pub mod ledger;
pub mod loop_scorer;
pub mod metrics;
pub mod orchestrator;
pub mod session;
pub mod thought_cache;

pub use detectors::{DetectionContext, Detector, DetectorPipeline};
pub use failure_memory::FailureMemory;
pub use hashing::{ActionHasher, StateHasher};
pub use integration::{ToolCall, ToolGraph, ToolInterceptor, ToolNode};
pub use intent_guard::{GuardState, IntentGuard};
pub use intervention::{InterventionManager, NudgeContext, OccurrenceCounters};
pub use ledger::SessionLedger;
pub use loop_scorer::{LoopScorer, ScoreState};
pub use metrics::{GuardMetrics, MetricsSnapshot};
pub use orchestrator::{GuardEngine, GuardEngineBuilder};
pub use session::{Session, SessionSnapshot};
pub use thought_cache::{canonical_label, MemoCache};
