pub mod config;
pub mod decision;
pub mod failure;
pub mod step;

pub use config::{
    AppConfig, CapabilitiesConfig, DatePrecision, DetectorWeights, EmbeddingBackendConfig,
    GuardConfig, LoggingConfig, NormalizerBackendConfig, NumberCanonicalization,
    SignatureRuleConfig,
};
pub use decision::{
    Decision, DetectionResult, GuardFinding, GuardReason, LoopType, ReasonCode, ScoreVerdict,
    Verdict,
};
pub use failure::{FailureRecord, SignatureRule, SignatureTable, UNKNOWN_FAILURE};
pub use step::{ActionCall, CheckRequest, Outcome, Step};
