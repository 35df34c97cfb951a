//! Loopwarden - runtime loop guardrail for autonomous agents
//!
//! Before an agent executes its next tool call, the caller asks the guard
//! whether to proceed. The guard keeps a bounded per-session history of
//! steps and answers ALLOW, WARN or BLOCK, attaching a corrective nudge to
//! anything but ALLOW.
//!
//! Two layers feed each decision:
//!
//! - **Pattern layer**: stutter, insanity (semantic repetition), phantom
//!   progress and ping-pong detectors add weighted evidence to a decaying
//!   per-session score.
//! - **Intent layer**: a cheap repeat guard on the exact canonical action,
//!   and an intent exhaustion guard that blocks after enough distinct failed
//!   attempts at the same normalized intent.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and capability ports
//! - **Service Layer** (`services`): the decision engine
//! - **Adapters** (`adapters`): embedding and thought-normalization providers
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): trace replay
//!
//! # Example
//!
//! ```no_run
//! use loopwarden::{CheckRequest, GuardConfig, GuardEngine, Verdict};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), loopwarden::GuardError> {
//! let engine = GuardEngine::new(GuardConfig::default())?;
//! let request = CheckRequest::new(json!({"page": 1}))
//!     .with_thought("look up the product")
//!     .with_action("search", json!({"query": "XYZ-9999"}));
//! let decision = engine.check("session-1", request).await?;
//! if decision.verdict == Verdict::Block {
//!     println!("{}", decision.nudge_message.unwrap_or_default());
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{GuardError, GuardResult};
pub use domain::models::{
    ActionCall, AppConfig, CheckRequest, Decision, DetectionResult, GuardConfig, GuardFinding,
    GuardReason, LoggingConfig, LoopType, Outcome, ReasonCode, ScoreVerdict, SignatureTable,
    Step, Verdict,
};
pub use domain::ports::{EmbeddingProvider, ThoughtNormalizer};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    GuardEngine, GuardEngineBuilder, MetricsSnapshot, SessionSnapshot, ToolCall, ToolGraph,
    ToolInterceptor, ToolNode,
};
