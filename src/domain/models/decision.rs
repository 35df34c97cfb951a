//! Verdicts, detector results and the decision returned to callers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-facing verdict, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allow,
    Warn,
    Block,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Warn => "warn",
            Self::Block => "block",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict derived from the decaying pattern score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreVerdict {
    Allow,
    Nudge,
    Stop,
}

impl From<ScoreVerdict> for Verdict {
    fn from(verdict: ScoreVerdict) -> Self {
        match verdict {
            ScoreVerdict::Allow => Self::Allow,
            ScoreVerdict::Nudge => Self::Warn,
            ScoreVerdict::Stop => Self::Block,
        }
    }
}

/// Behavioral loop shape reported by a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopType {
    Stutter,
    Insanity,
    PhantomProgress,
    PingPong,
}

impl LoopType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stutter => "stutter",
            Self::Insanity => "insanity",
            Self::PhantomProgress => "phantom_progress",
            Self::PingPong => "ping_pong",
        }
    }
}

impl fmt::Display for LoopType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one detector for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Detector identity.
    pub detector: String,
    pub matched: bool,
    /// Score contribution when matched.
    pub weight: f64,
    pub loop_type: LoopType,
    /// Monotonic step indices (`Step::index`) that make up the evidence.
    ///
    /// These are session-wide and stay valid after older steps leave the
    /// window; they are not offsets into the window.
    pub evidence: Vec<u64>,
}

impl DetectionResult {
    pub fn unmatched(detector: impl Into<String>, loop_type: LoopType) -> Self {
        Self {
            detector: detector.into(),
            matched: false,
            weight: 0.0,
            loop_type,
            evidence: Vec::new(),
        }
    }

    pub fn matched(
        detector: impl Into<String>,
        loop_type: LoopType,
        weight: f64,
        evidence: Vec<u64>,
    ) -> Self {
        Self {
            detector: detector.into(),
            matched: true,
            weight,
            loop_type,
            evidence,
        }
    }
}

/// Why the intent guard objected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardReason {
    /// Level 1: the same action hash repeated consecutively.
    ActionRepeated,
    /// Level 2: distinct failing attempts under one intent ran out.
    IntentExhausted,
}

impl GuardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ActionRepeated => "action_repeated",
            Self::IntentExhausted => "intent_exhausted",
        }
    }
}

/// A non-allow finding from the intent guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardFinding {
    pub reason: GuardReason,
    pub verdict: Verdict,
    pub message: String,
    /// Consecutive repeats (level 1) or distinct failed attempts (level 2).
    pub count: u32,
    /// Intent label the finding applies to (level 2 only).
    pub intent_label: Option<String>,
}

/// Reason code attached to a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ReasonCode {
    /// Nothing objected.
    Clear,
    /// The pattern score crossed a threshold; carries the heaviest matched loop type.
    LoopPattern(LoopType),
    /// The intent guard objected.
    Guard(GuardReason),
}

impl ReasonCode {
    /// Category key used for template rotation and per-session counters.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Clear => "clear",
            Self::LoopPattern(loop_type) => loop_type.as_str(),
            Self::Guard(reason) => reason.as_str(),
        }
    }
}

/// The answer to one `check()` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub session_id: String,
    pub step_index: u64,
    pub verdict: Verdict,
    pub reason: ReasonCode,
    /// Short human-readable reason.
    pub message: String,
    /// Corrective text to feed back to the agent; always present on WARN and BLOCK.
    pub nudge_message: Option<String>,
    /// Matched detector results that contributed this step.
    pub detections: Vec<DetectionResult>,
    pub guard_findings: Vec<GuardFinding>,
    /// Pattern score after this step.
    pub score: f64,
    pub intent_label: Option<String>,
}

impl Decision {
    pub fn is_blocked(&self) -> bool {
        self.verdict == Verdict::Block
    }

    pub fn is_allowed(&self) -> bool {
        self.verdict == Verdict::Allow
    }

    /// Loop types of all matched detections.
    pub fn loop_types(&self) -> Vec<LoopType> {
        self.detections.iter().map(|d| d.loop_type).collect()
    }

    pub fn has_loop_type(&self, loop_type: LoopType) -> bool {
        self.detections.iter().any(|d| d.loop_type == loop_type)
    }
}
