//! Domain errors for the loopwarden guard engine.

use thiserror::Error;

/// Errors that can occur while building or driving a guard engine.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Invalid thresholds or tables supplied at construction time.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The thought normalization capability failed or timed out.
    #[error("Thought normalization unavailable: {0}")]
    NormalizationUnavailable(String),

    /// The embedding capability failed or timed out.
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The caller supplied a step that cannot be interpreted.
    #[error("Malformed step input: {0}")]
    MalformedStepInput(String),

    /// Another `check()` is already running for this session.
    #[error("Session {0} is busy: calls must be serialized per session")]
    SessionBusy(String),

    /// A session id was referenced that has no state.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// An external provider returned something unusable.
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl GuardError {
    /// Whether the error only degrades a single feature instead of failing the call.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            Self::NormalizationUnavailable(_) | Self::EmbeddingUnavailable(_)
        )
    }
}

pub type GuardResult<T> = Result<T, GuardError>;

impl From<serde_json::Error> for GuardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<regex::Error> for GuardError {
    fn from(err: regex::Error) -> Self {
        Self::Configuration(format!("invalid pattern: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degradable_classification() {
        assert!(GuardError::NormalizationUnavailable("down".into()).is_degradable());
        assert!(GuardError::EmbeddingUnavailable("down".into()).is_degradable());
        assert!(!GuardError::MalformedStepInput("state".into()).is_degradable());
        assert!(!GuardError::SessionBusy("s1".into()).is_degradable());
    }

    #[test]
    fn test_display() {
        let err = GuardError::SessionBusy("agent-7".into());
        assert_eq!(
            err.to_string(),
            "Session agent-7 is busy: calls must be serialized per session"
        );
    }
}
