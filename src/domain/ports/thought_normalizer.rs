//! Thought normalization port.
//!
//! Maps free-form agent reasoning onto a short canonical intent label
//! (around five words) so that differently worded thoughts pursuing the same
//! goal collapse together. Backends may be non-deterministic; the engine
//! memoizes labels per exact input text within a session.

use async_trait::async_trait;

use crate::domain::errors::GuardResult;

/// Trait for thought normalization backends.
#[async_trait]
pub trait ThoughtNormalizer: Send + Sync {
    /// Backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Produce a canonical intent label for `text`.
    ///
    /// Failures should be reported as `GuardError::NormalizationUnavailable`.
    async fn normalize(&self, text: &str) -> GuardResult<String>;
}
