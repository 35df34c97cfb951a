//! Lookup-table thought normalizer.
//!
//! Maps thoughts to intent labels by exact text or by case-insensitive
//! regex. Used for trace replay (`--intents FILE.yaml`) and in tests.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;

use crate::domain::errors::{GuardError, GuardResult};
use crate::domain::ports::ThoughtNormalizer;

/// YAML shape of an intents file.
///
/// ```yaml
/// exact:
///   "search XYZ-9999": find product by id
/// patterns:
///   - pattern: "xyz.?\\d+"
///     label: find product by id
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntentTable {
    #[serde(default)]
    pub exact: HashMap<String, String>,
    #[serde(default)]
    pub patterns: Vec<IntentPattern>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntentPattern {
    pub pattern: String,
    pub label: String,
}

/// Exact matches win over patterns; patterns are tried in order.
#[derive(Debug, Clone, Default)]
pub struct StaticNormalizer {
    exact: HashMap<String, String>,
    patterns: Vec<(Regex, String)>,
}

impl StaticNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exact(mut self, thought: impl Into<String>, label: impl Into<String>) -> Self {
        self.exact.insert(thought.into(), label.into());
        self
    }

    pub fn with_pattern(mut self, pattern: &str, label: impl Into<String>) -> GuardResult<Self> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        self.patterns.push((regex, label.into()));
        Ok(self)
    }

    pub fn from_table(table: IntentTable) -> GuardResult<Self> {
        let mut normalizer = Self {
            exact: table.exact,
            patterns: Vec::with_capacity(table.patterns.len()),
        };
        for entry in table.patterns {
            normalizer = normalizer.with_pattern(&entry.pattern, entry.label)?;
        }
        Ok(normalizer)
    }

    /// Load an intents YAML file.
    pub fn from_yaml_file(path: &Path) -> GuardResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GuardError::Configuration(format!("cannot read intents file {}: {e}", path.display()))
        })?;
        let table: IntentTable = serde_yaml::from_str(&content).map_err(|e| {
            GuardError::Configuration(format!("invalid intents file {}: {e}", path.display()))
        })?;
        Self::from_table(table)
    }

    pub fn lookup(&self, text: &str) -> Option<&str> {
        if let Some(label) = self.exact.get(text.trim()) {
            return Some(label);
        }
        self.patterns
            .iter()
            .find(|(regex, _)| regex.is_match(text))
            .map(|(_, label)| label.as_str())
    }
}

#[async_trait]
impl ThoughtNormalizer for StaticNormalizer {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn normalize(&self, text: &str) -> GuardResult<String> {
        self.lookup(text)
            .map(ToString::to_string)
            .ok_or_else(|| GuardError::NormalizationUnavailable(format!("no intent for '{text}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_exact_then_pattern() {
        let normalizer = StaticNormalizer::new()
            .with_exact("search XYZ-9999", "find product by id")
            .with_pattern(r"^try xyz", "find product by id")
            .unwrap();
        assert_eq!(
            normalizer.normalize("search XYZ-9999").await.unwrap(),
            "find product by id"
        );
        assert_eq!(
            normalizer.normalize("Try XYZ 9999").await.unwrap(),
            "find product by id"
        );
        let err = normalizer.normalize("open the door").await.unwrap_err();
        assert!(err.is_degradable());
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "exact:\n  \"check stock\": check inventory\npatterns:\n  - pattern: \"xyz.?\\\\d+\"\n    label: find product by id"
        )
        .unwrap();
        let normalizer = StaticNormalizer::from_yaml_file(file.path()).unwrap();
        assert_eq!(normalizer.lookup("check stock"), Some("check inventory"));
        assert_eq!(normalizer.lookup("search XYZ9999"), Some("find product by id"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!(StaticNormalizer::new().with_pattern("(", "x").is_err());
    }
}
