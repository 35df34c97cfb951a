use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::domain::errors::{GuardError, GuardResult};

/// Main configuration structure for loopwarden
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
    /// Decision engine tuning
    #[serde(default)]
    pub guard: GuardConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Optional external capabilities
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
}

/// Tuning for the detectors, scorer, intent guard and cost estimates.
///
/// Every field has a default, so a partial YAML file or a handful of
/// `LOOPWARDEN_GUARD__*` variables is enough to override one knob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GuardConfig {
    /// Consecutive repeats of one action hash before BLOCK (WARN one earlier)
    #[serde(default = "default_action_repeat_threshold")]
    pub action_repeat_threshold: u32,

    /// Distinct failed actions under one intent before the intent is exhausted
    #[serde(default = "default_intent_repeat_threshold")]
    pub intent_repeat_threshold: u32,

    /// Cosine similarity at which two action embeddings count as the same
    #[serde(default = "default_insanity_similarity_threshold")]
    pub insanity_similarity_threshold: f32,

    /// Similar previous actions needed for the insanity detector to match
    #[serde(default = "default_insanity_min_matches")]
    pub insanity_min_matches: usize,

    /// How many previous actions the insanity detector compares against
    #[serde(default = "default_insanity_lookback")]
    pub insanity_lookback: usize,

    /// Score at or above which the pattern verdict is NUDGE
    #[serde(default = "default_score_nudge_threshold")]
    pub score_nudge_threshold: f64,

    /// Score at or above which the pattern verdict is STOP
    #[serde(default = "default_score_stop_threshold")]
    pub score_stop_threshold: f64,

    /// Per-step multiplicative decay applied to the score
    #[serde(default = "default_decay_rate")]
    pub decay_rate: f64,

    /// Ledger capacity per session
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Consecutive identical actions for the stutter detector
    #[serde(default = "default_stutter_length")]
    pub stutter_length: usize,

    /// Steps with distinct actions and frozen state for phantom progress
    #[serde(default = "default_phantom_length")]
    pub phantom_length: usize,

    /// Full A,B cycles for the ping-pong detector
    #[serde(default = "default_ping_pong_cycles")]
    pub ping_pong_cycles: usize,

    /// Score contribution of each detector
    #[serde(default)]
    pub weights: DetectorWeights,

    /// Case-insensitive regexes matched against state keys; matches are dropped before hashing
    #[serde(default = "default_volatile_keys")]
    pub volatile_keys: Vec<String>,

    /// How numeric state values are folded before hashing
    #[serde(default)]
    pub number_canonicalization: NumberCanonicalization,

    /// Precision kept for date-like state values
    #[serde(default)]
    pub date_precision: DatePrecision,

    /// Replace ids, emails and UUIDs in action arguments with placeholders
    #[serde(default = "default_true")]
    pub mask_identifiers: bool,

    /// Replacement failure-signature table; `None` keeps the built-in table
    #[serde(default)]
    pub failure_signatures: Option<Vec<SignatureRuleConfig>>,

    /// Estimated tokens a blocked attempt would have consumed
    #[serde(default = "default_avg_tokens_per_attempt")]
    pub avg_tokens_per_attempt: u64,

    /// Cost of one token in USD
    #[serde(default = "default_usd_per_token")]
    pub usd_per_token: f64,

    /// Deadline for a single embedding or normalization call
    #[serde(default = "default_capability_timeout_ms")]
    pub capability_timeout_ms: u64,

    /// Maximum words kept in a canonical intent label
    #[serde(default = "default_intent_label_max_words")]
    pub intent_label_max_words: usize,
}

const fn default_action_repeat_threshold() -> u32 {
    2
}

const fn default_intent_repeat_threshold() -> u32 {
    3
}

const fn default_insanity_similarity_threshold() -> f32 {
    0.85
}

const fn default_insanity_min_matches() -> usize {
    3
}

const fn default_insanity_lookback() -> usize {
    5
}

const fn default_score_nudge_threshold() -> f64 {
    2.0
}

const fn default_score_stop_threshold() -> f64 {
    3.0
}

const fn default_decay_rate() -> f64 {
    0.8
}

const fn default_window_size() -> usize {
    50
}

const fn default_stutter_length() -> usize {
    3
}

const fn default_phantom_length() -> usize {
    2
}

const fn default_ping_pong_cycles() -> usize {
    2
}

const fn default_true() -> bool {
    true
}

const fn default_avg_tokens_per_attempt() -> u64 {
    2_000
}

const fn default_usd_per_token() -> f64 {
    0.000_003
}

const fn default_capability_timeout_ms() -> u64 {
    5_000
}

const fn default_intent_label_max_words() -> usize {
    5
}

fn default_volatile_keys() -> Vec<String> {
    [
        "timestamp",
        "^ts$",
        "_at$",
        "^time$",
        "datetime",
        "date_?time",
        "uuid",
        "guid",
        "request_?id",
        "trace_?id",
        "span_?id",
        "correlation_?id",
        "nonce",
        "random",
        "seed",
        "salt",
        "elapsed",
        "latency",
        "duration_ms",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            action_repeat_threshold: default_action_repeat_threshold(),
            intent_repeat_threshold: default_intent_repeat_threshold(),
            insanity_similarity_threshold: default_insanity_similarity_threshold(),
            insanity_min_matches: default_insanity_min_matches(),
            insanity_lookback: default_insanity_lookback(),
            score_nudge_threshold: default_score_nudge_threshold(),
            score_stop_threshold: default_score_stop_threshold(),
            decay_rate: default_decay_rate(),
            window_size: default_window_size(),
            stutter_length: default_stutter_length(),
            phantom_length: default_phantom_length(),
            ping_pong_cycles: default_ping_pong_cycles(),
            weights: DetectorWeights::default(),
            volatile_keys: default_volatile_keys(),
            number_canonicalization: NumberCanonicalization::default(),
            date_precision: DatePrecision::default(),
            mask_identifiers: true,
            failure_signatures: None,
            avg_tokens_per_attempt: default_avg_tokens_per_attempt(),
            usd_per_token: default_usd_per_token(),
            capability_timeout_ms: default_capability_timeout_ms(),
            intent_label_max_words: default_intent_label_max_words(),
        }
    }
}

impl GuardConfig {
    /// Validate configuration parameters.
    ///
    /// Invalid values are rejected, never clamped.
    pub fn validate(&self) -> GuardResult<()> {
        if self.action_repeat_threshold == 0 {
            return Err(invalid("action_repeat_threshold must be >= 1, got 0"));
        }
        if self.intent_repeat_threshold == 0 {
            return Err(invalid("intent_repeat_threshold must be >= 1, got 0"));
        }
        if !(self.insanity_similarity_threshold > 0.0 && self.insanity_similarity_threshold <= 1.0)
        {
            return Err(invalid(format!(
                "insanity_similarity_threshold must be in (0, 1], got {}",
                self.insanity_similarity_threshold
            )));
        }
        if self.insanity_min_matches == 0 {
            return Err(invalid("insanity_min_matches must be >= 1, got 0"));
        }
        if self.insanity_lookback < self.insanity_min_matches {
            return Err(invalid(format!(
                "insanity_lookback ({}) must be >= insanity_min_matches ({})",
                self.insanity_lookback, self.insanity_min_matches
            )));
        }
        if !self.score_nudge_threshold.is_finite() || self.score_nudge_threshold <= 0.0 {
            return Err(invalid(format!(
                "score_nudge_threshold must be > 0, got {}",
                self.score_nudge_threshold
            )));
        }
        if !self.score_stop_threshold.is_finite()
            || self.score_stop_threshold < self.score_nudge_threshold
        {
            return Err(invalid(format!(
                "score_stop_threshold ({}) must be >= score_nudge_threshold ({})",
                self.score_stop_threshold, self.score_nudge_threshold
            )));
        }
        if !(self.decay_rate > 0.0 && self.decay_rate < 1.0) {
            return Err(invalid(format!(
                "decay_rate must be in (0, 1), got {}",
                self.decay_rate
            )));
        }
        if self.stutter_length < 2 {
            return Err(invalid(format!(
                "stutter_length must be >= 2, got {}",
                self.stutter_length
            )));
        }
        if self.phantom_length < 2 {
            return Err(invalid(format!(
                "phantom_length must be >= 2, got {}",
                self.phantom_length
            )));
        }
        if self.ping_pong_cycles == 0 {
            return Err(invalid("ping_pong_cycles must be >= 1, got 0"));
        }
        let longest_span = self
            .stutter_length
            .max(self.phantom_length)
            .max(self.ping_pong_cycles * 2)
            .max(self.insanity_lookback + 1);
        if self.window_size < longest_span {
            return Err(invalid(format!(
                "window_size ({}) must cover the longest detector span ({longest_span})",
                self.window_size
            )));
        }
        self.weights.validate()?;
        for pattern in &self.volatile_keys {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| invalid(format!("volatile key pattern '{pattern}': {e}")))?;
        }
        if let Some(rules) = &self.failure_signatures {
            if rules.is_empty() {
                return Err(invalid("failure_signatures must not be empty when set"));
            }
            for rule in rules {
                if rule.signature.trim().is_empty() {
                    return Err(invalid("failure signature name cannot be empty"));
                }
                RegexBuilder::new(&rule.pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        invalid(format!("failure signature '{}': {e}", rule.signature))
                    })?;
            }
        }
        if !self.usd_per_token.is_finite() || self.usd_per_token < 0.0 {
            return Err(invalid(format!(
                "usd_per_token must be >= 0, got {}",
                self.usd_per_token
            )));
        }
        if self.capability_timeout_ms == 0 {
            return Err(invalid("capability_timeout_ms must be > 0"));
        }
        if self.intent_label_max_words == 0 {
            return Err(invalid("intent_label_max_words must be >= 1, got 0"));
        }
        Ok(())
    }

    /// Load from a JSON string and validate.
    pub fn from_json(json: &str) -> GuardResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| invalid(format!("JSON parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

fn invalid(message: impl Into<String>) -> GuardError {
    GuardError::Configuration(message.into())
}

/// Score contribution of each pattern detector when it matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DetectorWeights {
    #[serde(default = "default_stutter_weight")]
    pub stutter: f64,
    #[serde(default = "default_insanity_weight")]
    pub insanity: f64,
    #[serde(default = "default_phantom_progress_weight")]
    pub phantom_progress: f64,
    #[serde(default = "default_ping_pong_weight")]
    pub ping_pong: f64,
}

const fn default_stutter_weight() -> f64 {
    3.0
}

const fn default_insanity_weight() -> f64 {
    2.0
}

const fn default_phantom_progress_weight() -> f64 {
    1.0
}

const fn default_ping_pong_weight() -> f64 {
    1.5
}

impl Default for DetectorWeights {
    fn default() -> Self {
        Self {
            stutter: default_stutter_weight(),
            insanity: default_insanity_weight(),
            phantom_progress: default_phantom_progress_weight(),
            ping_pong: default_ping_pong_weight(),
        }
    }
}

impl DetectorWeights {
    fn validate(&self) -> GuardResult<()> {
        for (name, weight) in [
            ("stutter", self.stutter),
            ("insanity", self.insanity),
            ("phantom_progress", self.phantom_progress),
            ("ping_pong", self.ping_pong),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(invalid(format!(
                    "weights.{name} must be a finite value >= 0, got {weight}"
                )));
            }
        }
        Ok(())
    }
}

/// How numbers inside state snapshots are canonicalized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberCanonicalization {
    /// Collapse every number to its type class (`<int>` / `<float>`).
    #[default]
    TypeClass,
    /// Keep the literal value.
    Exact,
}

/// Precision kept for RFC 3339 / ISO date strings found in state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePrecision {
    #[default]
    Day,
    Hour,
    Minute,
}

/// One entry of a user-supplied failure signature table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRuleConfig {
    /// Canonical category, e.g. `NOT_FOUND`
    pub signature: String,
    /// Case-insensitive regex matched against the failure text
    pub pattern: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rotated JSON log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Optional capability backends used by the CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CapabilitiesConfig {
    /// Embedding backend for the insanity detector
    #[serde(default)]
    pub embedding: Option<EmbeddingBackendConfig>,

    /// Thought normalization backend for the intent guard
    #[serde(default)]
    pub normalizer: Option<NormalizerBackendConfig>,
}

/// Embedding backend selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EmbeddingBackendConfig {
    /// OpenAI-compatible `/embeddings` endpoint
    #[serde(rename = "openai")]
    OpenAi {
        #[serde(default = "default_openai_base_url")]
        base_url: String,
        #[serde(default = "default_embedding_model")]
        model: String,
        #[serde(default = "default_embedding_dimension")]
        dimension: usize,
    },
    /// Local hashed bag-of-words vectors
    HashedBagOfWords {
        #[serde(default = "default_hashed_dimension")]
        dimension: usize,
    },
}

/// Thought normalizer backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizerBackendConfig {
    /// OpenAI-compatible `/chat/completions` endpoint
    #[serde(rename = "openai")]
    OpenAi {
        #[serde(default = "default_openai_base_url")]
        base_url: String,
        #[serde(default = "default_chat_model")]
        model: String,
    },
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

const fn default_embedding_dimension() -> usize {
    1536
}

const fn default_hashed_dimension() -> usize {
    256
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
