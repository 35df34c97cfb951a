//! Failure signatures and failure records.

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::BTreeSet;

use super::config::SignatureRuleConfig;
use crate::domain::errors::GuardResult;

/// Signature assigned when no rule matches a failure text.
pub const UNKNOWN_FAILURE: &str = "UNKNOWN_FAILURE";

/// Built-in ordered rule set. First match wins, so narrower rules sit above
/// the broad ones they overlap with.
const DEFAULT_RULES: &[(&str, &str)] = &[
    ("RATE_LIMIT", r"rate.?limit|too many requests|\b429\b|throttl|quota exceeded"),
    ("TIMEOUT", r"timed? ?out|timeout|deadline exceeded|\b504\b|\b408\b"),
    ("AUTHENTICATION_FAILED", r"unauthori[sz]ed|\b401\b|authentication failed|invalid (api )?key|invalid token|not authenticated"),
    ("TOKEN_EXPIRED", r"token (has )?expired|session expired|expired credentials"),
    ("PERMISSION_DENIED", r"permission denied|forbidden|\b403\b|access denied|not permitted|insufficient (privileges|permissions)"),
    ("NOT_FOUND", r"not found|\b404\b|no such (file|directory|key|record|entity)|does not exist|doesn't exist|unknown (id|resource)|no results"),
    ("ALREADY_EXISTS", r"already exists|duplicate key|\b409\b|conflict"),
    ("VALIDATION_ERROR", r"validation (error|failed)|invalid (argument|parameter|input|value|request)|\b422\b|unprocessable"),
    ("MISSING_PARAMETER", r"missing (required )?(argument|parameter|field)|required (argument|parameter|field)"),
    ("BAD_REQUEST", r"bad request|\b400\b|malformed"),
    ("TYPE_ERROR", r"type ?error|expected (a |an )?(string|integer|number|object|array|boolean)|mismatched types"),
    ("PARSE_ERROR", r"parse error|failed to parse|unexpected token|syntax error|invalid json|json decode"),
    ("ENCODING_ERROR", r"encoding|utf-?8|invalid byte sequence|codec"),
    ("SCHEMA_MISMATCH", r"schema (mismatch|violation|error)|does not match schema"),
    ("PAYLOAD_TOO_LARGE", r"too large|\b413\b|size limit|exceeds (the )?maximum (size|length)"),
    ("CONTEXT_LENGTH_EXCEEDED", r"context length|context window|maximum context|too many tokens"),
    ("CONTENT_FILTERED", r"content (policy|filter)|safety (system|filter)|flagged"),
    ("MODEL_OVERLOADED", r"overloaded|\b529\b|model (is )?busy"),
    ("SERVICE_UNAVAILABLE", r"service unavailable|\b503\b|temporarily unavailable|maintenance"),
    ("BAD_GATEWAY", r"bad gateway|\b502\b|upstream"),
    ("INTERNAL_SERVER_ERROR", r"internal server error|\b500\b|internal error"),
    ("CONNECTION_REFUSED", r"connection refused|econnrefused"),
    ("CONNECTION_RESET", r"connection reset|econnreset|broken pipe|connection closed"),
    ("DNS_FAILURE", r"name resolution|dns|could not resolve|getaddrinfo|unknown host"),
    ("TLS_ERROR", r"tls|ssl|certificate"),
    ("NETWORK_ERROR", r"network (error|unreachable)|host unreachable|no route to host"),
    ("DISK_FULL", r"no space left|disk full|quota"),
    ("FILE_LOCKED", r"file (is )?locked|resource busy|ebusy|being used by another process"),
    ("READ_ONLY", r"read-?only"),
    ("IS_DIRECTORY", r"is a directory|eisdir"),
    ("NOT_A_DIRECTORY", r"not a directory|enotdir"),
    ("PATH_TOO_LONG", r"path too long|name too long"),
    ("OUT_OF_MEMORY", r"out of memory|\boom\b|memory (error|exhausted)|cannot allocate"),
    ("STACK_OVERFLOW", r"stack overflow|recursion (depth|limit)"),
    ("DEADLOCK", r"deadlock"),
    ("LOCK_TIMEOUT", r"lock (wait )?timeout|could not obtain lock"),
    ("DATABASE_ERROR", r"sql|database|constraint (failed|violation)|foreign key"),
    ("COMMAND_NOT_FOUND", r"command not found|not recognized as an internal or external command|executable not found"),
    ("NONZERO_EXIT", r"exit (code|status) [1-9]|exited with|non-?zero exit"),
    ("COMPILATION_ERROR", r"compil(e|ation) (error|failed)|build failed|cannot find (symbol|module)"),
    ("TEST_FAILURE", r"tests? failed|assertion (failed|error)|assert"),
    ("IMPORT_ERROR", r"import ?error|module not found|no module named|cannot import"),
    ("ATTRIBUTE_ERROR", r"attribute ?error|has no attribute|undefined method"),
    ("KEY_ERROR", r"key ?error|missing key|no such key"),
    ("INDEX_ERROR", r"index ?error|index out of (range|bounds)|out of range"),
    ("NULL_REFERENCE", r"null pointer|null reference|none ?type|undefined is not|cannot read propert"),
    ("DIVISION_BY_ZERO", r"division by zero|divide by zero|zerodivision"),
    ("UNSUPPORTED_OPERATION", r"not supported|unsupported|not implemented|\b501\b"),
    ("METHOD_NOT_ALLOWED", r"method not allowed|\b405\b"),
    ("PRECONDITION_FAILED", r"precondition failed|\b412\b|if-match"),
    ("PAYMENT_REQUIRED", r"payment required|\b402\b|insufficient (funds|credits|balance)|billing"),
    ("CANCELLED", r"cancel(l)?ed|aborted|interrupted"),
    ("TOOL_NOT_FOUND", r"unknown tool|no such tool|tool not (found|available)"),
    ("EMPTY_RESULT", r"empty (result|response|output)|returned nothing|no data"),
    ("INVALID_STATE", r"invalid state|illegal state|not ready|precondition"),
    ("DEPENDENCY_FAILED", r"dependency (failed|error)|upstream (task|step) failed"),
    ("SANDBOX_VIOLATION", r"sandbox|seccomp|operation not permitted"),
];

/// One compiled classification rule.
#[derive(Debug, Clone)]
pub struct SignatureRule {
    pub signature: String,
    pub pattern: Regex,
}

/// Immutable, ordered table mapping failure texts to canonical signatures.
#[derive(Debug, Clone)]
pub struct SignatureTable {
    rules: Vec<SignatureRule>,
}

impl SignatureTable {
    /// Compile a table from configured rules, preserving their order.
    pub fn from_rules(rules: &[SignatureRuleConfig]) -> GuardResult<Self> {
        let compiled = rules
            .iter()
            .map(|rule| {
                Ok(SignatureRule {
                    signature: rule.signature.trim().to_uppercase(),
                    pattern: RegexBuilder::new(&rule.pattern)
                        .case_insensitive(true)
                        .build()?,
                })
            })
            .collect::<GuardResult<Vec<_>>>()?;
        Ok(Self { rules: compiled })
    }

    /// Built-in table, or the configured override when one is given.
    pub fn from_config(overrides: Option<&[SignatureRuleConfig]>) -> GuardResult<Self> {
        match overrides {
            Some(rules) => Self::from_rules(rules),
            None => Self::from_rules(&Self::default_rule_configs()),
        }
    }

    /// The built-in rules as plain configuration entries.
    pub fn default_rule_configs() -> Vec<SignatureRuleConfig> {
        DEFAULT_RULES
            .iter()
            .map(|(signature, pattern)| SignatureRuleConfig {
                signature: (*signature).to_string(),
                pattern: (*pattern).to_string(),
            })
            .collect()
    }

    /// Classify a failure text; first match wins.
    pub fn classify(&self, text: &str) -> &str {
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(text))
            .map_or(UNKNOWN_FAILURE, |rule| rule.signature.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Cumulative failure history for one key (an action hash or an intent label).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub key: String,
    pub failure_count: u32,
    /// Distinct action hashes that failed under this key.
    pub attempted_actions: BTreeSet<String>,
    pub first_seen: u64,
    pub last_seen: u64,
    pub last_signature: String,
}

impl FailureRecord {
    pub fn new(key: impl Into<String>, index: u64, signature: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            failure_count: 0,
            attempted_actions: BTreeSet::new(),
            first_seen: index,
            last_seen: index,
            last_signature: signature.into(),
        }
    }

    pub fn distinct_attempts(&self) -> usize {
        self.attempted_actions.len()
    }
}
