//! State and action fingerprinting.
//!
//! Both hashers reduce their input to a *stable projection* before hashing:
//! keys are sorted, volatile keys are dropped, and incidental values
//! (numbers, timestamps, identifiers) are folded into placeholder classes.
//! Two inputs with equal projections always hash equal.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::domain::errors::GuardResult;
use crate::domain::models::{ActionCall, DatePrecision, GuardConfig, NumberCanonicalization};

const UUID_PATTERN: &str =
    r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b";
const EMAIL_PATTERN: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b";
const NUMERIC_ID_PATTERN: &str = r"\b\d{4,}\b";
const HEX_ID_PATTERN: &str = r"\b[0-9a-fA-F]{16,}\b";
const ID_KEY_PATTERN: &str = r"(^|_)id$|Id$";

/// Truncated SHA-256 hex digest (16 chars) of `input`.
pub fn fingerprint(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hasher
        .finalize()
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Hashes state snapshots after dropping volatile keys and folding values.
#[derive(Debug, Clone)]
pub struct StateHasher {
    volatile_keys: Vec<Regex>,
    numbers: NumberCanonicalization,
    date_precision: DatePrecision,
    uuid: Regex,
}

impl StateHasher {
    pub fn new(config: &GuardConfig) -> GuardResult<Self> {
        let volatile_keys = config
            .volatile_keys
            .iter()
            .map(|pattern| RegexBuilder::new(pattern).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            volatile_keys,
            numbers: config.number_canonicalization,
            date_precision: config.date_precision,
            uuid: Regex::new(&format!("^{UUID_PATTERN}$"))?,
        })
    }

    fn is_volatile(&self, key: &str) -> bool {
        self.volatile_keys.iter().any(|re| re.is_match(key))
    }

    /// Canonical string form of the stable projection.
    pub fn project(&self, state: &Map<String, Value>) -> String {
        self.project_object(state)
    }

    /// Fingerprint of the stable projection.
    pub fn hash(&self, state: &Map<String, Value>) -> String {
        fingerprint(&self.project(state))
    }

    fn project_object(&self, map: &Map<String, Value>) -> String {
        let mut keys: Vec<&String> = map.keys().filter(|k| !self.is_volatile(k)).collect();
        keys.sort();
        let entries: Vec<String> = keys
            .iter()
            .map(|k| {
                format!(
                    "{}:{}",
                    Value::String((*k).clone()),
                    self.project_value(&map[k.as_str()])
                )
            })
            .collect();
        format!("{{{}}}", entries.join(","))
    }

    fn project_value(&self, value: &Value) -> String {
        match value {
            Value::Object(map) => self.project_object(map),
            Value::Array(items) => {
                let items: Vec<String> = items.iter().map(|v| self.project_value(v)).collect();
                format!("[{}]", items.join(","))
            }
            Value::Number(n) => match self.numbers {
                NumberCanonicalization::Exact => n.to_string(),
                NumberCanonicalization::TypeClass if n.is_f64() => "<float>".to_string(),
                NumberCanonicalization::TypeClass => "<int>".to_string(),
            },
            Value::String(s) => {
                let trimmed = s.trim();
                if self.uuid.is_match(trimmed) {
                    return "<uuid>".to_string();
                }
                if let Some(truncated) = truncate_date(trimmed, self.date_precision) {
                    return format!("<date:{truncated}>");
                }
                Value::String(trimmed.to_string()).to_string()
            }
            Value::Bool(_) | Value::Null => value.to_string(),
        }
    }
}

/// Parse common date/time shapes and render them at the configured precision.
fn truncate_date(text: &str, precision: DatePrecision) -> Option<String> {
    let format = match precision {
        DatePrecision::Day => "%Y-%m-%d",
        DatePrecision::Hour => "%Y-%m-%dT%H",
        DatePrecision::Minute => "%Y-%m-%dT%H:%M",
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc).format(format).to_string());
    }
    for naive_format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, naive_format) {
            return Some(dt.format(format).to_string());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// Hashes tool name plus arguments, masking identifier-shaped values.
#[derive(Debug, Clone)]
pub struct ActionHasher {
    mask_identifiers: bool,
    uuid: Regex,
    email: Regex,
    numeric_id: Regex,
    hex_id: Regex,
    id_key: Regex,
}

impl ActionHasher {
    pub fn new(config: &GuardConfig) -> GuardResult<Self> {
        Ok(Self {
            mask_identifiers: config.mask_identifiers,
            uuid: Regex::new(UUID_PATTERN)?,
            email: Regex::new(EMAIL_PATTERN)?,
            numeric_id: Regex::new(NUMERIC_ID_PATTERN)?,
            hex_id: Regex::new(HEX_ID_PATTERN)?,
            id_key: Regex::new(ID_KEY_PATTERN)?,
        })
    }

    /// Canonical string form of the action.
    pub fn project(&self, action: &ActionCall) -> String {
        format!(
            "{}|{}",
            action.tool_name.trim(),
            self.project_object(&action.args)
        )
    }

    pub fn hash(&self, action: &ActionCall) -> String {
        fingerprint(&self.project(action))
    }

    fn project_object(&self, map: &Map<String, Value>) -> String {
        let mut keys: Vec<&String> = map.keys().collect();
        keys.sort();
        let entries: Vec<String> = keys
            .iter()
            .map(|k| {
                format!(
                    "{}:{}",
                    Value::String((*k).clone()),
                    self.project_value(k, &map[k.as_str()])
                )
            })
            .collect();
        format!("{{{}}}", entries.join(","))
    }

    fn project_value(&self, key: &str, value: &Value) -> String {
        match value {
            Value::Object(map) => self.project_object(map),
            Value::Array(items) => {
                let items: Vec<String> = items.iter().map(|v| self.project_value(key, v)).collect();
                format!("[{}]", items.join(","))
            }
            Value::Number(n) if self.mask_identifiers && n.is_u64() && self.id_key.is_match(key) => {
                "<id>".to_string()
            }
            Value::String(s) => Value::String(self.mask(s.trim())).to_string(),
            other => other.to_string(),
        }
    }

    /// Replace identifier-shaped substrings with one placeholder per class.
    pub fn mask(&self, text: &str) -> String {
        if !self.mask_identifiers {
            return text.to_string();
        }
        let masked = self.uuid.replace_all(text, "<uuid>");
        let masked = self.email.replace_all(&masked, "<email>");
        let masked = self.hex_id.replace_all(&masked, "<hex>");
        self.numeric_id.replace_all(&masked, "<num>").into_owned()
    }
}
