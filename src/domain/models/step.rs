//! Step and request types: one observed (state, action, thought, outcome) tuple.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool invocation: tool name plus its argument mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCall {
    pub tool_name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ActionCall {
    pub fn new(tool_name: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            args,
        }
    }

    /// Human-readable rendering used as embedding input.
    ///
    /// Keys are emitted in sorted order so the text is stable across calls.
    pub fn describe(&self) -> String {
        let mut keys: Vec<&String> = self.args.keys().collect();
        keys.sort();
        let rendered: Vec<String> = keys
            .iter()
            .map(|k| format!("{k}={}", render_value(&self.args[k.as_str()])))
            .collect();
        format!("{}({})", self.tool_name, rendered.join(", "))
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Result of executing an action, as reported by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure { message: String },
}

impl Outcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

/// Input to a single `check()` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckRequest {
    /// Observed state snapshot; must be a JSON object.
    pub state: Value,
    /// The agent's reasoning text preceding the action.
    #[serde(default)]
    pub thought: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    /// Tool arguments; must be a JSON object when present.
    #[serde(default)]
    pub args: Option<Value>,
    /// Which agent node/role produced this step (for ping-pong detection).
    #[serde(default)]
    pub actor: Option<String>,
    /// Outcome already observed for this action (trace replay).
    #[serde(default)]
    pub outcome: Option<Outcome>,
}

impl CheckRequest {
    pub fn new(state: Value) -> Self {
        Self {
            state,
            ..Default::default()
        }
    }

    pub fn with_thought(mut self, thought: impl Into<String>) -> Self {
        self.thought = Some(thought.into());
        self
    }

    pub fn with_action(mut self, tool_name: impl Into<String>, args: Value) -> Self {
        self.tool_name = Some(tool_name.into());
        self.args = Some(args);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }
}

/// One entry in a session ledger.
///
/// Derived fields are computed once at append time; a step is never mutated
/// after it enters the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    /// Monotonic per-session index.
    pub index: u64,
    pub observed_at: DateTime<Utc>,
    pub state: Map<String, Value>,
    pub action: Option<ActionCall>,
    pub thought: Option<String>,
    pub actor: Option<String>,
    pub outcome: Option<Outcome>,
    pub state_hash: String,
    pub action_hash: Option<String>,
    pub intent_label: Option<String>,
    pub failure_signature: Option<String>,
}
