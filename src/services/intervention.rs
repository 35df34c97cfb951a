//! Nudge rendering with rotating templates.
//!
//! The template for a category is chosen by the per-session occurrence count
//! of that category, so a persistent condition does not get the same text
//! twice in a row.

use std::collections::HashMap;

use crate::domain::errors::{GuardError, GuardResult};

const STUTTER: &[&str] = &[
    "You have called {tool} with the same arguments {count} times in a row and nothing changed. Stop and choose a different action.",
    "Repeating {tool} again will not produce a new result. Re-read the last output and try another tool or different arguments.",
    "Loop detected on {tool}. Summarize what you have learned so far, then pick a new approach.",
];

const INSANITY: &[&str] = &[
    "Your recent actions are near-identical variations of the same attempt. Step back and try a fundamentally different approach.",
    "Rephrasing the same action will not change the outcome. Consider what information you are missing.",
    "You keep trying essentially the same thing with {tool}. Change strategy or ask for clarification.",
];

const PHANTOM_PROGRESS: &[&str] = &[
    "Your last actions did not change the observed state. Verify that {tool} actually has the effect you expect.",
    "The environment looks exactly the same after several different actions. Check your assumptions before continuing.",
    "No progress is being made: different actions, same state. Inspect the state directly before acting again.",
];

const PING_PONG: &[&str] = &[
    "Control keeps bouncing between the same two agents without resolution. One side should make a decision or escalate.",
    "Two agents are handing the task back and forth. Break the cycle by consolidating the work in a single step.",
    "Handoff loop detected. Summarize the disagreement and resolve it instead of passing it on again.",
];

const ACTION_REPEATED: &[&str] = &[
    "You are about to call {tool} with the exact same arguments again ({count} consecutive calls). Change the arguments or the tool.",
    "This exact {tool} call was just made. Repeating it will not help; try something else.",
    "Same action repeated. Review the previous result of {tool} before trying again.",
];

const INTENT_EXHAUSTED: &[&str] = &[
    "You have tried {count} different ways to '{intent}' and all of them failed. Try a different approach entirely.",
    "The goal '{intent}' keeps failing ({count} distinct attempts). Question the premise or gather more information first.",
    "Stop retrying variations of '{intent}'. Report what you tried and why it failed, or pursue another goal.",
];

const FALLBACK: &[&str] = &["Loop detected. Change your approach before continuing."];

/// Values substituted into template placeholders.
#[derive(Debug, Clone, Default)]
pub struct NudgeContext<'a> {
    pub tool: Option<&'a str>,
    pub count: u32,
    pub intent: Option<&'a str>,
}

/// Per-session occurrence counters, one per category.
#[derive(Debug, Clone, Default)]
pub struct OccurrenceCounters {
    counts: HashMap<String, u32>,
}

impl OccurrenceCounters {
    /// Occurrences seen so far for `category`, then increment.
    pub fn bump(&mut self, category: &str) -> u32 {
        let entry = self.counts.entry(category.to_string()).or_insert(0);
        let current = *entry;
        *entry += 1;
        current
    }

    pub fn get(&self, category: &str) -> u32 {
        self.counts.get(category).copied().unwrap_or(0)
    }
}

/// Immutable template table, injected at engine construction.
#[derive(Debug, Clone)]
pub struct InterventionManager {
    templates: HashMap<String, Vec<String>>,
}

impl Default for InterventionManager {
    fn default() -> Self {
        let templates = [
            ("stutter", STUTTER),
            ("insanity", INSANITY),
            ("phantom_progress", PHANTOM_PROGRESS),
            ("ping_pong", PING_PONG),
            ("action_repeated", ACTION_REPEATED),
            ("intent_exhausted", INTENT_EXHAUSTED),
        ]
        .into_iter()
        .map(|(category, set)| {
            (
                category.to_string(),
                set.iter().map(ToString::to_string).collect(),
            )
        })
        .collect();
        Self { templates }
    }
}

impl InterventionManager {
    /// Replace the templates of one category.
    pub fn with_templates(mut self, category: &str, templates: Vec<String>) -> GuardResult<Self> {
        let templates: Vec<String> = templates
            .into_iter()
            .filter(|t| !t.trim().is_empty())
            .collect();
        if templates.is_empty() {
            return Err(GuardError::Configuration(format!(
                "templates for '{category}' must contain at least one non-empty message"
            )));
        }
        self.templates.insert(category.to_string(), templates);
        Ok(self)
    }

    /// Render the nudge for `category` at the given occurrence count.
    pub fn render(&self, category: &str, occurrence: u32, ctx: &NudgeContext<'_>) -> String {
        let fallback: Vec<String>;
        let set = match self.templates.get(category) {
            Some(set) if !set.is_empty() => set,
            _ => {
                fallback = FALLBACK.iter().map(ToString::to_string).collect();
                &fallback
            }
        };
        let template = &set[occurrence as usize % set.len()];
        template
            .replace("{tool}", ctx.tool.unwrap_or("this tool"))
            .replace("{count}", &ctx.count.to_string())
            .replace("{intent}", ctx.intent.unwrap_or("the current goal"))
    }
}
