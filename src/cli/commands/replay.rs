//! Implementation of the `loopwarden replay` command.
//!
//! A trace is JSON Lines: one check request per line, as accepted by
//! [`GuardEngine::check`], plus an optional `session_id` (default `replay`).
//! Blank lines are skipped.
//!
//! ```text
//! {"session_id":"a","state":{"page":1},"thought":"search","tool_name":"search","args":{"q":"x"}}
//! {"session_id":"a","state":{"page":1},"tool_name":"search","args":{"q":"x"},"outcome":{"status":"failure","message":"404 not found"}}
//! ```

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use super::load_config;
use crate::adapters::{build_embedder, build_normalizer, StaticNormalizer};
use crate::cli::output::{list_table, output, truncate, CommandOutput};
use crate::domain::models::{AppConfig, CheckRequest, Decision};
use crate::services::{GuardEngine, MetricsSnapshot};

const DEFAULT_SESSION: &str = "replay";

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// JSONL trace to replay
    pub trace: PathBuf,

    /// Read this YAML file instead of `.loopwarden/config.yaml`
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Run only the pattern detectors and loop scorer
    #[arg(long)]
    pub patterns_only: bool,

    /// YAML table mapping thoughts to intent labels; overrides the configured normalizer
    #[arg(long)]
    pub intents: Option<PathBuf>,
}

/// One line of a trace file.
#[derive(Debug, Clone, Deserialize)]
pub struct TraceLine {
    #[serde(default = "default_session")]
    pub session_id: String,
    #[serde(flatten)]
    pub request: CheckRequest,
}

fn default_session() -> String {
    DEFAULT_SESSION.to_string()
}

/// Parse a whole trace, reporting the 1-based line number of the first bad line.
pub fn parse_trace(content: &str) -> Result<Vec<TraceLine>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid trace line {}", i + 1))
        })
        .collect()
}

/// Build an engine with the capabilities selected in configuration.
pub fn build_engine(config: &AppConfig, intents: Option<&Path>) -> Result<GuardEngine> {
    let mut builder = GuardEngine::builder(config.guard.clone());

    if let Some(embedding) = &config.capabilities.embedding {
        builder = builder.embedder(build_embedder(embedding).context("Failed to build embedder")?);
    }

    if let Some(path) = intents {
        let normalizer = StaticNormalizer::from_yaml_file(path)
            .with_context(|| format!("Failed to load intents from {}", path.display()))?;
        builder = builder.normalizer(std::sync::Arc::new(normalizer));
    } else if let Some(normalizer) = &config.capabilities.normalizer {
        builder = builder.normalizer(
            build_normalizer(normalizer, config.guard.intent_label_max_words)
                .context("Failed to build thought normalizer")?,
        );
    }

    builder.build().context("Failed to build guard engine")
}

/// Feed every trace line through the engine, in order.
pub async fn replay(
    engine: &GuardEngine,
    lines: Vec<TraceLine>,
    patterns_only: bool,
) -> Result<Vec<Decision>> {
    let mut decisions = Vec::with_capacity(lines.len());
    for (i, line) in lines.into_iter().enumerate() {
        let result = if patterns_only {
            engine.check_patterns(&line.session_id, line.request).await
        } else {
            engine.check(&line.session_id, line.request).await
        };
        decisions.push(result.with_context(|| format!("Trace entry {} was rejected", i + 1))?);
    }
    Ok(decisions)
}

#[derive(Debug, Serialize)]
pub struct ReplayOutput {
    pub decisions: Vec<Decision>,
    pub metrics: MetricsSnapshot,
}

impl CommandOutput for ReplayOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["session", "step", "verdict", "reason", "score", "intent", "message"]);
        for decision in &self.decisions {
            let message = decision
                .nudge_message
                .as_deref()
                .unwrap_or(decision.message.as_str());
            table.add_row(vec![
                decision.session_id.clone(),
                decision.step_index.to_string(),
                decision.verdict.to_string(),
                decision.reason.category().to_string(),
                format!("{:.2}", decision.score),
                decision.intent_label.clone().unwrap_or_else(|| "-".to_string()),
                truncate(message, 72),
            ]);
        }
        format!(
            "{table}\n\n{} blocked, {} warned, ~{} tokens saved (${:.4})",
            self.metrics.blocks,
            self.metrics.warns,
            self.metrics.tokens_saved,
            self.metrics.cost_saved_usd
        )
    }
}

impl ReplayOutput {
    /// One JSON object per decision, then one for the metrics.
    fn print_json_lines(&self) -> Result<()> {
        for decision in &self.decisions {
            println!("{}", serde_json::to_string(decision)?);
        }
        println!(
            "{}",
            serde_json::to_string(&serde_json::json!({ "metrics": self.metrics }))?
        );
        Ok(())
    }
}

pub async fn execute(args: &ReplayArgs, json_mode: bool) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let engine = build_engine(&config, args.intents.as_deref())?;

    let content = tokio::fs::read_to_string(&args.trace)
        .await
        .with_context(|| format!("Failed to read trace {}", args.trace.display()))?;
    let lines = parse_trace(&content)?;
    info!(
        entries = lines.len(),
        patterns_only = args.patterns_only,
        embedder = engine.has_embedder(),
        normalizer = engine.has_normalizer(),
        "Replaying trace"
    );

    let decisions = replay(&engine, lines, args.patterns_only).await?;
    let result = ReplayOutput {
        decisions,
        metrics: engine.metrics(),
    };

    if json_mode {
        result.print_json_lines()
    } else {
        output(&result, false);
        Ok(())
    }
}
