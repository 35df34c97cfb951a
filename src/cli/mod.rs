//! Command-line interface for replaying recorded agent traces.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};

pub use commands::{config::ConfigArgs, replay::ReplayArgs};

#[derive(Parser, Debug)]
#[command(name = "loopwarden")]
#[command(about = "Runtime loop guardrail for autonomous agents", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Replay a JSONL trace through the guard and print every decision
    Replay(ReplayArgs),

    /// Print the effective configuration
    Config(ConfigArgs),
}

/// Print an error in the selected mode and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let body = serde_json::json!({
            "success": false,
            "error": format!("{err:#}"),
        });
        println!("{body}");
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}
