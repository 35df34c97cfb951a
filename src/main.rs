//! Loopwarden CLI entry point.

use clap::Parser;

use loopwarden::cli::commands::{config, replay};
use loopwarden::cli::{handle_error, Cli, Commands};
use loopwarden::infrastructure::config::ConfigLoader;
use loopwarden::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config_path = match &cli.command {
        Commands::Replay(args) => args.config.clone(),
        Commands::Config(args) => args.config.clone(),
    };
    // Configuration errors are reported by the command itself.
    let logging = match config_path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
    .map(|config| config.logging)
    .unwrap_or_default();
    let _logger = match LoggerImpl::init(&logging) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("warning: logging disabled: {err:#}");
            None
        }
    };

    let result = match &cli.command {
        Commands::Replay(args) => replay::execute(args, cli.json).await,
        Commands::Config(args) => config::execute(args, cli.json),
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
