//! Subcommand implementations.

pub mod config;
pub mod replay;

use anyhow::{Context, Result};
use std::path::Path;

use crate::domain::models::AppConfig;
use crate::infrastructure::config::ConfigLoader;

/// Load configuration from an explicit file, or from the standard hierarchy.
pub(crate) fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => ConfigLoader::load().context("Failed to load configuration"),
    }
}
