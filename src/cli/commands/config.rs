//! Implementation of the `loopwarden config` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use super::load_config;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::AppConfig;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Read this YAML file instead of `.loopwarden/config.yaml`
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, serde::Serialize)]
pub struct ConfigOutput {
    #[serde(flatten)]
    pub config: AppConfig,
    #[serde(skip)]
    yaml: String,
}

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        self.yaml.trim_end().to_string()
    }
}

pub fn execute(args: &ConfigArgs, json_mode: bool) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let yaml = serde_yaml::to_string(&config).context("Failed to render configuration")?;
    output(&ConfigOutput { config, yaml }, json_mode);
    Ok(())
}
