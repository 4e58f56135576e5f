//! unity-miner - mines managed libraries, core libraries, IL2CPP source,
//! Android native libraries and standalone runtimes from editor releases.
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
//!
//! # Directory Layout
//!
//! ```text
//! ~/.unity-miner/
//! ├── config.toml     # Optional settings
//! ├── releases.toml   # Releases to mine
//! └── tmp/            # Per-target workspaces, removed after each target
//! ```

pub mod report;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use miner_core::MinerConfig;
use miner_schema::EditorVersion;

#[derive(Debug, Parser)]
#[command(name = "unity-miner")]
#[command(author, version, about = "Mine libraries and runtimes from editor releases")]
pub struct Cli {
    /// Only mine this release (e.g. 2019.4.0f1)
    #[arg(id = "selector", value_name = "VERSION")]
    pub selector: Option<String>,

    /// Output repository root
    #[arg(long, env = "UNITY_MINER_REPO", default_value = ".")]
    pub repo: PathBuf,

    /// Config file [default: ~/.unity-miner/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Release list [default: ~/.unity-miner/releases.toml]
    #[arg(long)]
    pub releases: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// The version selector, parsed.
    pub fn selected_version(&self) -> Result<Option<EditorVersion>> {
        self.selector
            .as_deref()
            .map(|v| {
                v.parse::<EditorVersion>()
                    .with_context(|| format!("Invalid version '{v}'"))
            })
            .transpose()
    }

    pub fn config_path(&self) -> Result<PathBuf> {
        self.config
            .clone()
            .or_else(miner_core::config_path)
            .context("Could not determine the config file location")
    }

    pub fn releases_path(&self) -> Result<PathBuf> {
        self.releases
            .clone()
            .or_else(miner_core::releases_path)
            .context("Could not determine the release list location")
    }

    /// Load the config file.
    pub async fn load_config(&self) -> Result<MinerConfig> {
        let path = self.config_path()?;
        MinerConfig::load(&path)
            .await
            .with_context(|| format!("Failed to load config from {}", path.display()))
    }
}
