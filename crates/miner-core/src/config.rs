//! Run configuration.
//!
//! Read from `config.toml` in the miner home. Every key is optional:
//!
//! ```toml
//! catalog_base_url = "https://download.unity3d.com/download_unity"
//! download_concurrency = 4
//! target_parallelism = 8
//! retry_delay_secs = 5
//! tmp_dir = "/var/tmp/unity-miner"
//! seven_zip = "/usr/bin/7z"
//! error_webhook = "https://chat.example.com/api/webhooks/..."
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CATALOG_BASE_URL: &str = "https://download.unity3d.com/download_unity";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MinerConfig {
    /// Root of the download CDN; catalog documents and installers live below it.
    pub catalog_base_url: String,
    /// Process-wide bound on concurrent package downloads.
    pub download_concurrency: usize,
    /// Number of target pipelines run at once.
    pub target_parallelism: usize,
    /// Fixed delay before retrying downloads after a connection reset.
    pub retry_delay_secs: u64,
    /// Parent of every per-target workspace.
    pub tmp_dir: PathBuf,
    /// 7-Zip binary for self-extracting installers.
    pub seven_zip: Option<PathBuf>,
    /// Webhook that receives an error embed when a run aborts.
    pub error_webhook: Option<String>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            catalog_base_url: DEFAULT_CATALOG_BASE_URL.to_string(),
            download_concurrency: 4,
            target_parallelism: num_cpus::get(),
            retry_delay_secs: 5,
            tmp_dir: crate::paths::tmp_path().unwrap_or_else(std::env::temp_dir),
            seven_zip: find_seven_zip(),
            error_webhook: None,
        }
    }
}

impl MinerConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse and validate a config document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.download_concurrency == 0 {
            return Err(ConfigError::Zero("download_concurrency"));
        }
        if self.target_parallelism == 0 {
            return Err(ConfigError::Zero("target_parallelism"));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

fn find_seven_zip() -> Option<PathBuf> {
    ["7z", "7za", "7zz"]
        .into_iter()
        .find_map(|name| which::which(name).ok())
}
