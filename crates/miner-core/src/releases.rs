//! The list of releases to mine.
//!
//! ```toml
//! [[release]]
//! version = "2019.4.0f1"
//! id = "0af376155913"
//!
//! [[release]]
//! version = "5.2.4f1"
//! ```

use std::path::{Path, PathBuf};

use miner_schema::EditorVersion;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReleaseListError {
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
}

/// Identity of one published release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub version: EditorVersion,
    /// Content hash segment of the release's download URLs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReleaseList {
    #[serde(default)]
    pub release: Vec<Release>,
}

impl ReleaseList {
    pub async fn load(path: &Path) -> Result<Self, ReleaseListError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ReleaseListError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        toml::from_str(&content).map_err(|source| ReleaseListError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Releases to mine, newest first, limited to `only` when given.
    ///
    /// Duplicate versions keep their first entry.
    pub fn select(&self, only: Option<&EditorVersion>) -> Vec<Release> {
        let mut selected: Vec<Release> = self
            .release
            .iter()
            .filter(|r| only.is_none_or(|v| &r.version == v))
            .cloned()
            .collect();
        selected.sort_by(|a, b| b.version.cmp(&a.version));
        selected.dedup_by(|a, b| a.version == b.version);
        selected
    }
}
