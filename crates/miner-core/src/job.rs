//! The contract every extraction job implements.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use miner_schema::{BuildTarget, RequirementSet, ResolvedPackage};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::io::archive::ArchiveError;
use crate::io::extract::{ExtractError, Extractor};

/// Failure of a single job. Never affects sibling jobs of the same target.
#[derive(Error, Debug)]
pub enum JobError {
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("{package} is missing expected content at {path}")]
    ContentMissing { package: String, path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("writing output archive failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("download of {package} failed: {message}")]
    Download { package: String, message: String },

    #[error("cancelled")]
    Cancelled,

    #[error("job panicked")]
    Panicked,
}

impl JobError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Extract(ExtractError::Cancelled)
        )
    }
}

/// Everything a job needs while extracting for one target.
///
/// The workspace directory is shared by every job of the target and deleted
/// once all of them finish.
#[derive(Clone)]
pub struct JobContext {
    pub target: Arc<BuildTarget>,
    pub workspace: PathBuf,
    pub extractor: Arc<dyn Extractor>,
    pub cancel: CancellationToken,
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("target", &self.target.version)
            .field("workspace", &self.workspace)
            .finish_non_exhaustive()
    }
}

impl JobContext {
    /// A fresh directory under the workspace for `label`.
    ///
    /// Any previous content is removed first so incremental jobs can reuse a
    /// label per package without seeing stale files.
    pub async fn scratch_dir(&self, label: &str) -> std::io::Result<PathBuf> {
        let dir = self.workspace.join(label);
        if tokio::fs::try_exists(&dir).await? {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Unpack the files of `archive` matching `filters` into a scratch dir.
    pub async fn unpack(
        &self,
        label: &str,
        archive: &Path,
        filters: &[String],
        flatten: bool,
    ) -> Result<(PathBuf, Vec<PathBuf>), JobError> {
        let dir = self.scratch_dir(label).await?;
        let files = self
            .extractor
            .extract(archive, &dir, filters, flatten, &self.cancel)
            .await?;
        Ok((dir, files))
    }

    pub fn check_cancelled(&self) -> Result<(), JobError> {
        if self.cancel.is_cancelled() {
            Err(JobError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A unit of work that mines one kind of output from a target's packages.
#[async_trait]
pub trait Job: Send + Sync {
    /// Stable name used in logs and summaries.
    fn name(&self) -> &'static str;

    /// Whether this job applies to `target` at all.
    fn can_run_for(&self, target: &BuildTarget) -> bool;

    /// Whether this job's output for `target` is missing and must be produced.
    fn should_run_for(&self, target: &BuildTarget) -> bool;

    /// Alternative requirement sets, in preference order.
    fn requirement_sets(&self, target: &BuildTarget) -> Vec<RequirementSet>;

    /// When true, [`Job::extract`] is called once per package as soon as that
    /// package is downloaded, in no particular order.
    fn run_incrementally(&self) -> bool {
        false
    }

    /// Produce the job's output from the downloaded packages.
    ///
    /// `packages` and `paths` are parallel and follow the requirement order of
    /// the chosen set. Incremental jobs receive one package per call.
    async fn extract(
        &self,
        ctx: &JobContext,
        packages: &[ResolvedPackage],
        paths: &[PathBuf],
    ) -> Result<(), JobError>;

    /// Called once after every [`Job::extract`] call of the run succeeded.
    ///
    /// Output spread over several calls is only marked complete here, so a
    /// failed or cancelled run stays stale.
    async fn complete(&self, _ctx: &JobContext) -> Result<(), JobError> {
        Ok(())
    }
}

impl std::fmt::Debug for dyn Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("name", &self.name()).finish()
    }
}
