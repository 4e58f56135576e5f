use std::path::{Path, PathBuf};

use async_trait::async_trait;
use miner_schema::{BuildTarget, RequirementSet, ResolvedPackage};

use super::{any_editor, single, unpack_content, write_archive};
use crate::job::{Job, JobContext, JobError};
use crate::layout::Content;
use crate::paths::core_libraries_zip;

/// Archives the Mono class libraries bundled with the editor.
#[derive(Debug, Clone)]
pub struct CoreLibrariesJob {
    repo: PathBuf,
}

impl CoreLibrariesJob {
    pub fn new(repo: &Path) -> Self {
        Self {
            repo: repo.to_path_buf(),
        }
    }
}

#[async_trait]
impl Job for CoreLibrariesJob {
    fn name(&self) -> &'static str {
        "core-libraries"
    }

    fn can_run_for(&self, _target: &BuildTarget) -> bool {
        true
    }

    fn should_run_for(&self, target: &BuildTarget) -> bool {
        !core_libraries_zip(&self.repo, &target.version).exists()
    }

    fn requirement_sets(&self, _target: &BuildTarget) -> Vec<RequirementSet> {
        any_editor()
    }

    async fn extract(
        &self,
        ctx: &JobContext,
        packages: &[ResolvedPackage],
        paths: &[PathBuf],
    ) -> Result<(), JobError> {
        let (package, archive) = single(packages, paths)?;
        let dir = unpack_content(
            ctx,
            self.name(),
            package,
            archive,
            Content::CoreLibraries,
            "*.dll",
            true,
        )
        .await?;
        ctx.check_cancelled()?;

        write_archive(dir, core_libraries_zip(&self.repo, &ctx.target.version)).await?;
        Ok(())
    }
}
