use std::path::{Path, PathBuf};

use async_trait::async_trait;
use miner_schema::{BuildTarget, RequirementSet, ResolvedPackage};

use super::{any_editor, single, unpack_content, write_archive};
use crate::job::{Job, JobContext, JobError};
use crate::layout::Content;
use crate::paths::il2cpp_source_zip;

/// Archives the libil2cpp runtime source shipped with the editor.
#[derive(Debug, Clone)]
pub struct Il2CppSourceJob {
    repo: PathBuf,
}

impl Il2CppSourceJob {
    pub fn new(repo: &Path) -> Self {
        Self {
            repo: repo.to_path_buf(),
        }
    }
}

#[async_trait]
impl Job for Il2CppSourceJob {
    fn name(&self) -> &'static str {
        "il2cpp-source"
    }

    fn can_run_for(&self, target: &BuildTarget) -> bool {
        target.version.at_least(5, 0)
    }

    fn should_run_for(&self, target: &BuildTarget) -> bool {
        !il2cpp_source_zip(&self.repo, &target.version).exists()
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
            Content::Il2CppSource,
            "**/*",
            false,
        )
        .await?;
        ctx.check_cancelled()?;

        write_archive(dir, il2cpp_source_zip(&self.repo, &ctx.target.version)).await?;
        Ok(())
    }
}
