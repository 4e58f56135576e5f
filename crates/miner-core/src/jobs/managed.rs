use std::path::{Path, PathBuf};

use async_trait::async_trait;
use miner_schema::{BuildTarget, RequirementSet, ResolvedPackage};

use super::{any_editor, single, unpack_content, write_archive};
use crate::job::{Job, JobContext, JobError};
use crate::layout::Content;
use crate::paths::managed_libraries_zip;

/// Archives the editor's managed assemblies.
#[derive(Debug, Clone)]
pub struct ManagedLibrariesJob {
    repo: PathBuf,
}

impl ManagedLibrariesJob {
    pub fn new(repo: &Path) -> Self {
        Self {
            repo: repo.to_path_buf(),
        }
    }
}

#[async_trait]
impl Job for ManagedLibrariesJob {
    fn name(&self) -> &'static str {
        "managed-libraries"
    }

    fn can_run_for(&self, _target: &BuildTarget) -> bool {
        true
    }

    fn should_run_for(&self, target: &BuildTarget) -> bool {
        !managed_libraries_zip(&self.repo, &target.version).exists()
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
            Content::ManagedAssemblies,
            "*.dll",
            true,
        )
        .await?;
        ctx.check_cancelled()?;

        write_archive(dir, managed_libraries_zip(&self.repo, &ctx.target.version)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::testing::{FakeExtractor, context, modular_target, zip_entries};
    use miner_schema::{ComponentKind, Platform};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_zips_flattened_assemblies() {
        let repo = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        let target = modular_target("2019.4.0f1", &[(Platform::Linux, &[ComponentKind::Editor])]);
        let job = ManagedLibrariesJob::new(repo.path());
        assert!(job.should_run_for(&target));

        let extractor = FakeExtractor::with_files(&[
            "Editor/Data/Managed/UnityEngine.dll",
            "Editor/Data/Managed/UnityEditor.dll",
            "Editor/Data/Managed/UnityEngine/UnityEngine.CoreModule.dll",
            "Editor/Data/Managed/Unity.xml",
        ]);
        let ctx = context(target.clone(), workspace.path(), extractor);
        let package = ResolvedPackage::new(ComponentKind::Editor, Platform::Linux, "u");

        job.extract(&ctx, &[package], &[PathBuf::from("/dl/Unity.tar.xz")])
            .await
            .unwrap();

        let out = managed_libraries_zip(repo.path(), &target.version);
        assert_eq!(zip_entries(&out), vec!["UnityEditor.dll", "UnityEngine.dll"]);
        assert!(!job.should_run_for(&target));
    }

    #[tokio::test]
    async fn test_missing_assemblies_fail_the_job() {
        let repo = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        let target = modular_target("2019.4.0f1", &[(Platform::MacOS, &[ComponentKind::Editor])]);
        let extractor = FakeExtractor::with_files(&["Editor/Data/Managed/UnityEngine.dll"]);
        let ctx = context(target, workspace.path(), extractor);
        let package = ResolvedPackage::new(ComponentKind::Editor, Platform::MacOS, "u");

        let err = ManagedLibrariesJob::new(repo.path())
            .extract(&ctx, &[package], &[PathBuf::from("/dl/Unity.pkg")])
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::ContentMissing { ref path, .. } if path == "Unity.app/Contents/Managed"));
    }
}
