use std::path::{Path, PathBuf};

use async_trait::async_trait;
use miner_schema::{BuildTarget, ComponentKind, Platform, Requirement, RequirementSet, ResolvedPackage};

use super::{single, unpack_content, write_archive};
use crate::job::{Job, JobContext, JobError};
use crate::layout::Content;
use crate::paths::android_zip;

/// Archives the Android player's native libraries and their debug symbols.
#[derive(Debug, Clone)]
pub struct AndroidNativeJob {
    repo: PathBuf,
}

impl AndroidNativeJob {
    pub fn new(repo: &Path) -> Self {
        Self {
            repo: repo.to_path_buf(),
        }
    }
}

#[async_trait]
impl Job for AndroidNativeJob {
    fn name(&self) -> &'static str {
        "android-native"
    }

    fn can_run_for(&self, target: &BuildTarget) -> bool {
        !target.monolithic && target.publishes(ComponentKind::Android)
    }

    fn should_run_for(&self, target: &BuildTarget) -> bool {
        !android_zip(&self.repo, &target.version).exists()
    }

    /// Any host's Android module will do; Linux tarballs are the cheapest.
    fn requirement_sets(&self, _target: &BuildTarget) -> Vec<RequirementSet> {
        [Platform::Linux, Platform::MacOS, Platform::Windows]
            .into_iter()
            .map(|p| vec![Requirement::new(ComponentKind::Android, p)])
            .collect()
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
            Content::AndroidVariations,
            "**/*.so",
            false,
        )
        .await?;
        ctx.check_cancelled()?;

        write_archive(dir, android_zip(&self.repo, &ctx.target.version)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::testing::{FakeExtractor, context, modular_target, zip_entries};
    use tempfile::tempdir;

    #[test]
    fn test_applicability() {
        let job = AndroidNativeJob::new(Path::new("/repo"));
        let with = modular_target(
            "2019.4.0f1",
            &[(Platform::Windows, &[ComponentKind::Editor, ComponentKind::Android])],
        );
        let without = modular_target("2019.4.0f1", &[(Platform::Windows, &[ComponentKind::Editor])]);
        let legacy = BuildTarget::monolithic("5.2.0f1".parse().unwrap(), None);

        assert!(job.can_run_for(&with));
        assert!(!job.can_run_for(&without));
        assert!(!job.can_run_for(&legacy));
        assert_eq!(job.requirement_sets(&with).len(), 3);
    }

    #[tokio::test]
    async fn test_keeps_libraries_and_symbols() {
        let repo = tempdir().unwrap();
        let workspace = tempdir().unwrap();
        let target = modular_target("2019.4.0f1", &[(Platform::Windows, &[ComponentKind::Android])]);
        let extractor = FakeExtractor::with_files(&[
            "Variations/il2cpp/Release/Libs/arm64-v8a/libunity.so",
            "Variations/il2cpp/Release/Symbols/arm64-v8a/libunity.sym.so",
            "Variations/il2cpp/Release/Classes/classes.jar",
        ]);
        let ctx = context(target.clone(), workspace.path(), extractor);
        let package = ResolvedPackage::new(ComponentKind::Android, Platform::Windows, "u");

        AndroidNativeJob::new(repo.path())
            .extract(&ctx, &[package], &[PathBuf::from("/dl/UnitySetup-Android.exe")])
            .await
            .unwrap();

        assert_eq!(
            zip_entries(&android_zip(repo.path(), &target.version)),
            vec![
                "il2cpp/Release/Libs/arm64-v8a/libunity.so",
                "il2cpp/Release/Symbols/arm64-v8a/libunity.sym.so",
            ]
        );
    }
}
