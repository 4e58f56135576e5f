use std::path::{Path, PathBuf};

use async_trait::async_trait;
use miner_schema::{BuildTarget, ComponentKind, Platform, Requirement, RequirementSet, ResolvedPackage};

use super::{unpack_content, write_archive};
use crate::job::{Job, JobContext, JobError};
use crate::layout::Content;
use crate::paths::{runtime_zip, runtimes_dir, runtimes_marker};

const SUPPORT_KINDS: [ComponentKind; 3] = [
    ComponentKind::WindowsSupport,
    ComponentKind::LinuxSupport,
    ComponentKind::MacSupport,
];

/// Archives every player variation of the standalone support bundles.
///
/// Runs per package: each support bundle is mined as soon as it arrives. The
/// release counts as mined only once the completion marker is written.
#[derive(Debug, Clone)]
pub struct SupportRuntimeJob {
    repo: PathBuf,
}

impl SupportRuntimeJob {
    pub fn new(repo: &Path) -> Self {
        Self {
            repo: repo.to_path_buf(),
        }
    }

    async fn mine_bundle(
        &self,
        ctx: &JobContext,
        package: &ResolvedPackage,
        archive: &Path,
    ) -> Result<usize, JobError> {
        let Some(runtime_platform) = package.kind.supported_platform() else {
            return Err(JobError::ContentMissing {
                package: package.to_string(),
                path: "not a support bundle".to_string(),
            });
        };

        let label = format!("{}-{}", self.name(), package.kind);
        let variations = unpack_content(
            ctx,
            &label,
            package,
            archive,
            Content::SupportVariations(package.kind),
            "**/*",
            false,
        )
        .await?;

        let mut variants = Vec::new();
        let mut entries = tokio::fs::read_dir(&variations).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                variants.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
            }
        }
        variants.sort();

        for (variant, dir) in &variants {
            ctx.check_cancelled()?;
            let dest = runtime_zip(&self.repo, &ctx.target.version, runtime_platform, variant);
            write_archive(dir.clone(), dest).await?;
        }
        Ok(variants.len())
    }
}

#[async_trait]
impl Job for SupportRuntimeJob {
    fn name(&self) -> &'static str {
        "support-runtimes"
    }

    fn can_run_for(&self, target: &BuildTarget) -> bool {
        !target.monolithic && SUPPORT_KINDS.iter().any(|k| target.publishes(*k))
    }

    fn should_run_for(&self, target: &BuildTarget) -> bool {
        !runtimes_marker(&self.repo, &target.version).exists()
    }

    fn requirement_sets(&self, _target: &BuildTarget) -> Vec<RequirementSet> {
        vec![
            SUPPORT_KINDS
                .iter()
                .map(|k| Requirement::optional(*k, Platform::Any))
                .collect(),
        ]
    }

    fn run_incrementally(&self) -> bool {
        true
    }

    async fn extract(
        &self,
        ctx: &JobContext,
        packages: &[ResolvedPackage],
        paths: &[PathBuf],
    ) -> Result<(), JobError> {
        for (package, archive) in packages.iter().zip(paths) {
            let count = self.mine_bundle(ctx, package, archive).await?;
            tracing::debug!(
                version = %ctx.target.version,
                %package,
                variants = count,
                "archived runtime variations"
            );
        }
        Ok(())
    }

    async fn complete(&self, ctx: &JobContext) -> Result<(), JobError> {
        let version = &ctx.target.version;
        tokio::fs::create_dir_all(runtimes_dir(&self.repo, version)).await?;
        tokio::fs::write(runtimes_marker(&self.repo, version), b"").await?;
        Ok(())
    }
}
