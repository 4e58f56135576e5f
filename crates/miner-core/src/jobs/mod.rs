//! The concrete jobs and the helpers they share.

mod android;
mod corlibs;
mod il2cpp;
mod managed;
mod runtimes;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use miner_schema::{ComponentKind, Platform, Requirement, RequirementSet, ResolvedPackage};

pub use android::AndroidNativeJob;
pub use corlibs::CoreLibrariesJob;
pub use il2cpp::Il2CppSourceJob;
pub use managed::ManagedLibrariesJob;
pub use runtimes::SupportRuntimeJob;

use crate::io::archive::{ArchiveInfo, zip_directory};
use crate::job::{Job, JobContext, JobError};
use crate::layout::{self, Content};

/// Every job, writing into the output repository at `repo`.
pub fn default_jobs(repo: &Path) -> Vec<Arc<dyn Job>> {
    vec![
        Arc::new(ManagedLibrariesJob::new(repo)),
        Arc::new(CoreLibrariesJob::new(repo)),
        Arc::new(Il2CppSourceJob::new(repo)),
        Arc::new(AndroidNativeJob::new(repo)),
        Arc::new(SupportRuntimeJob::new(repo)),
    ]
}

/// The single set "an editor from any platform".
pub(crate) fn any_editor() -> Vec<RequirementSet> {
    vec![vec![Requirement::new(ComponentKind::Editor, Platform::Any)]]
}

/// The only package of a single-requirement job.
pub(crate) fn single<'a>(
    packages: &'a [ResolvedPackage],
    paths: &'a [PathBuf],
) -> Result<(&'a ResolvedPackage, &'a Path), JobError> {
    match (packages.first(), paths.first()) {
        (Some(package), Some(path)) => Ok((package, path.as_path())),
        _ => Err(JobError::Download {
            package: "editor".to_string(),
            message: "no package was provided".to_string(),
        }),
    }
}

/// Unpack the `content` directory of `package` into a scratch directory.
///
/// Keeps files matching `{content dir}/{pattern}`. Returns the directory to
/// archive: the scratch root when flattening, the content directory otherwise.
pub(crate) async fn unpack_content(
    ctx: &JobContext,
    label: &str,
    package: &ResolvedPackage,
    archive: &Path,
    content: Content,
    pattern: &str,
    flatten: bool,
) -> Result<PathBuf, JobError> {
    let dir = layout::lookup(content, &ctx.target.version, package.platform).ok_or_else(|| {
        JobError::ContentMissing {
            package: package.to_string(),
            path: format!("{content:?}"),
        }
    })?;

    let filter = format!("{dir}/{pattern}");
    let (scratch, files) = ctx.unpack(label, archive, &[filter], flatten).await?;
    if files.is_empty() {
        return Err(JobError::ContentMissing {
            package: package.to_string(),
            path: dir,
        });
    }

    Ok(if flatten { scratch } else { scratch.join(dir) })
}

/// Zip `src` into `dest` off the async runtime.
pub(crate) async fn write_archive(src: PathBuf, dest: PathBuf) -> Result<ArchiveInfo, JobError> {
    let info = tokio::task::spawn_blocking(move || zip_directory(&src, &dest))
        .await
        .map_err(|e| std::io::Error::other(format!("archive task failed: {e}")))??;
    Ok(info)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fakes shared by the job tests.

    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use miner_schema::{BuildTarget, ComponentKind, ModuleManifest, Platform};
    use tokio_util::sync::CancellationToken;

    use crate::io::extract::{ExtractError, Extractor};
    use crate::job::JobContext;

    /// Writes a fixed set of relative files into `dest`, applying the filters
    /// the way the real extractor does.
    #[derive(Default)]
    pub(crate) struct FakeExtractor {
        pub files: Vec<String>,
        pub calls: Mutex<Vec<(PathBuf, Vec<String>, bool)>>,
    }

    impl FakeExtractor {
        pub(crate) fn with_files(files: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                files: files.iter().map(|f| f.to_string()).collect(),
                calls: Mutex::default(),
            })
        }
    }

    #[async_trait]
    impl Extractor for FakeExtractor {
        async fn extract(
            &self,
            archive: &Path,
            dest: &Path,
            filters: &[String],
            flatten: bool,
            _cancel: &CancellationToken,
        ) -> Result<Vec<PathBuf>, ExtractError> {
            self.calls
                .lock()
                .unwrap()
                .push((archive.to_path_buf(), filters.to_vec(), flatten));

            let options = glob::MatchOptions {
                require_literal_separator: true,
                ..glob::MatchOptions::new()
            };
            let patterns: Vec<glob::Pattern> = filters
                .iter()
                .map(|f| glob::Pattern::new(f).unwrap())
                .collect();

            let mut written = Vec::new();
            for file in &self.files {
                if !patterns.is_empty() && !patterns.iter().any(|p| p.matches_with(file, options)) {
                    continue;
                }
                let target = if flatten {
                    dest.join(Path::new(file).file_name().unwrap())
                } else {
                    dest.join(file)
                };
                std::fs::create_dir_all(target.parent().unwrap())?;
                std::fs::write(&target, file.as_bytes())?;
                written.push(target);
            }
            written.sort();
            Ok(written)
        }
    }

    pub(crate) fn modular_target(version: &str, kinds: &[(Platform, &[ComponentKind])]) -> BuildTarget {
        BuildTarget::modular(
            version.parse().unwrap(),
            None,
            kinds.iter().map(|(platform, kinds)| {
                (
                    *platform,
                    ModuleManifest::from_entries(
                        kinds
                            .iter()
                            .map(|k| (*k, format!("https://cdn.example.com/{platform}/{k}.pkg"))),
                    ),
                )
            }),
        )
    }

    pub(crate) fn context(target: BuildTarget, workspace: &Path, extractor: Arc<FakeExtractor>) -> JobContext {
        JobContext {
            target: Arc::new(target),
            workspace: workspace.to_path_buf(),
            extractor,
            cancel: CancellationToken::new(),
        }
    }

    /// Entry names of a zip archive, sorted.
    pub(crate) fn zip_entries(path: &Path) -> Vec<String> {
        let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_jobs_have_unique_names() {
        let jobs = default_jobs(Path::new("/repo"));
        let mut names: Vec<&str> = jobs.iter().map(|j| j.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 5);
    }
}
