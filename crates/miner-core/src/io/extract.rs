//! Archive extraction module
//!
//! Upstream packages come in several containers: self-extracting Windows
//! installers, macOS flat packages, and compressed tarballs. Each is unpacked
//! into a scratch directory, then only the files matching the caller's glob
//! filters are moved into the destination.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use glob::{MatchOptions, Pattern};
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;
use zip::ZipArchive;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("expected content missing: {0}")]
    ContentMissing(String),

    #[error("{tool} exited with {status}: {output}")]
    ToolFailed {
        tool: String,
        status: String,
        output: String,
    },

    #[error("required tool not found: {0}")]
    ToolNotFound(String),

    #[error("extraction cancelled")]
    Cancelled,
}

/// Container formats we know how to unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Self-extracting installer, unpacked with 7-Zip.
    Installer,
    /// macOS flat package (xar with a gzip'd cpio payload).
    Pkg,
    TarGz,
    TarXz,
    Zip,
}

/// Detect archive format from file extension
pub fn detect_format(path: &Path) -> Option<ArchiveFormat> {
    let name = path.to_string_lossy().to_lowercase();

    if name.ends_with(".exe") {
        Some(ArchiveFormat::Installer)
    } else if name.ends_with(".pkg") {
        Some(ArchiveFormat::Pkg)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        Some(ArchiveFormat::TarGz)
    } else if name.ends_with(".tar.xz") || name.ends_with(".txz") {
        Some(ArchiveFormat::TarXz)
    } else if name.ends_with(".zip") {
        Some(ArchiveFormat::Zip)
    } else {
        None
    }
}

/// Unpacks an archive and keeps only the files a job asked for.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract the files of `archive` whose relative path matches any of
    /// `filters` into `dest`. An empty filter list keeps everything.
    ///
    /// With `flatten`, files land directly in `dest` under their file name;
    /// otherwise their relative path is preserved. Returns the written paths,
    /// sorted.
    async fn extract(
        &self,
        archive: &Path,
        dest: &Path,
        filters: &[String],
        flatten: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, ExtractError>;
}

/// [`Extractor`] using in-process decoders where possible and external tools
/// (`7z`, `xar`, `gunzip`, `cpio`, `tar`) otherwise.
#[derive(Debug, Clone, Default)]
pub struct ArchiveExtractor {
    seven_zip: Option<PathBuf>,
}

impl ArchiveExtractor {
    pub fn new(seven_zip: Option<PathBuf>) -> Self {
        Self { seven_zip }
    }

    async fn unpack(
        &self,
        archive: &Path,
        scratch: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ExtractError> {
        let format = detect_format(archive)
            .ok_or_else(|| ExtractError::UnsupportedFormat(archive.display().to_string()))?;

        match format {
            ArchiveFormat::Installer => {
                let tool = self
                    .seven_zip
                    .clone()
                    .ok_or_else(|| ExtractError::ToolNotFound("7z".to_string()))?;
                let mut cmd = Command::new(&tool);
                cmd.stdin(Stdio::null())
                    .arg("x")
                    .arg("-y")
                    .arg(format!("-o{}", scratch.display()))
                    .arg(archive);
                run_tool(cmd, "7z", cancel).await
            }
            ArchiveFormat::Pkg => extract_pkg(archive, scratch, cancel).await,
            ArchiveFormat::TarXz => {
                let mut cmd = Command::new("tar");
                cmd.stdin(Stdio::null())
                    .arg("-xJf")
                    .arg(archive)
                    .arg("-C")
                    .arg(scratch);
                run_tool(cmd, "tar", cancel).await
            }
            ArchiveFormat::TarGz => {
                let (archive, scratch) = (archive.to_path_buf(), scratch.to_path_buf());
                blocking(move || extract_tar_gz(&archive, &scratch)).await
            }
            ArchiveFormat::Zip => {
                let (archive, scratch) = (archive.to_path_buf(), scratch.to_path_buf());
                blocking(move || extract_zip(&archive, &scratch)).await
            }
        }
    }
}

#[async_trait]
impl Extractor for ArchiveExtractor {
    async fn extract(
        &self,
        archive: &Path,
        dest: &Path,
        filters: &[String],
        flatten: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, ExtractError> {
        tokio::fs::create_dir_all(dest).await?;
        let scratch = tempfile::Builder::new()
            .prefix(".unpack-")
            .tempdir_in(dest)?;

        self.unpack(archive, scratch.path(), cancel).await?;
        if cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }

        let patterns = compile_filters(filters)?;
        let (root, dest) = (scratch.path().to_path_buf(), dest.to_path_buf());
        let files = blocking(move || select_files(&root, &dest, &patterns, flatten)).await?;
        tracing::debug!(archive = %archive.display(), files = files.len(), "extracted");
        Ok(files)
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ExtractError>
where
    F: FnOnce() -> Result<T, ExtractError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ExtractError::Archive(format!("extraction task failed: {e}")))?
}

/// Run an external tool to completion, capturing stderr.
///
/// The child is killed when `cancel` fires.
async fn run_tool(
    mut cmd: Command,
    tool: &str,
    cancel: &CancellationToken,
) -> Result<(), ExtractError> {
    cmd.stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| spawn_error(e, tool))?;
    let output = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(ExtractError::Cancelled),
        out = child.wait_with_output() => out?,
    };

    if output.status.success() {
        Ok(())
    } else {
        Err(ExtractError::ToolFailed {
            tool: tool.to_string(),
            status: output.status.to_string(),
            output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn spawn_error(err: io::Error, tool: &str) -> ExtractError {
    if err.kind() == io::ErrorKind::NotFound {
        ExtractError::ToolNotFound(tool.to_string())
    } else {
        ExtractError::Io(err)
    }
}

/// Extract a macOS PKG (using xar, gunzip and cpio)
async fn extract_pkg(
    archive: &Path,
    scratch: &Path,
    cancel: &CancellationToken,
) -> Result<(), ExtractError> {
    let expanded = scratch.join(".xar");
    tokio::fs::create_dir_all(&expanded).await?;

    let mut xar = Command::new("xar");
    xar.stdin(Stdio::null())
        .arg("-xf")
        .arg(archive)
        .arg("-C")
        .arg(&expanded);
    run_tool(xar, "xar", cancel).await?;

    // Typical layout: "<Name>.pkg/Payload"
    let payload = WalkDir::new(&expanded)
        .into_iter()
        .filter_map(Result::ok)
        .find(|e| e.file_type().is_file() && e.file_name() == "Payload")
        .map(walkdir::DirEntry::into_path)
        .ok_or_else(|| ExtractError::Archive("No Payload found in pkg".to_string()))?;

    let mut gunzip = Command::new("gunzip");
    gunzip
        .arg("-c")
        .arg(&payload)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let mut gunzip = gunzip.spawn().map_err(|e| spawn_error(e, "gunzip"))?;
    let piped: Stdio = gunzip
        .stdout
        .take()
        .ok_or_else(|| ExtractError::Archive("gunzip produced no stdout".to_string()))?
        .try_into()?;

    let mut cpio = Command::new("cpio");
    cpio.arg("-i")
        .arg("-d")
        .arg("--quiet")
        .current_dir(scratch)
        .stdin(piped);
    let cpio_result = run_tool(cpio, "cpio", cancel).await;

    let gunzip_out = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(ExtractError::Cancelled),
        out = gunzip.wait_with_output() => out?,
    };
    cpio_result?;
    if !gunzip_out.status.success() {
        return Err(ExtractError::ToolFailed {
            tool: "gunzip".to_string(),
            status: gunzip_out.status.to_string(),
            output: String::from_utf8_lossy(&gunzip_out.stderr).trim().to_string(),
        });
    }

    tokio::fs::remove_dir_all(&expanded).await?;
    Ok(())
}

/// Extract a tar.gz archive to a destination directory
fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<(), ExtractError> {
    let reader = BufReader::new(File::open(archive)?);
    extract_tar(flate2::read::GzDecoder::new(reader), dest)
}

fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<(), ExtractError> {
    fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type().is_dir() {
            continue;
        }
        // `unpack_in` refuses paths that escape `dest`.
        if !entry.unpack_in(dest)? {
            let path = entry.path()?.display().to_string();
            return Err(ExtractError::Archive(format!("Invalid path in archive: {path}")));
        }
    }
    Ok(())
}

/// Extract a zip archive
fn extract_zip(archive: &Path, dest: &Path) -> Result<(), ExtractError> {
    let file = File::open(archive)?;
    let mut archive = ZipArchive::new(file).map_err(|e| ExtractError::Archive(e.to_string()))?;
    fs::create_dir_all(dest)?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| ExtractError::Archive(e.to_string()))?;
        let Some(relative) = file.enclosed_name() else {
            continue;
        };
        if file.is_dir() {
            continue;
        }

        let path = dest.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&path)?;
        io::copy(&mut file, &mut out)?;
    }
    Ok(())
}

fn compile_filters(filters: &[String]) -> Result<Vec<Pattern>, ExtractError> {
    filters
        .iter()
        .map(|f| {
            Pattern::new(f).map_err(|e| ExtractError::Archive(format!("bad filter '{f}': {e}")))
        })
        .collect()
}

/// Move matching files from `root` into `dest`.
fn select_files(
    root: &Path,
    dest: &Path,
    patterns: &[Pattern],
    flatten: bool,
) -> Result<Vec<PathBuf>, ExtractError> {
    let options = MatchOptions {
        require_literal_separator: true,
        ..MatchOptions::new()
    };
    let mut selected = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| ExtractError::Archive(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative_str = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if !patterns.is_empty()
            && !patterns
                .iter()
                .any(|p| p.matches_with(&relative_str, options))
        {
            continue;
        }

        let target = if flatten {
            match relative.file_name() {
                Some(name) => dest.join(name),
                None => continue,
            }
        } else {
            dest.join(relative)
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        if fs::rename(entry.path(), &target).is_err() {
            fs::copy(entry.path(), &target)?;
        }
        selected.push(target);
    }

    selected.sort();
    selected.dedup();
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        for (name, body) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn write_tar_gz(path: &Path, entries: &[(&str, &str)]) {
        let encoder =
            flate2::write::GzEncoder::new(File::create(path).unwrap(), flate2::Compression::fast());
        let mut builder = tar::Builder::new(encoder);
        for (name, body) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, body.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(
            detect_format(Path::new("UnitySetup64.exe")),
            Some(ArchiveFormat::Installer)
        );
        assert_eq!(
            detect_format(Path::new("Unity.tar.xz")),
            Some(ArchiveFormat::TarXz)
        );
        assert_eq!(detect_format(Path::new("a.TGZ")), Some(ArchiveFormat::TarGz));
        assert_eq!(detect_format(Path::new("Unity.pkg")), Some(ArchiveFormat::Pkg));
        assert_eq!(detect_format(Path::new("x.zip")), Some(ArchiveFormat::Zip));
        assert_eq!(detect_format(Path::new("x.dmg")), None);
    }

    #[tokio::test]
    async fn test_zip_filter_and_flatten() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("pkg.zip");
        write_zip(
            &archive,
            &[
                ("Editor/Data/Managed/UnityEngine.dll", "a"),
                ("Editor/Data/Managed/nested/Other.dll", "b"),
                ("Editor/Data/Managed/readme.txt", "c"),
            ],
        );

        let dest = dir.path().join("out");
        let files = ArchiveExtractor::default()
            .extract(
                &archive,
                &dest,
                &["Editor/Data/Managed/*.dll".to_string()],
                true,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(files, vec![dest.join("UnityEngine.dll")]);
        assert_eq!(fs::read_to_string(&files[0]).unwrap(), "a");
        // Scratch directory is gone.
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_tar_gz_keeps_relative_paths() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("pkg.tar.gz");
        write_tar_gz(
            &archive,
            &[
                ("Editor/Data/il2cpp/libil2cpp/vm/Thread.cpp", "t"),
                ("Editor/Data/il2cpp/libil2cpp/il2cpp-api.h", "h"),
                ("Editor/Data/Managed/UnityEngine.dll", "x"),
            ],
        );

        let dest = dir.path().join("out");
        let files = ArchiveExtractor::default()
            .extract(
                &archive,
                &dest,
                &["Editor/Data/il2cpp/libil2cpp/**/*".to_string()],
                false,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(files.len(), 2);
        assert!(dest.join("Editor/Data/il2cpp/libil2cpp/vm/Thread.cpp").is_file());
        assert!(!dest.join("Editor/Data/Managed").exists());
    }

    #[tokio::test]
    async fn test_installer_without_seven_zip() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("UnitySetup64.exe");
        fs::write(&archive, b"MZ").unwrap();

        let err = ArchiveExtractor::default()
            .extract(&archive, &dir.path().join("out"), &[], false, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::ToolNotFound(ref t) if t == "7z"));
    }

    #[tokio::test]
    async fn test_tool_failure_captures_stderr() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo broken payload >&2; exit 3");
        let err = run_tool(cmd, "sh", &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ExtractError::ToolFailed { tool, output, .. } => {
                assert_eq!(tool, "sh");
                assert_eq!(output, "broken payload");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_tool_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let err = run_tool(cmd, "sleep", &cancel).await.unwrap_err();
        assert!(matches!(err, ExtractError::Cancelled));
    }

    #[tokio::test]
    async fn test_missing_tool() {
        let cmd = Command::new("definitely-not-a-real-unpacker");
        let err = run_tool(cmd, "unpacker", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::ToolNotFound(_)));
    }
}
