//! Output archives.
//!
//! Every job publishes a zip into the output repository. Archives are written
//! next to their final path and renamed into place, so a present archive is
//! always complete and the staleness checks can rely on existence alone.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;
use walkdir::WalkDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("{0} contains no files")]
    Empty(PathBuf),
}

/// A written output archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    pub sha256: String,
    pub entries: usize,
}

/// Zip every file under `src` into `dest`, with entry names relative to `src`.
///
/// Entries are sorted so identical trees produce identical archives.
pub fn zip_directory(src: &Path, dest: &Path) -> Result<ArchiveInfo, ArchiveError> {
    let mut files: Vec<(String, PathBuf)> = WalkDir::new(src)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let name = e
                .path()
                .strip_prefix(src)
                .ok()?
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            Some((name, e.into_path()))
        })
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(ArchiveError::Empty(src.to_path_buf()));
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(dest);

    let written = write_zip(&tmp, &files);
    if let Err(e) = written {
        fs::remove_file(&tmp).ok();
        return Err(e);
    }
    fs::rename(&tmp, dest)?;

    let sha256 = hash_file(dest)?;
    tracing::debug!(path = %dest.display(), entries = files.len(), "wrote archive");
    Ok(ArchiveInfo {
        path: dest.to_path_buf(),
        sha256,
        entries: files.len(),
    })
}

fn write_zip(path: &Path, files: &[(String, PathBuf)]) -> Result<(), ArchiveError> {
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());
    let mut zip = ZipWriter::new(BufWriter::new(File::create(path)?));

    for (name, source) in files {
        zip.start_file(name.as_str(), options)?;
        let mut input = File::open(source)?;
        io::copy(&mut input, &mut zip)?;
    }
    zip.finish()?.flush()?;
    Ok(())
}

fn tmp_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

fn hash_file(path: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut file = File::open(path)?;
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use zip::ZipArchive;

    #[test]
    fn test_zip_directory_sorted_relative_entries() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("vm")).unwrap();
        fs::write(src.join("vm/Thread.cpp"), "t").unwrap();
        fs::write(src.join("il2cpp-api.h"), "h").unwrap();

        let dest = dir.path().join("out/2019.4.0f1.zip");
        let info = zip_directory(&src, &dest).unwrap();

        assert_eq!(info.entries, 2);
        assert_eq!(info.sha256.len(), 64);
        assert!(!tmp_path(&dest).exists());

        let mut archive = ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert_eq!(names, vec!["il2cpp-api.h", "vm/Thread.cpp"]);
    }

    #[test]
    fn test_identical_trees_identical_hash() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.dll"), "a").unwrap();

        let first = zip_directory(&src, &dir.path().join("a.zip")).unwrap();
        let second = zip_directory(&src, &dir.path().join("b.zip")).unwrap();
        assert_eq!(first.sha256, second.sha256);
    }

    #[test]
    fn test_empty_source_is_an_error() {
        let dir = tempdir().unwrap();
        let err = zip_directory(dir.path(), &dir.path().join("x.zip")).unwrap_err();
        assert!(matches!(err, ArchiveError::Empty(_)));
        assert!(!dir.path().join("x.zip").exists());
    }
}
