use dirs::home_dir;
use std::path::{Path, PathBuf};

use miner_schema::{EditorVersion, Platform};

/// Returns the miner's home directory, or None if the user's home cannot be resolved.
///
/// `UNITY_MINER_HOME` overrides the default `~/.unity-miner`.
pub fn miner_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("UNITY_MINER_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".unity-miner"))
}

/// Default config file: ~/.unity-miner/config.toml
pub fn config_path() -> Option<PathBuf> {
    miner_home().map(|h| h.join("config.toml"))
}

/// Default scratch root for per-target workspaces: ~/.unity-miner/tmp
pub fn tmp_path() -> Option<PathBuf> {
    miner_home().map(|h| h.join("tmp"))
}

/// Default release list: ~/.unity-miner/releases.toml
pub fn releases_path() -> Option<PathBuf> {
    miner_home().map(|h| h.join("releases.toml"))
}

/// Managed assemblies archive: <repo>/libraries/<version>.zip
pub fn managed_libraries_zip(repo: &Path, version: &EditorVersion) -> PathBuf {
    repo.join("libraries").join(format!("{version}.zip"))
}

/// Core library archive: <repo>/corlibs/<version>.zip
pub fn core_libraries_zip(repo: &Path, version: &EditorVersion) -> PathBuf {
    repo.join("corlibs").join(format!("{version}.zip"))
}

/// libil2cpp source archive: <repo>/libil2cpp-source/<version>.zip
pub fn il2cpp_source_zip(repo: &Path, version: &EditorVersion) -> PathBuf {
    repo.join("libil2cpp-source").join(format!("{version}.zip"))
}

/// Android native library archive: <repo>/android/<version>.zip
pub fn android_zip(repo: &Path, version: &EditorVersion) -> PathBuf {
    repo.join("android").join(format!("{version}.zip"))
}

/// Directory of runtime archives for one release: <repo>/runtimes/<version>
pub fn runtimes_dir(repo: &Path, version: &EditorVersion) -> PathBuf {
    repo.join("runtimes").join(version.to_string())
}

/// Written once every support bundle of a release was archived:
/// <repo>/runtimes/<version>/.complete
pub fn runtimes_marker(repo: &Path, version: &EditorVersion) -> PathBuf {
    runtimes_dir(repo, version).join(".complete")
}

/// One runtime variation: <repo>/runtimes/<version>/<platform>-<variant>.zip
pub fn runtime_zip(repo: &Path, version: &EditorVersion, platform: Platform, variant: &str) -> PathBuf {
    runtimes_dir(repo, version).join(format!("{platform}-{variant}.zip"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_paths() {
        let repo = Path::new("/repo");
        let version: EditorVersion = "2019.4.0f1".parse().unwrap();
        assert_eq!(
            managed_libraries_zip(repo, &version),
            PathBuf::from("/repo/libraries/2019.4.0f1.zip")
        );
        assert_eq!(
            runtime_zip(repo, &version, Platform::Linux, "linux64_player_nondevelopment_mono"),
            PathBuf::from("/repo/runtimes/2019.4.0f1/linux-linux64_player_nondevelopment_mono.zip")
        );
    }
}
