//! Where things live inside an unpacked package.
//!
//! Pure lookups from `(content, version, platform)` to a path relative to the
//! unpack root. Paths use `/` and never start or end with a separator.

use miner_schema::{ComponentKind, EditorVersion, Platform};

/// The pieces of a package that jobs mine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Content {
    /// Engine and editor managed assemblies.
    ManagedAssemblies,
    /// The bundled Mono class libraries.
    CoreLibraries,
    /// The libil2cpp runtime source tree.
    Il2CppSource,
    /// Android player variations (native libraries and symbols).
    AndroidVariations,
    /// Player variations of the standalone support bundle of the given kind.
    SupportVariations(ComponentKind),
}

/// Relative path of `content` inside a package hosted on `platform`.
///
/// `None` when the release does not ship that content, or for
/// [`Platform::Any`].
pub fn lookup(content: Content, version: &EditorVersion, platform: Platform) -> Option<String> {
    if !platform.is_concrete() {
        return None;
    }

    match content {
        Content::ManagedAssemblies => Some(format!("{}/Managed", data_root(version, platform))),
        Content::CoreLibraries => Some(format!(
            "{}/{}",
            data_root(version, platform),
            corlib_dir(version, platform)
        )),
        Content::Il2CppSource => version
            .at_least(5, 0)
            .then(|| format!("{}/il2cpp/libil2cpp", data_root(version, platform))),
        Content::AndroidVariations => Some(variations_root(platform, "AndroidPlayer")),
        Content::SupportVariations(kind) => {
            let engine = match kind {
                ComponentKind::WindowsSupport => "WindowsStandaloneSupport",
                ComponentKind::LinuxSupport => "LinuxStandaloneSupport",
                ComponentKind::MacSupport => "MacStandaloneSupport",
                ComponentKind::Editor | ComponentKind::Android => return None,
            };
            Some(variations_root(platform, engine))
        }
    }
}

/// Module installers for Linux unpack relative to the editor install; the
/// others unpack at the engine's own root.
fn variations_root(platform: Platform, engine: &str) -> String {
    match platform {
        Platform::Linux => format!("Editor/Data/PlaybackEngines/{engine}/Variations"),
        _ => "Variations".to_string(),
    }
}

/// Root of the editor's data directory.
fn data_root(version: &EditorVersion, platform: Platform) -> &'static str {
    match platform {
        Platform::MacOS if version.before(2018, 3) => "Unity.app/Contents/Frameworks",
        Platform::MacOS => "Unity.app/Contents",
        _ => "Editor/Data",
    }
}

fn corlib_dir(version: &EditorVersion, platform: Platform) -> String {
    if version.before(2017, 1) {
        return "Mono/lib/mono/2.0".to_string();
    }
    if version.before(2021, 2) {
        return "MonoBleedingEdge/lib/mono/4.5".to_string();
    }
    let flavor = match platform {
        Platform::Windows => "win32",
        Platform::MacOS => "macos",
        _ => "linux",
    };
    format!("MonoBleedingEdge/lib/mono/unityjit-{flavor}")
}
