use std::collections::BTreeMap;

use crate::manifest::ModuleManifest;
use crate::platform::{ComponentKind, Platform};
use crate::version::EditorVersion;

/// One mined editor release and the modules each host platform publishes for it.
///
/// Read-only for the duration of a run; every planner and job operation is
/// keyed on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    pub version: EditorVersion,
    /// Content hash used in download paths, when the release has one.
    pub id: Option<String>,
    /// Whether every platform component ships in one bundled installer.
    pub monolithic: bool,
    manifests: BTreeMap<Platform, ModuleManifest>,
}

impl BuildTarget {
    /// A release whose components ship as separate installers.
    ///
    /// Empty manifests are dropped so that `has_catalog` only reports
    /// platforms with real data.
    pub fn modular(
        version: EditorVersion,
        id: Option<String>,
        manifests: impl IntoIterator<Item = (Platform, ModuleManifest)>,
    ) -> Self {
        Self {
            version,
            id,
            monolithic: false,
            manifests: manifests
                .into_iter()
                .filter(|(p, m)| p.is_concrete() && !m.is_empty())
                .collect(),
        }
    }

    /// A legacy release distributed as one omnibus Windows installer.
    pub fn monolithic(version: EditorVersion, id: Option<String>) -> Self {
        Self {
            version,
            id,
            monolithic: true,
            manifests: BTreeMap::new(),
        }
    }

    /// The catalog document `platform` published for this release.
    pub fn manifest(&self, platform: Platform) -> Option<&ModuleManifest> {
        self.manifests.get(&platform)
    }

    /// Whether `platform` published a catalog document for this release.
    pub fn has_catalog(&self, platform: Platform) -> bool {
        self.manifests.contains_key(&platform)
    }

    /// Whether any platform lists a module of `kind`.
    pub fn publishes(&self, kind: ComponentKind) -> bool {
        self.manifests
            .iter()
            .any(|(p, m)| kind.is_published_by(*p) && m.url(kind).is_some())
    }

    /// Short identifier for logs: the version, plus the hash when known.
    pub fn label(&self) -> String {
        match &self.id {
            Some(id) => format!("{} ({id})", self.version),
            None => self.version.to_string(),
        }
    }
}

impl std::fmt::Display for BuildTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.version)
    }
}
