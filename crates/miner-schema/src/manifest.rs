//! Per-platform catalog documents.
//!
//! Each editor release publishes one small INI-style document per host
//! platform listing the installers that host offers:
//!
//! ```text
//! [Unity]
//! title=Unity 2019.4.0f1
//! url=LinuxEditorInstaller/Unity.tar.xz
//!
//! [Windows-Mono]
//! url=LinuxEditorTargetInstaller/UnitySetup-Windows-Mono-Support-for-Editor-2019.4.0f1.tar.xz
//! ```

use std::collections::BTreeMap;

use crate::platform::ComponentKind;

/// Download URLs by component kind, parsed from one catalog document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleManifest {
    modules: BTreeMap<ComponentKind, String>,
}

impl ModuleManifest {
    /// Parse a catalog document, resolving relative `url` values against `base_url`.
    ///
    /// Unknown sections and keys are ignored. When two sections map to the same
    /// kind (`Windows` and `Windows-Mono`), the first one wins.
    pub fn parse(text: &str, base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        let mut modules = BTreeMap::new();
        let mut current: Option<ComponentKind> = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = section_kind(section.trim());
                continue;
            }

            let Some(kind) = current else { continue };
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            if !key.trim().eq_ignore_ascii_case("url") {
                continue;
            }

            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let url = if value.starts_with("http://") || value.starts_with("https://") {
                value.to_string()
            } else {
                format!("{base}/{}", value.trim_start_matches('/'))
            };
            modules.entry(kind).or_insert(url);
        }

        Self { modules }
    }

    /// Build a manifest from explicit entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (ComponentKind, String)>) -> Self {
        Self {
            modules: entries.into_iter().collect(),
        }
    }

    /// Download URL for `kind`, if this document lists it.
    pub fn url(&self, kind: ComponentKind) -> Option<&str> {
        self.modules.get(&kind).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

fn section_kind(section: &str) -> Option<ComponentKind> {
    match section {
        "Unity" => Some(ComponentKind::Editor),
        "Android" => Some(ComponentKind::Android),
        "Windows" | "Windows-Mono" => Some(ComponentKind::WindowsSupport),
        "Linux" | "Linux-Mono" => Some(ComponentKind::LinuxSupport),
        "Mac" | "Mac-Mono" => Some(ComponentKind::MacSupport),
        _ => None,
    }
}
