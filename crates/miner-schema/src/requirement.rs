//! Requirements jobs place on upstream packages, and the packages that satisfy them.

use serde::{Deserialize, Serialize};

use crate::platform::{ComponentKind, Platform};

/// A single package a job needs: a component kind from some platform's catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Requirement {
    pub kind: ComponentKind,
    pub platform: Platform,
    /// When no package can satisfy this requirement, the containing set stays
    /// usable and this requirement contributes nothing.
    pub allow_missing: bool,
}

impl Requirement {
    /// A mandatory requirement.
    pub fn new(kind: ComponentKind, platform: Platform) -> Self {
        Self {
            kind,
            platform,
            allow_missing: false,
        }
    }

    /// A requirement the job can live without.
    pub fn optional(kind: ComponentKind, platform: Platform) -> Self {
        Self {
            kind,
            platform,
            allow_missing: true,
        }
    }
}

impl std::fmt::Display for Requirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.kind, self.platform)?;
        if self.allow_missing {
            write!(f, "?")?;
        }
        Ok(())
    }
}

/// Ordered AND-list of requirements.
///
/// A job offers several of these; any one that is fully satisfiable makes the
/// job runnable.
pub type RequirementSet = Vec<Requirement>;

/// A concrete downloadable package.
///
/// Packages are identified by `(kind, platform)`; two jobs needing the same
/// pair share one download.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedPackage {
    pub kind: ComponentKind,
    pub platform: Platform,
    pub url: String,
}

impl ResolvedPackage {
    pub fn new(kind: ComponentKind, platform: Platform, url: impl Into<String>) -> Self {
        Self {
            kind,
            platform,
            url: url.into(),
        }
    }

    /// The `(kind, platform)` identity of this package.
    pub fn key(&self) -> (ComponentKind, Platform) {
        (self.kind, self.platform)
    }

    /// Planner cost of downloading this package.
    pub fn weight(&self) -> u32 {
        self.kind.weight() + self.platform.weight()
    }

    /// File name component of the download URL.
    pub fn file_name(&self) -> &str {
        self.url
            .split(['?', '#'])
            .next()
            .and_then(|u| u.rsplit('/').next())
            .unwrap_or("")
    }
}

impl std::fmt::Display for ResolvedPackage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.kind, self.platform)
    }
}

/// Whether `package` satisfies `requirement`.
///
/// True iff the kinds are equal and the platforms are equal or either side is
/// [`Platform::Any`].
pub fn matches(requirement: &Requirement, package: &ResolvedPackage) -> bool {
    requirement.kind == package.kind && requirement.platform.matches(package.platform)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_platforms() -> [Platform; 4] {
        [
            Platform::Any,
            Platform::Windows,
            Platform::Linux,
            Platform::MacOS,
        ]
    }

    #[test]
    fn test_matches_exhaustive() {
        for rk in ComponentKind::ALL {
            for rp in all_platforms() {
                for pk in ComponentKind::ALL {
                    for pp in all_platforms() {
                        let req = Requirement::new(rk, rp);
                        let pkg = ResolvedPackage::new(pk, pp, "https://example.com/x");
                        let expected =
                            rk == pk && (rp == pp || rp == Platform::Any || pp == Platform::Any);
                        assert_eq!(matches(&req, &pkg), expected, "{req} vs {pkg}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_allow_missing_does_not_affect_matching() {
        let pkg = ResolvedPackage::new(ComponentKind::Android, Platform::Linux, "u");
        assert!(matches(&Requirement::optional(ComponentKind::Android, Platform::Any), &pkg));
        assert!(!matches(
            &Requirement::optional(ComponentKind::Android, Platform::MacOS),
            &pkg
        ));
    }

    #[test]
    fn test_file_name_from_url() {
        let pkg = ResolvedPackage::new(
            ComponentKind::Editor,
            Platform::Linux,
            "https://cdn.example.com/abc/LinuxEditorInstaller/Unity.tar.xz?sig=1",
        );
        assert_eq!(pkg.file_name(), "Unity.tar.xz");
    }

    #[test]
    fn test_display() {
        let req = Requirement::optional(ComponentKind::MacSupport, Platform::Any);
        assert_eq!(req.to_string(), "mac-support@any?");
    }
}
