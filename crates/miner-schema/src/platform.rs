//! Host platforms and installable component kinds.
//!
//! Every upstream package is identified by a `(ComponentKind, Platform)` pair:
//! the kind says *what* the installer contains, the platform says *which host's*
//! catalog publishes it.

/// Host platform publishing a package.
///
/// `Any` is a wildcard used only inside requirements. It must be resolved to
/// a concrete platform before a package can be downloaded.
///
/// # Example
///
/// ```
/// use miner_schema::Platform;
///
/// assert!(Platform::Any.matches(Platform::Linux));
/// assert!(!Platform::Windows.matches(Platform::MacOS));
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Wildcard: any concrete platform.
    Any,
    /// Windows-hosted editor and installers.
    Windows,
    /// Linux-hosted editor and installers.
    Linux,
    /// macOS-hosted editor and installers.
    #[serde(rename = "macos")]
    MacOS,
}

impl Platform {
    /// Concrete platforms in preference order (cheapest first).
    pub const CONCRETE: [Platform; 3] = [Platform::Linux, Platform::Windows, Platform::MacOS];

    /// Returns `true` for every platform except the `Any` wildcard.
    pub fn is_concrete(self) -> bool {
        self != Self::Any
    }

    /// Platform equality where either side being `Any` always matches.
    pub fn matches(self, other: Platform) -> bool {
        self == other || self == Self::Any || other == Self::Any
    }

    /// Planner weight for downloading from this platform's catalog.
    ///
    /// Linux tarballs are the cheapest to unpack, macOS packages the most
    /// expensive.
    pub fn weight(self) -> u32 {
        match self {
            Self::Any => 0,
            Self::Linux => 1,
            Self::Windows => 2,
            Self::MacOS => 3,
        }
    }

    /// The support-bundle kind that targets this platform.
    ///
    /// Returns `None` for `Any`.
    pub fn support_kind(self) -> Option<ComponentKind> {
        match self {
            Self::Any => None,
            Self::Windows => Some(ComponentKind::WindowsSupport),
            Self::Linux => Some(ComponentKind::LinuxSupport),
            Self::MacOS => Some(ComponentKind::MacSupport),
        }
    }

    /// Suffix used in catalog document names (`unity-<version>-<suffix>.ini`).
    pub fn catalog_suffix(self) -> Option<&'static str> {
        match self {
            Self::Any => None,
            Self::Windows => Some("win"),
            Self::Linux => Some("linux"),
            Self::MacOS => Some("osx"),
        }
    }

    /// Convert to string representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::MacOS => "macos",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "any" | "*" => Ok(Self::Any),
            "windows" | "win" => Ok(Self::Windows),
            "linux" => Ok(Self::Linux),
            "macos" | "mac" | "osx" => Ok(Self::MacOS),
            _ => Err(format!("Unknown platform: {s}")),
        }
    }
}

/// Kind of installable module a catalog document can list.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ComponentKind {
    /// The editor installer itself.
    Editor,
    /// Android build support.
    Android,
    /// Windows player support bundle.
    WindowsSupport,
    /// Linux player support bundle.
    LinuxSupport,
    /// macOS player support bundle.
    MacSupport,
}

impl ComponentKind {
    /// All kinds, in declaration order.
    pub const ALL: [ComponentKind; 5] = [
        ComponentKind::Editor,
        ComponentKind::Android,
        ComponentKind::WindowsSupport,
        ComponentKind::LinuxSupport,
        ComponentKind::MacSupport,
    ];

    /// Planner weight for downloading a package of this kind.
    pub fn weight(self) -> u32 {
        match self {
            Self::Editor => 100,
            Self::Android => 40,
            Self::WindowsSupport | Self::LinuxSupport | Self::MacSupport => 20,
        }
    }

    /// The platform a support bundle builds players for.
    pub fn supported_platform(self) -> Option<Platform> {
        match self {
            Self::WindowsSupport => Some(Platform::Windows),
            Self::LinuxSupport => Some(Platform::Linux),
            Self::MacSupport => Some(Platform::MacOS),
            Self::Editor | Self::Android => None,
        }
    }

    /// Whether `platform`'s catalog can ever publish this kind.
    ///
    /// A host never publishes its own support bundle: the Windows player
    /// support only ships with the Linux and macOS editors, and so on.
    pub fn is_published_by(self, platform: Platform) -> bool {
        platform.is_concrete() && self.supported_platform() != Some(platform)
    }

    /// Convert to string representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Editor => "editor",
            Self::Android => "android",
            Self::WindowsSupport => "windows-support",
            Self::LinuxSupport => "linux-support",
            Self::MacSupport => "mac-support",
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_matches_everything() {
        for p in Platform::CONCRETE {
            assert!(Platform::Any.matches(p));
            assert!(p.matches(Platform::Any));
            assert!(p.matches(p));
        }
    }

    #[test]
    fn test_concrete_platforms_only_match_themselves() {
        assert!(!Platform::Linux.matches(Platform::Windows));
        assert!(!Platform::MacOS.matches(Platform::Linux));
    }

    #[test]
    fn test_self_support_is_never_published() {
        assert!(!ComponentKind::WindowsSupport.is_published_by(Platform::Windows));
        assert!(!ComponentKind::LinuxSupport.is_published_by(Platform::Linux));
        assert!(!ComponentKind::MacSupport.is_published_by(Platform::MacOS));
        assert!(ComponentKind::WindowsSupport.is_published_by(Platform::Linux));
        assert!(ComponentKind::Editor.is_published_by(Platform::Windows));
        assert!(!ComponentKind::Editor.is_published_by(Platform::Any));
    }

    #[test]
    fn test_weights_are_positive() {
        for k in ComponentKind::ALL {
            for p in Platform::CONCRETE {
                assert!(k.weight() + p.weight() > 0);
            }
        }
        assert!(Platform::Linux.weight() < Platform::MacOS.weight());
    }

    #[test]
    fn test_platform_from_str() {
        assert_eq!("osx".parse::<Platform>().unwrap(), Platform::MacOS);
        assert_eq!("WIN".parse::<Platform>().unwrap(), Platform::Windows);
        assert!("amiga".parse::<Platform>().is_err());
    }
}
