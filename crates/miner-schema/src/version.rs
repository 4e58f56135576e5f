//! Editor release versions
//!
//! Supports the `MAJOR.MINOR.PATCH<kind><build>` form used by every published
//! editor release, e.g. `2021.3.5f1`, `5.6.0b3`, `2017.4.40c1`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid editor version '{0}': expected MAJOR.MINOR.PATCH<kind><build>")]
    Malformed(String),

    #[error("Unknown release kind '{kind}' in '{version}'")]
    UnknownKind { version: String, kind: char },
}

/// Release channel letter embedded in the version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReleaseKind {
    Alpha,
    Beta,
    /// `f` (final) and `c` (China final) builds.
    Final(char),
    Patch,
    Experimental,
}

impl ReleaseKind {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'a' => Some(Self::Alpha),
            'b' => Some(Self::Beta),
            'f' | 'c' => Some(Self::Final(c)),
            'p' => Some(Self::Patch),
            'x' => Some(Self::Experimental),
            _ => None,
        }
    }

    fn as_char(self) -> char {
        match self {
            Self::Alpha => 'a',
            Self::Beta => 'b',
            Self::Final(c) => c,
            Self::Patch => 'p',
            Self::Experimental => 'x',
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Experimental => 0,
            Self::Alpha => 1,
            Self::Beta => 2,
            Self::Final(_) => 3,
            Self::Patch => 4,
        }
    }
}

/// A parsed editor version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EditorVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub kind: ReleaseKind,
    pub build: u32,
}

impl EditorVersion {
    pub fn new(major: u32, minor: u32, patch: u32, kind: ReleaseKind, build: u32) -> Self {
        Self {
            major,
            minor,
            patch,
            kind,
            build,
        }
    }

    /// Returns `true` if this version is at least `major.minor`.
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }

    /// Returns `true` if this version is strictly before `major.minor`.
    pub fn before(&self, major: u32, minor: u32) -> bool {
        !self.at_least(major, minor)
    }
}

impl FromStr for EditorVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || VersionError::Malformed(s.to_string());

        let mut parts = s.trim().splitn(3, '.');
        let major = parts.next().and_then(|p| p.parse().ok()).ok_or_else(malformed)?;
        let minor = parts.next().and_then(|p| p.parse().ok()).ok_or_else(malformed)?;
        let rest = parts.next().ok_or_else(malformed)?;

        let split = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(malformed)?;
        let (patch, tail) = rest.split_at(split);
        let patch = patch.parse().map_err(|_| malformed())?;

        let mut chars = tail.chars();
        let kind_char = chars.next().ok_or_else(malformed)?;
        let kind = ReleaseKind::from_char(kind_char).ok_or_else(|| VersionError::UnknownKind {
            version: s.to_string(),
            kind: kind_char,
        })?;
        let build = chars.as_str().parse().map_err(|_| malformed())?;

        Ok(Self {
            major,
            minor,
            patch,
            kind,
            build,
        })
    }
}

impl fmt::Display for EditorVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}{}{}",
            self.major,
            self.minor,
            self.patch,
            self.kind.as_char(),
            self.build
        )
    }
}

impl Ord for EditorVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch, self.kind.rank(), self.build)
            .cmp(&(
                other.major,
                other.minor,
                other.patch,
                other.kind.rank(),
                other.build,
            ))
            .then_with(|| self.kind.as_char().cmp(&other.kind.as_char()))
    }
}

impl PartialOrd for EditorVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for EditorVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EditorVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> EditorVersion {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_final() {
        let version = v("2021.3.5f1");
        assert_eq!(version.major, 2021);
        assert_eq!(version.minor, 3);
        assert_eq!(version.patch, 5);
        assert_eq!(version.kind, ReleaseKind::Final('f'));
        assert_eq!(version.build, 1);
    }

    #[test]
    fn test_display_round_trips_original_text() {
        for s in ["5.6.0b3", "2017.4.40c1", "4.7.2f1", "2023.1.0a12"] {
            assert_eq!(v(s).to_string(), s);
        }
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(
            "2021.3".parse::<EditorVersion>(),
            Err(VersionError::Malformed(_))
        ));
        assert!(matches!(
            "2021.3.5".parse::<EditorVersion>(),
            Err(VersionError::Malformed(_))
        ));
        assert!(matches!(
            "2021.3.5q1".parse::<EditorVersion>(),
            Err(VersionError::UnknownKind { kind: 'q', .. })
        ));
    }

    #[test]
    fn test_ordering() {
        assert!(v("2021.3.5f1") > v("2021.3.4f1"));
        assert!(v("2021.3.5f1") > v("2021.3.5b9"));
        assert!(v("2021.3.5p1") > v("2021.3.5f2"));
        assert!(v("2019.4.0f1") < v("2020.1.0a1"));
        assert!(v("5.6.7f1") < v("2017.1.0f3"));
    }

    #[test]
    fn test_era_checks() {
        assert!(v("2018.1.0f2").at_least(2018, 1));
        assert!(v("5.2.4f1").before(5, 3));
        assert!(!v("5.3.0f1").before(5, 3));
    }
}
