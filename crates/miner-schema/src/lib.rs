//! Data model shared by the planner, the jobs and the control surface.

pub mod manifest;
pub mod platform;
pub mod requirement;
pub mod target;
pub mod version;

// Re-exports
pub use manifest::ModuleManifest;
pub use platform::*;
pub use requirement::{Requirement, RequirementSet, ResolvedPackage, matches};
pub use target::BuildTarget;
pub use version::{EditorVersion, ReleaseKind, VersionError};
