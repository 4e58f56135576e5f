//! IO modules - side effects (network, filesystem, external tools)

pub mod archive;
pub mod download;
pub mod extract;
