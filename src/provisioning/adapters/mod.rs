//! Artifact cache implementations.

mod fs;

pub use fs::FsArtifactCache;
