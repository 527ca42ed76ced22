//! Port contracts for server type plugins.

mod descriptor;

pub use descriptor::{ArtifactPaths, CommandRequest, ServerTypeDescriptor};
