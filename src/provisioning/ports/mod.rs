//! Port contracts for artifact provisioning.

mod cache;

pub use cache::{ArtifactCache, ProvisioningError, ProvisioningResult};
