//! Remote artifact provisioning.
//!
//! Server types may list remote artifacts (archives, agents, launchers) that
//! must exist locally before a server can be launched. The
//! [`ports::ArtifactCache`] contract resolves a url to a local copy, reusing
//! the copy while it is still fresh and keeping at most one copy per url.

pub mod adapters;
pub mod ports;
