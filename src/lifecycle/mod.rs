//! Managed server lifecycle for Stagehand.
//!
//! This module owns the per-server state machine
//! (`stopped → starting → started → stopping → stopped`), the registry of
//! managed server records, and the controller that applies every transition.
//! Controller-initiated commands and transitions asserted by callers go
//! through the same claim and commit primitives, so each record sees at most
//! one operation at a time and every command resolves exactly once, after its
//! state change is committed. The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - Port contracts in [`ports`]
//! - Adapter implementations in [`adapters`]
//! - Orchestration services in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;

#[cfg(test)]
pub(crate) mod tests;
