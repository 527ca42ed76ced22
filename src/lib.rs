//! Stagehand: a server management service for development tools.
//!
//! Stagehand keeps a registry of managed servers, each described by a
//! pluggable server type, and drives them through their lifecycle on behalf
//! of connected callers. Callers talk to it over a newline-delimited
//! JSON-RPC control protocol, negotiate capabilities on connect, and receive
//! notifications whenever a server is added, removed or changes state.
//!
//! # Architecture
//!
//! Stagehand follows hexagonal architecture principles:
//!
//! - **Domain**: Pure lifecycle and server type rules
//! - **Ports**: Abstract trait interfaces for processes and artifacts
//! - **Adapters**: Concrete implementations of ports (tokio processes, the
//!   filesystem cache, templates)
//!
//! # Modules
//!
//! - [`capability`]: Protocol versions and per-session capability negotiation
//! - [`server_type`]: Server type plugins and the catalog
//! - [`lifecycle`]: Managed server records and the lifecycle controller
//! - [`provisioning`]: Remote artifact cache
//! - [`protocol`]: Wire format, command dispatcher, session gateway, client
//! - [`config`]: `stagehand.toml` loading
//! - [`service`]: The assembled service and its shutdown sequence

pub mod capability;
pub mod config;
pub mod lifecycle;
pub mod protocol;
pub mod provisioning;
pub mod server_type;
pub mod service;
