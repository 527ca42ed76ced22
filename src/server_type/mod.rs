//! Server type catalog for Stagehand.
//!
//! A server type describes how instances of some runnable server are
//! launched: which launch modes it supports, which attributes it needs, and
//! how a concrete command line is generated from an instance's attributes.
//! The module follows hexagonal architecture:
//!
//! - Domain types in [`domain`]
//! - The descriptor contract in [`ports`]
//! - Configurable descriptors in [`adapters`]
//! - The registration table in [`services`]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod services;
