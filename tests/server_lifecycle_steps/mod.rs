//! Step definitions for server lifecycle scenarios.

mod given;
mod then;
mod when;
pub mod world;
