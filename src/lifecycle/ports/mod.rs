//! Port contracts for managed server lifecycle.

mod launcher;

pub use launcher::{LaunchError, LaunchResult, ProcessLauncher};
