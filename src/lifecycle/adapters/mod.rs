//! Adapter implementations for managed server lifecycle ports.

mod memory;
mod process;

pub use memory::InMemoryProcessLauncher;
pub use process::TokioProcessLauncher;
