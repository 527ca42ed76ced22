//! Application services for managed server lifecycles.

mod controller;
mod error;
mod registry;

pub use controller::LifecycleController;
pub use error::{LifecycleError, LifecycleResult};
pub use registry::ServerRegistry;
