//! Server type registration table.

mod catalog;

pub use catalog::{ServerTypeCatalog, ServerTypeCatalogBuilder};
