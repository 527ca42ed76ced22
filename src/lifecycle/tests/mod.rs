//! Unit tests for the lifecycle module.
//!
//! Controller tests run against the in-memory launcher unless they need to
//! assert exact launcher calls, in which case they use a mock.

mod registry_tests;
