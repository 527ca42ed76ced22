//! Unit tests for the command dispatcher.
//!
//! Sessions are replaced by a scripted prompter; the gateway itself is
//! exercised over real sockets by the integration tests.

mod dispatcher_tests;
