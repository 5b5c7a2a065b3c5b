//! Helpers shared by the test suites and benchmarks
//!
//! This module contains utilities for running an echo server on an
//! ephemeral port.

pub mod test_utils;

pub use test_utils::{TestServer, spawn_test_server, spawn_test_server_with_config};
