//! Tracing/logging setup shared by the engine binary and tests.

pub mod tracing;

pub use crate::tracing::LogFormat;

/// Initialize process-wide tracing (JSON, `RUST_LOG` filter, default `info`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}

/// Human-readable output captured by the test harness.
pub fn init_for_tests() {
    tracing::init_test();
}
