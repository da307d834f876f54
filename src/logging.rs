//! Tracing subscriber setup.
//!
//! The engine only emits `tracing` events. Binaries and tests that want to
//! see them install a subscriber here; without the `logging` feature these
//! are no-ops.

#[cfg(feature = "logging")]
use tracing_subscriber::{EnvFilter, fmt};

/// Install a subscriber at `info`, overridable through `RUST_LOG`.
#[cfg(feature = "logging")]
pub fn init() {
    init_with_level("info")
}

/// Install a subscriber at `level` (trace, debug, info, warn, error),
/// overridable through `RUST_LOG`.
#[cfg(feature = "logging")]
pub fn init_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Debug-level output captured by the test harness. Safe to call from every
/// test.
#[cfg(feature = "logging")]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("celldb=debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(not(feature = "logging"))]
pub fn init() {}

#[cfg(not(feature = "logging"))]
pub fn init_with_level(_level: &str) {}

#[cfg(not(feature = "logging"))]
pub fn init_test() {}
