//! Tracing/logging setup shared by the worker and test harnesses.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::{LogFormat, ObservabilityConfig, init_with};

/// Initialize process-wide tracing with defaults (JSON, `RUST_LOG` or `info`).
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    crate::tracing::init_with(&ObservabilityConfig::default());
}
