//! Process-wide logging setup for the inventory client.

/// Initialize tracing with the format chosen by `PANTRY_LOG_FORMAT`.
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env());
}

/// Subscriber configuration (filter, output format).
pub mod tracing;

pub use tracing::LogFormat;
