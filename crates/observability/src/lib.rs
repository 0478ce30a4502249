//! Tracing/logging setup shared by every process embedding the engine.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::LogFormat;

/// Initialize process-wide tracing with the format chosen by
/// `ROLEGATE_LOG_FORMAT` (JSON unless set to `pretty`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}

/// Initialize process-wide tracing with an explicit format.
pub fn init_with(format: LogFormat) {
    tracing::init(format);
}
