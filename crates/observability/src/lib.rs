//! Process-wide logging setup shared by every binary that hosts the engine.

pub mod tracing;

pub use crate::tracing::{LogFormat, LogSettings};

/// Initialize tracing with default settings (JSON, `info`).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(&LogSettings::default());
}
