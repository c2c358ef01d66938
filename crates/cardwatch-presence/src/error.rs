//! Error types for the presence monitor.

use cardwatch_hardware::HardwareError;
use thiserror::Error;

/// Result type alias for monitor operations.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Errors that stop the monitor.
///
/// Transient conditions (missed reads, malformed UIDs, prolonged silence)
/// are absorbed by the tracker and never surface here.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The reader never reported a known identification value.
    #[error("Reader initialization failed after {attempts} attempts: {last_failure}")]
    InitializationFailed { attempts: u32, last_failure: String },

    /// A device operation that cannot be folded into a poll result failed.
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),

    /// The configuration is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Writing an identifier report failed.
    #[error("Report output error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    /// Create a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error must end in a full process restart.
    pub fn is_fatal_init(&self) -> bool {
        matches!(self, Self::InitializationFailed { .. })
    }
}
