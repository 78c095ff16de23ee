//! Error types for instrument communication.
//!
//! Every failure the instrument handle can report maps to one `DriverError`
//! variant so callers can decide whether to reconnect, reconfigure or give up.

use thiserror::Error;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors that can occur when talking to a VNA.
#[derive(Error, Debug)]
pub enum DriverError {
    /// An operation that needs an open link was issued while disconnected
    #[error("Device '{device}' is not connected")]
    NotConnected { device: String },

    /// No matching interface was found during discovery
    #[error("No VNA interface at index {index} ({found} found)")]
    NoInterface { index: usize, found: usize },

    /// The device did not answer within the configured timeout
    #[error("Timed out after {timeout_ms} ms waiting for '{command}'")]
    Timeout { command: String, timeout_ms: u64 },

    /// The device answered with something the protocol does not allow
    #[error("Protocol error on '{command}': {message}")]
    Protocol { command: String, message: String },

    /// A sweep request the firmware cannot honour
    #[error("Unsupported sweep: {message}")]
    UnsupportedSweep { message: String },

    /// I/O error from the operating system
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port layer error
    #[cfg(feature = "serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl DriverError {
    /// Check if this error means the link is gone.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::NotConnected { .. } | Self::Io(_))
    }

    /// Check if this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DriverError::Timeout {
            command: "data 0".to_string(),
            timeout_ms: 500,
        };
        assert!(err.to_string().contains("data 0"));
        assert!(err.to_string().contains("500"));
        assert!(err.is_timeout());
    }

    #[test]
    fn test_disconnected_classification() {
        let err = DriverError::NotConnected {
            device: "mock".to_string(),
        };
        assert!(err.is_disconnected());
        assert!(!err.is_timeout());
    }
}
