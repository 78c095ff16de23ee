//! Custom error types for the acquisition layer.
//!
//! This module defines `VnaError`, the single error type returned by every
//! public operation of the crate. Using `thiserror`, it gives callers one
//! place to match on the failure modes of a headless measurement session.
//!
//! ## Error Hierarchy
//!
//! - **`InvalidConfig`**: bad sweep bounds or settings. Recoverable, the caller
//!   reconfigures and tries again.
//! - **`MalformedSample`** / **`ShortRead`**: one sweep pass could not be decoded.
//!   The continuous producer records these per pass and keeps going.
//! - **`SourceUnavailable`** / **`MalformedRecording`**: a recorded file could not
//!   be opened or parsed.
//! - **`CalibrationLoadError`** / **`CalibrationSaveError`**: calibration
//!   artifact I/O failed; the calibrate call is aborted.
//! - **`DisconnectFailure`**: the instrument stayed connected after a
//!   disconnect request. Fatal, never retried.
//! - **`Driver`**: wraps `vna_driver::DriverError` from the instrument handle.
//!
//! By using `#[from]`, driver and configuration errors convert with `?`.

use std::path::PathBuf;

use thiserror::Error;
use vna_driver::{Channel, DriverError};

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, VnaError>;

#[derive(Error, Debug)]
pub enum VnaError {
    #[error("Invalid sweep configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed {channel} sample at point {index}: '{raw}'")]
    MalformedSample {
        channel: Channel,
        index: usize,
        raw: String,
    },

    #[error("Short read: {channel} returned {got} points, expected {expected}")]
    ShortRead {
        channel: Channel,
        expected: usize,
        got: usize,
    },

    #[error("Source unavailable at '{path}': {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("Malformed recording '{path}' at line {line}: {reason}")]
    MalformedRecording {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    #[error("Failed to load calibration '{path}': {reason}")]
    CalibrationLoadError { path: PathBuf, reason: String },

    #[error("Failed to save calibration '{path}': {reason}")]
    CalibrationSaveError { path: PathBuf, reason: String },

    #[error("Calibration is incomplete: {0}")]
    CalibrationIncomplete(String),

    #[error("Calibration guide exceeded step budget of {budget}")]
    StepBudgetExceeded { budget: usize },

    #[error("Instrument '{device}' is still connected after disconnect")]
    DisconnectFailure { device: String },

    #[error("Operation '{operation}' is not supported in a {session} session")]
    UnsupportedInSession {
        operation: &'static str,
        session: &'static str,
    },

    #[error("Operation not allowed while a sweep is running: {0}")]
    Busy(&'static str),

    #[error("Sweep producer panicked: {0}")]
    ProducerPanicked(String),

    #[error("Instrument error: {0}")]
    Driver(#[from] DriverError),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VnaError {
    /// Whether the session can continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            VnaError::InvalidConfig(_)
                | VnaError::MalformedSample { .. }
                | VnaError::ShortRead { .. }
                | VnaError::UnsupportedInSession { .. }
                | VnaError::Busy(_)
        )
    }

    /// Whether the error only spoils one sweep pass.
    ///
    /// The continuous producer records these and moves on to the next pass;
    /// everything else ends the loop.
    pub fn is_pass_fault(&self) -> bool {
        matches!(
            self,
            VnaError::MalformedSample { .. } | VnaError::ShortRead { .. }
        )
    }
}

impl From<figment::Error> for VnaError {
    fn from(value: figment::Error) -> Self {
        VnaError::Config(Box::new(value))
    }
}
