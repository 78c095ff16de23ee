//! Instrument handle for two-port vector network analyzers.
//!
//! This crate owns everything that touches the instrument itself: the
//! [`VnaDevice`] contract consumed by the acquisition layer, interface
//! discovery, the NanoVNA serial shell driver and a simulated instrument.
//!
//! # Crate Structure
//!
//! - **`error`**: `DriverError`, the single error type of this crate.
//! - **`nanovna`**: `NanoVna` serial driver and port discovery (feature `serial`).
//! - **`mock`**: `MockVna`, a deterministic simulated analyzer for tests and demos.
//!
//! # Example
//!
//! ```rust,ignore
//! use vna_driver::{Channel, MockVna, VnaDevice};
//!
//! let mut vna = MockVna::new();
//! vna.connect()?;
//! vna.set_sweep(2_900_000_000, 3_100_000_000, 101)?;
//! let freqs = vna.read_frequencies()?;
//! let s11 = vna.read_values(Channel::S11)?;
//! assert_eq!(freqs.len(), s11.len());
//! ```

pub mod error;
pub mod mock;
#[cfg(feature = "serial")]
pub mod nanovna;

pub use error::{DriverError, Result};
pub use mock::{MockProbe, MockVna};
#[cfg(feature = "serial")]
pub use nanovna::{list_interfaces, open_interface, Interface, NanoVna};

use std::fmt;

/// Measurement channel of a two-port analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    /// Port 1 reflection
    S11,
    /// Port 1 to port 2 transmission
    S21,
}

impl Channel {
    /// Firmware data array index (`data 0` / `data 1`).
    pub fn index(self) -> u8 {
        match self {
            Channel::S11 => 0,
            Channel::S21 => 1,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::S11 => write!(f, "S11"),
            Channel::S21 => write!(f, "S21"),
        }
    }
}

/// A connected (or connectable) network analyzer.
///
/// # Contract
/// - `set_sweep` configures the next acquisition; `read_frequencies` and
///   `read_values` return data for the most recent sweep.
/// - `read_values` returns one raw string per point, formatted as two
///   whitespace-separated floats (`"re im"`). Decoding is the caller's job.
/// - Every method except `name` and `connected` fails with
///   `DriverError::NotConnected` while disconnected.
///
/// # Thread Safety
/// Implementors must be `Send` so the acquisition layer can move the handle
/// onto its producer thread. Calls are never issued concurrently.
pub trait VnaDevice: Send {
    /// Human readable device name (port name or model).
    fn name(&self) -> &str;

    /// Open the link to the instrument.
    fn connect(&mut self) -> Result<()>;

    /// Close the link. Callers verify the outcome through `connected()`.
    fn disconnect(&mut self) -> Result<()>;

    /// Whether the link is currently open.
    fn connected(&self) -> bool;

    /// Firmware identification text.
    fn read_firmware(&mut self) -> Result<String>;

    /// Feature or command list reported by the firmware.
    fn read_features(&mut self) -> Result<Vec<String>>;

    /// Configure a sweep from `start` to `stop` Hz with `points` samples.
    fn set_sweep(&mut self, start: u64, stop: u64, points: usize) -> Result<()>;

    /// Frequencies of the current sweep in Hz.
    fn read_frequencies(&mut self) -> Result<Vec<u64>>;

    /// Raw `"re im"` strings of one channel for the current sweep.
    fn read_values(&mut self, channel: Channel) -> Result<Vec<String>>;
}

impl<T: VnaDevice + ?Sized> VnaDevice for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn disconnect(&mut self) -> Result<()> {
        (**self).disconnect()
    }

    fn connected(&self) -> bool {
        (**self).connected()
    }

    fn read_firmware(&mut self) -> Result<String> {
        (**self).read_firmware()
    }

    fn read_features(&mut self) -> Result<Vec<String>> {
        (**self).read_features()
    }

    fn set_sweep(&mut self, start: u64, stop: u64, points: usize) -> Result<()> {
        (**self).set_sweep(start, stop, points)
    }

    fn read_frequencies(&mut self) -> Result<Vec<u64>> {
        (**self).read_frequencies()
    }

    fn read_values(&mut self, channel: Channel) -> Result<Vec<String>> {
        (**self).read_values(channel)
    }
}

/// Evenly spaced frequency list, as the firmware reports it.
pub fn linear_frequencies(start: u64, stop: u64, points: usize) -> Vec<u64> {
    match points {
        0 => Vec::new(),
        1 => vec![start],
        n => {
            let span = u128::from(stop.saturating_sub(start));
            let last = (n - 1) as u128;
            (0..n)
                .map(|i| start + (span * i as u128 / last) as u64)
                .collect()
        }
    }
}
