//! # Headless VNA Acquisition Library
//!
//! This crate drives a two-port vector network analyzer (NanoVNA family)
//! without a GUI: it configures sweeps, runs the calibration procedure and
//! delivers S11/S21 measurements either as one result or as a continuous
//! stream, from the live instrument or from a recording. The instrument
//! handle itself lives in the `vna-driver` workspace crate.
//!
//! ## Crate Structure
//!
//! - **`acquisition`**: the `Orchestrator` that runs the sweep producer on a
//!   background thread, and the `SweepStream` consumers iterate.
//! - **`calibration`**: the calibration guide contract, its driving loop and
//!   the JSON calibration artifact.
//! - **`config`**: layered `Settings` (defaults, TOML file, environment).
//! - **`error`**: the `VnaError` enum used by every public operation.
//! - **`logging`**: `tracing` subscriber setup.
//! - **`measurement`**: `Datapoint`, `SweepResult` and raw sample decoding.
//! - **`recording`**: CSV recording writer and replay reader.
//! - **`session`**: `LiveSession` and `PlaybackSession` behind the `Session`
//!   trait.
//! - **`sweep`**: `SweepConfig` and the `SweepProducer`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use vna_headless::acquisition::StreamSource;
//! use vna_headless::session::{LiveSession, Session};
//! use vna_headless::sweep::SweepConfig;
//! use vna_driver::MockVna;
//!
//! # fn main() -> vna_headless::error::Result<()> {
//! let config = SweepConfig::new(2_900_000_000, 3_100_000_000, 1, 101);
//! let mut session = LiveSession::new(Box::new(MockVna::new()), config)?;
//!
//! let single = session.run_single()?;
//! println!("{} points", single.len());
//!
//! for sweep in session.open_stream(StreamSource::Live)?.take(10) {
//!     println!("min |S11| = {:?}", sweep.s11_magnitude().into_iter().reduce(f64::min));
//! }
//! session.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub mod acquisition;
pub mod calibration;
pub mod config;
pub mod error;
pub mod logging;
pub mod measurement;
pub mod recording;
pub mod session;
pub mod sweep;

pub use error::{Result, VnaError};
