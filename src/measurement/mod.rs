//! Measurement data model.
//!
//! - **`Datapoint`**: one complex sample at one frequency.
//! - **`SweepResult`**: the column-oriented result of a full sweep, the unit
//!   everything downstream (streams, recordings, calibration) passes around.
//! - Pure decoding of the instrument's raw `"re im"` strings.

pub mod datapoint;
pub mod sweep;

pub use datapoint::Datapoint;
pub use sweep::{assemble, decode_channel, decode_sample, SamplePolicy, SweepResult};
