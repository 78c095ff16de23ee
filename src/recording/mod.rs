//! Recorded sweeps on disk.
//!
//! A recording is a CSV file with the header
//! `reflRe, reflIm, thruRe, thruIm, freq` followed by five rows per sweep,
//! one per column, each a bracketed comma-space list of numbers.

pub mod reader;
pub mod writer;

pub use reader::RecordedSource;
pub use writer::{default_recording_path, RecordingWriter};

/// Column names, in row order within one sweep.
pub const COLUMNS: [&str; 5] = ["reflRe", "reflIm", "thruRe", "thruIm", "freq"];

/// Rows that make up one recorded sweep.
pub const ROWS_PER_SWEEP: usize = COLUMNS.len();
