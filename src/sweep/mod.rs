//! Sweep configuration and the producer that executes sweeps.

pub mod config;
pub mod producer;

pub use config::{SweepConfig, SweepMode};
pub use producer::SweepProducer;
