//! Single complex sample at one frequency.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

/// One complex measurement at a single frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Datapoint {
    /// Frequency in Hz
    pub freq: u64,
    pub re: f64,
    pub im: f64,
}

impl Datapoint {
    pub fn new(freq: u64, re: f64, im: f64) -> Self {
        Self { freq, re, im }
    }

    /// The sample as a complex number.
    pub fn z(&self) -> Complex64 {
        Complex64::new(self.re, self.im)
    }

    /// Linear magnitude |z|.
    pub fn magnitude(&self) -> f64 {
        self.z().norm()
    }

    /// Magnitude in dB (20·log10|z|).
    pub fn gain_db(&self) -> f64 {
        20.0 * self.magnitude().log10()
    }

    /// Phase in degrees.
    pub fn phase_deg(&self) -> f64 {
        self.z().arg().to_degrees()
    }
}
