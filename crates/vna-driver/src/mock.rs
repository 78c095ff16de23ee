//! Mock network analyzer.
//!
//! Simulates a two-port analyzer measuring a single resonator so acquisition
//! code can be exercised without hardware.
//!
//! - S21 follows a Lorentzian transmission peak, S11 the matching reflection dip
//! - Optional per-acquisition phase drift so consecutive sweeps differ
//! - Optional seeded noise (reproducible with a fixed seed)
//! - Failure injection: malformed samples, link loss, a disconnect that does
//!   not take effect
//!
//! An acquisition is one `set_sweep` call; a multi-segment sweep therefore
//! consumes several acquisitions.
//!
//! # Example
//!
//! ```rust,ignore
//! let vna = MockVna::new().with_noise(1e-3, Some(42));
//! let probe = vna.probe();
//! let mut device: Box<dyn VnaDevice> = Box::new(vna);
//! device.connect()?;
//! assert!(probe.is_connected());
//! ```

use std::collections::HashSet;
use std::f64::consts::PI;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::error::{DriverError, Result};
use crate::{linear_frequencies, Channel, VnaDevice};

/// Raw sample the mock emits for an injected malformed acquisition.
pub const MALFORMED_SAMPLE: &str = "abc def";

#[derive(Debug, Default)]
struct ProbeState {
    connected: AtomicBool,
    acquisitions: AtomicU64,
    disconnects: AtomicU64,
}

/// Observer handle that stays valid after the mock is moved into a session.
#[derive(Debug, Clone, Default)]
pub struct MockProbe {
    state: Arc<ProbeState>,
}

impl MockProbe {
    /// Whether the mock currently reports a live link.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    /// Number of `set_sweep` calls served so far.
    pub fn acquisitions(&self) -> u64 {
        self.state.acquisitions.load(Ordering::SeqCst)
    }

    /// Number of disconnect requests received.
    pub fn disconnects(&self) -> u64 {
        self.state.disconnects.load(Ordering::SeqCst)
    }
}

/// Simulated analyzer.
pub struct MockVna {
    name: String,
    probe: MockProbe,
    sweep: Option<(u64, u64, usize)>,
    /// Index of the acquisition currently held (valid after `set_sweep`)
    current: u64,
    resonance_hz: f64,
    quality: f64,
    drift_rad: f64,
    noise: f64,
    rng: ChaCha8Rng,
    delay: Duration,
    malformed: HashSet<u64>,
    failing: HashSet<u64>,
    stuck_connected: bool,
}

impl MockVna {
    /// Create a mock resonating at 3 GHz with a small drift between acquisitions.
    pub fn new() -> Self {
        Self {
            name: "mock-vna".to_string(),
            probe: MockProbe::default(),
            sweep: None,
            current: 0,
            resonance_hz: 3.0e9,
            quality: 150.0,
            drift_rad: 0.01,
            noise: 0.0,
            rng: ChaCha8Rng::seed_from_u64(0),
            delay: Duration::from_millis(2),
            malformed: HashSet::new(),
            failing: HashSet::new(),
            stuck_connected: false,
        }
    }

    /// Get an observer handle.
    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }

    /// Return the identical sweep on every acquisition.
    pub fn frozen(mut self) -> Self {
        self.drift_rad = 0.0;
        self.noise = 0.0;
        self
    }

    /// Move the resonance.
    pub fn with_resonance(mut self, resonance_hz: f64, quality: f64) -> Self {
        self.resonance_hz = resonance_hz;
        self.quality = quality;
        self
    }

    /// Add uniform noise of `amplitude` to every component.
    ///
    /// # Arguments
    /// * `amplitude` - Peak noise per real/imaginary component
    /// * `seed` - Fixed seed for reproducible noise, or `None` for entropy
    pub fn with_noise(mut self, amplitude: f64, seed: Option<u64>) -> Self {
        self.noise = amplitude;
        self.rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => ChaCha8Rng::from_entropy(),
        };
        self
    }

    /// Simulated sweep time per acquisition.
    pub fn with_sweep_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make the S11 data of acquisition `index` (0-based) start with
    /// [`MALFORMED_SAMPLE`].
    pub fn with_malformed_acquisition(mut self, index: u64) -> Self {
        self.malformed.insert(index);
        self
    }

    /// Make reads of acquisition `index` fail as if the link dropped.
    pub fn with_failing_acquisition(mut self, index: u64) -> Self {
        self.failing.insert(index);
        self
    }

    /// Ignore disconnect requests while reporting success.
    pub fn stuck_connected(mut self) -> Self {
        self.stuck_connected = true;
        self
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.probe.is_connected() {
            Ok(())
        } else {
            Err(DriverError::NotConnected {
                device: self.name.clone(),
            })
        }
    }

    fn ensure_readable(&self) -> Result<()> {
        self.ensure_connected()?;
        if self.sweep.is_none() {
            return Err(DriverError::Protocol {
                command: "data".to_string(),
                message: "no sweep configured".to_string(),
            });
        }
        if self.failing.contains(&self.current) {
            return Err(DriverError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated link loss",
            )));
        }
        Ok(())
    }

    /// Complex response of the resonator at `freq` for one channel.
    fn response(&self, channel: Channel, freq: u64) -> (f64, f64) {
        let detune = 2.0 * self.quality * (freq as f64 - self.resonance_hz) / self.resonance_hz;
        let denom = 1.0 + detune * detune;
        let (lre, lim) = (1.0 / denom, -detune / denom);
        let (re, im) = match channel {
            Channel::S11 => (1.0 - 0.8 * lre, -0.8 * lim),
            Channel::S21 => (0.9 * lre, 0.9 * lim),
        };
        let phase = (self.drift_rad * self.current as f64) % (2.0 * PI);
        let (sin, cos) = phase.sin_cos();
        (re * cos - im * sin, re * sin + im * cos)
    }
}

impl Default for MockVna {
    fn default() -> Self {
        Self::new()
    }
}

impl VnaDevice for MockVna {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&mut self) -> Result<()> {
        self.probe.state.connected.store(true, Ordering::SeqCst);
        debug!(device = %self.name, "Mock connected");
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.probe.state.disconnects.fetch_add(1, Ordering::SeqCst);
        if !self.stuck_connected {
            self.probe.state.connected.store(false, Ordering::SeqCst);
        }
        debug!(device = %self.name, stuck = self.stuck_connected, "Mock disconnect requested");
        Ok(())
    }

    fn connected(&self) -> bool {
        self.probe.is_connected()
    }

    fn read_firmware(&mut self) -> Result<String> {
        self.ensure_connected()?;
        Ok("Board: Mock VNA\nVersion: 1.2.0-mock".to_string())
    }

    fn read_features(&mut self) -> Result<Vec<String>> {
        self.ensure_connected()?;
        Ok(["sweep", "frequencies", "data", "info", "help"]
            .iter()
            .map(|s| s.to_string())
            .collect())
    }

    fn set_sweep(&mut self, start: u64, stop: u64, points: usize) -> Result<()> {
        self.ensure_connected()?;
        if points == 0 || start > stop {
            return Err(DriverError::UnsupportedSweep {
                message: format!("{start}..{stop} Hz with {points} points"),
            });
        }
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.current = self.probe.state.acquisitions.fetch_add(1, Ordering::SeqCst);
        self.sweep = Some((start, stop, points));
        Ok(())
    }

    fn read_frequencies(&mut self) -> Result<Vec<u64>> {
        self.ensure_readable()?;
        let (start, stop, points) = self.sweep.unwrap_or_default();
        Ok(linear_frequencies(start, stop, points))
    }

    fn read_values(&mut self, channel: Channel) -> Result<Vec<String>> {
        self.ensure_readable()?;
        let (start, stop, points) = self.sweep.unwrap_or_default();
        let clean: Vec<(f64, f64)> = linear_frequencies(start, stop, points)
            .into_iter()
            .map(|freq| self.response(channel, freq))
            .collect();
        let noise = self.noise;
        let mut values = Vec::with_capacity(clean.len());
        for (mut re, mut im) in clean {
            if noise > 0.0 {
                re += self.rng.gen_range(-noise..=noise);
                im += self.rng.gen_range(-noise..=noise);
            }
            values.push(format!("{re:.9} {im:.9}"));
        }
        if channel == Channel::S11 && self.malformed.contains(&self.current) {
            if let Some(first) = values.first_mut() {
                *first = MALFORMED_SAMPLE.to_string();
            }
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected(vna: MockVna) -> MockVna {
        let mut vna = vna;
        vna.connect().unwrap();
        vna
    }

    #[test]
    fn test_requires_connection() {
        let mut vna = MockVna::new();
        assert!(matches!(
            vna.set_sweep(1, 2, 2),
            Err(DriverError::NotConnected { .. })
        ));
    }

    #[test]
    fn test_values_match_frequencies() {
        let mut vna = connected(MockVna::new().with_sweep_delay(Duration::ZERO));
        vna.set_sweep(2_900_000_000, 3_100_000_000, 101).unwrap();
        let freqs = vna.read_frequencies().unwrap();
        let s11 = vna.read_values(Channel::S11).unwrap();
        let s21 = vna.read_values(Channel::S21).unwrap();
        assert_eq!(freqs.len(), 101);
        assert_eq!(s11.len(), 101);
        assert_eq!(s21.len(), 101);
        assert_eq!(s11[0].split_whitespace().count(), 2);
    }

    #[test]
    fn test_frozen_is_repeatable() {
        let mut vna = connected(MockVna::new().frozen().with_sweep_delay(Duration::ZERO));
        vna.set_sweep(1_000_000, 2_000_000, 11).unwrap();
        let first = vna.read_values(Channel::S21).unwrap();
        vna.set_sweep(1_000_000, 2_000_000, 11).unwrap();
        let second = vna.read_values(Channel::S21).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_drift_changes_data() {
        let mut vna = connected(MockVna::new().with_sweep_delay(Duration::ZERO));
        vna.set_sweep(1_000_000, 2_000_000, 11).unwrap();
        let first = vna.read_values(Channel::S11).unwrap();
        vna.set_sweep(1_000_000, 2_000_000, 11).unwrap();
        let second = vna.read_values(Channel::S11).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_seeded_noise_deterministic() {
        let read = || {
            let mut vna = connected(
                MockVna::new()
                    .frozen()
                    .with_noise(1e-3, Some(42))
                    .with_sweep_delay(Duration::ZERO),
            );
            vna.set_sweep(1_000_000, 2_000_000, 5).unwrap();
            vna.read_values(Channel::S11).unwrap()
        };
        assert_eq!(read(), read());
    }

    #[test]
    fn test_malformed_injection_targets_one_acquisition() {
        let mut vna = connected(
            MockVna::new()
                .with_malformed_acquisition(1)
                .with_sweep_delay(Duration::ZERO),
        );
        vna.set_sweep(1, 10, 3).unwrap();
        assert_ne!(vna.read_values(Channel::S11).unwrap()[0], MALFORMED_SAMPLE);
        vna.set_sweep(1, 10, 3).unwrap();
        assert_eq!(vna.read_values(Channel::S11).unwrap()[0], MALFORMED_SAMPLE);
        assert_ne!(vna.read_values(Channel::S21).unwrap()[0], MALFORMED_SAMPLE);
    }

    #[test]
    fn test_stuck_disconnect() {
        let vna = MockVna::new().stuck_connected();
        let probe = vna.probe();
        let mut vna = connected(vna);
        vna.disconnect().unwrap();
        assert!(vna.connected());
        assert_eq!(probe.disconnects(), 1);
    }
}
