//! Sweep configuration and segment layout.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VnaError};

/// Whether a run acquires one sweep or repeats until stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepMode {
    #[default]
    Single,
    Continuous,
}

/// Frequency range and sampling of a sweep.
///
/// The range is split into `segments` consecutive pieces of `points` samples
/// each, so one sweep yields `segments * points` datapoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// First frequency in Hz
    pub start: u64,
    /// Last frequency in Hz
    pub stop: u64,
    pub segments: usize,
    /// Points per segment
    pub points: usize,
    #[serde(default)]
    pub mode: SweepMode,
}

impl SweepConfig {
    /// A single-mode sweep.
    pub fn new(start: u64, stop: u64, segments: usize, points: usize) -> Self {
        Self {
            start,
            stop,
            segments,
            points,
            mode: SweepMode::Single,
        }
    }

    pub fn with_mode(mut self, mode: SweepMode) -> Self {
        self.mode = mode;
        self
    }

    /// Reject non-positive bounds and inverted ranges.
    pub fn validate(&self) -> Result<()> {
        if self.start == 0 || self.stop == 0 {
            return Err(VnaError::InvalidConfig(format!(
                "frequencies must be positive (start {} Hz, stop {} Hz)",
                self.start, self.stop
            )));
        }
        if self.segments == 0 || self.points == 0 {
            return Err(VnaError::InvalidConfig(format!(
                "segments ({}) and points ({}) must be at least 1",
                self.segments, self.points
            )));
        }
        if self.segments.checked_mul(self.points).is_none() {
            return Err(VnaError::InvalidConfig(format!(
                "{} segments of {} points overflow the point count",
                self.segments, self.points
            )));
        }
        if self.start > self.stop {
            return Err(VnaError::InvalidConfig(format!(
                "start {} Hz is above stop {} Hz",
                self.start, self.stop
            )));
        }
        Ok(())
    }

    /// Datapoints in one full sweep.
    ///
    /// Saturates for configs that `validate` rejects.
    pub fn total_points(&self) -> usize {
        self.segments.saturating_mul(self.points)
    }

    /// Whether two configs cover the same frequencies (mode ignored).
    pub fn same_range(&self, other: &SweepConfig) -> bool {
        self.start == other.start
            && self.stop == other.stop
            && self.total_points() == other.total_points()
    }

    /// Start and stop frequency of segment `index`.
    ///
    /// All points of the sweep sit on one evenly spaced grid from `start` to
    /// `stop`; each segment takes the next `points` grid positions.
    pub fn segment_bounds(&self, index: usize) -> (u64, u64) {
        let total = self.total_points();
        if total <= 1 {
            return (self.start, self.start);
        }
        let step = self.stop.saturating_sub(self.start) as f64 / (total - 1) as f64;
        let first = index.saturating_mul(self.points).min(total - 1);
        let last = first.saturating_add(self.points - 1).min(total - 1);
        let at = |i: usize| {
            if i + 1 >= total {
                self.stop
            } else {
                self.start + (i as f64 * step).round() as u64
            }
        };
        (at(first), at(last))
    }

    /// Bounds of every segment in order.
    pub fn segment_iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        (0..self.segments).map(|i| self.segment_bounds(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_bounds() {
        assert!(SweepConfig::new(0, 10, 1, 1).validate().is_err());
        assert!(SweepConfig::new(10, 0, 1, 1).validate().is_err());
        assert!(SweepConfig::new(10, 20, 0, 1).validate().is_err());
        assert!(SweepConfig::new(10, 20, 1, 0).validate().is_err());
        assert!(SweepConfig::new(30, 20, 1, 1).validate().is_err());
        assert!(SweepConfig::new(20, 20, 1, 1).validate().is_ok());
    }

    #[test]
    fn rejects_point_count_overflow() {
        let config = SweepConfig::new(1_000, 2_000, usize::MAX / 2 + 1, 2);
        assert!(matches!(config.validate(), Err(VnaError::InvalidConfig(_))));
        assert_eq!(config.total_points(), usize::MAX);
        assert_eq!(config.segment_bounds(3), (1_000, 1_000));
        assert!(SweepConfig::new(1_000, 2_000, usize::MAX, 1).validate().is_ok());
    }

    #[test]
    fn single_segment_spans_range() {
        let config = SweepConfig::new(2_900_000_000, 3_100_000_000, 1, 101);
        assert_eq!(config.segment_bounds(0), (2_900_000_000, 3_100_000_000));
    }

    #[test]
    fn segments_tile_the_grid() {
        // 4 segments x 11 points over 0.1..4.4 MHz: step is 100 kHz
        let config = SweepConfig::new(100_000, 4_400_000, 4, 11);
        let bounds: Vec<_> = config.segment_iter().collect();
        assert_eq!(bounds[0], (100_000, 1_100_000));
        assert_eq!(bounds[1], (1_200_000, 2_200_000));
        assert_eq!(bounds[3], (3_400_000, 4_400_000));
        assert!(bounds.windows(2).all(|w| w[0].1 < w[1].0));
    }

    #[test]
    fn single_point_sweep() {
        let config = SweepConfig::new(1_000_000, 2_000_000, 1, 1);
        assert_eq!(config.segment_bounds(0), (1_000_000, 1_000_000));
    }

    #[test]
    fn same_range_ignores_mode() {
        let a = SweepConfig::new(1, 100, 2, 10);
        let b = a.with_mode(SweepMode::Continuous);
        assert!(a.same_range(&b));
        assert!(!a.same_range(&SweepConfig::new(1, 100, 1, 10)));
    }
}
