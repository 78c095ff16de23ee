//! Calibration artifact and its JSON file.

use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, VnaError};
use crate::measurement::SweepResult;
use crate::sweep::SweepConfig;

/// Calibration standard connected to the port during one guide step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Standard {
    Short,
    Open,
    Load,
    Through,
}

impl Standard {
    /// Order in which the guide asks for the standards.
    pub const SEQUENCE: [Standard; 4] = [
        Standard::Short,
        Standard::Open,
        Standard::Load,
        Standard::Through,
    ];

    /// The standard measured after this one.
    pub fn next(self) -> Option<Standard> {
        match self {
            Standard::Short => Some(Standard::Open),
            Standard::Open => Some(Standard::Load),
            Standard::Load => Some(Standard::Through),
            Standard::Through => None,
        }
    }
}

impl fmt::Display for Standard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Standard::Short => write!(f, "SHORT"),
            Standard::Open => write!(f, "OPEN"),
            Standard::Load => write!(f, "LOAD"),
            Standard::Through => write!(f, "THROUGH"),
        }
    }
}

/// Raw sweep taken with one standard connected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardMeasurement {
    pub standard: Standard,
    pub result: SweepResult,
}

/// Measured standards for one sweep range.
///
/// The correction math that turns these into error terms lives in the
/// consumer; this type only records and persists the measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub created: DateTime<Utc>,
    /// Sweep the standards were measured with
    pub sweep: SweepConfig,
    /// Instrument name at measurement time
    pub device: String,
    pub standards: Vec<StandardMeasurement>,
}

impl Calibration {
    pub fn new(sweep: SweepConfig, device: impl Into<String>) -> Self {
        Self {
            created: Utc::now(),
            sweep,
            device: device.into(),
            standards: Vec::new(),
        }
    }

    /// Store the measurement for `standard`, replacing an earlier one.
    pub fn record(&mut self, standard: Standard, result: SweepResult) {
        self.standards.retain(|m| m.standard != standard);
        self.standards.push(StandardMeasurement { standard, result });
    }

    pub fn measurement(&self, standard: Standard) -> Option<&SweepResult> {
        self.standards
            .iter()
            .find(|m| m.standard == standard)
            .map(|m| &m.result)
    }

    /// Standards not measured yet, in guide order.
    pub fn missing(&self) -> Vec<Standard> {
        Standard::SEQUENCE
            .into_iter()
            .filter(|s| self.measurement(*s).is_none())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Whether this calibration applies to sweeps over `config`.
    pub fn matches(&self, config: &SweepConfig) -> bool {
        self.sweep.same_range(config)
    }

    /// Write the calibration as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if !self.is_complete() {
            return Err(VnaError::CalibrationIncomplete(format!(
                "missing {}",
                list(&self.missing())
            )));
        }
        let save_error = |reason: String| VnaError::CalibrationSaveError {
            path: path.to_path_buf(),
            reason,
        };

        let json = serde_json::to_string_pretty(self).map_err(|e| save_error(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| save_error(e.to_string()))?;
        }
        fs::write(path, json).map_err(|e| save_error(e.to_string()))?;

        info!(path = %path.display(), device = %self.device, "Saved calibration");
        Ok(())
    }

    /// Read a calibration written by [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self> {
        let load_error = |reason: String| VnaError::CalibrationLoadError {
            path: path.to_path_buf(),
            reason,
        };

        let json = fs::read_to_string(path).map_err(|e| load_error(e.to_string()))?;
        let calibration: Calibration =
            serde_json::from_str(&json).map_err(|e| load_error(e.to_string()))?;
        if !calibration.is_complete() {
            return Err(load_error(format!(
                "missing {}",
                list(&calibration.missing())
            )));
        }
        if let Some(bad) = calibration
            .standards
            .iter()
            .find(|m| !m.result.is_consistent())
        {
            return Err(load_error(format!("{} measurement is inconsistent", bad.standard)));
        }

        info!(
            path = %path.display(),
            device = %calibration.device,
            created = %calibration.created,
            "Loaded calibration"
        );
        Ok(calibration)
    }
}

fn list(standards: &[Standard]) -> String {
    standards
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(v: f64) -> SweepResult {
        SweepResult {
            refl_re: vec![v, v],
            refl_im: vec![0.0, 0.1],
            thru_re: vec![0.2, 0.3],
            thru_im: vec![0.4, 0.5],
            freq: vec![1_000, 2_000],
        }
    }

    fn complete() -> Calibration {
        let mut cal = Calibration::new(SweepConfig::new(1_000, 2_000, 1, 2), "mock-vna");
        for (i, s) in Standard::SEQUENCE.into_iter().enumerate() {
            cal.record(s, result(i as f64));
        }
        cal
    }

    #[test]
    fn sequence_follows_next() {
        let mut order = vec![Standard::Short];
        while let Some(next) = order.last().and_then(|s| s.next()) {
            order.push(next);
        }
        assert_eq!(order, Standard::SEQUENCE.to_vec());
    }

    #[test]
    fn record_replaces() {
        let mut cal = Calibration::new(SweepConfig::new(1_000, 2_000, 1, 2), "mock-vna");
        cal.record(Standard::Open, result(1.0));
        cal.record(Standard::Open, result(2.0));
        assert_eq!(cal.standards.len(), 1);
        assert_eq!(cal.measurement(Standard::Open), Some(&result(2.0)));
        assert_eq!(
            cal.missing(),
            vec![Standard::Short, Standard::Load, Standard::Through]
        );
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cal.json");
        let cal = complete();
        cal.save(&path).unwrap();
        let loaded = Calibration::load(&path).unwrap();
        assert_eq!(loaded, cal);
        assert!(loaded.matches(&SweepConfig::new(1_000, 2_000, 2, 1)));
        assert!(!loaded.matches(&SweepConfig::new(1_000, 3_000, 1, 2)));
    }

    #[test]
    fn incomplete_is_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let cal = Calibration::new(SweepConfig::new(1_000, 2_000, 1, 2), "mock-vna");
        assert!(matches!(
            cal.save(&dir.path().join("cal.json")),
            Err(VnaError::CalibrationIncomplete(_))
        ));
    }

    #[test]
    fn load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(matches!(
            Calibration::load(&missing),
            Err(VnaError::CalibrationLoadError { .. })
        ));

        let garbage = dir.path().join("garbage.json");
        fs::write(&garbage, "not json").unwrap();
        assert!(matches!(
            Calibration::load(&garbage),
            Err(VnaError::CalibrationLoadError { .. })
        ));

        let mut partial = complete();
        partial.standards.pop();
        let partial_path = dir.path().join("partial.json");
        fs::write(&partial_path, serde_json::to_string(&partial).unwrap()).unwrap();
        let err = Calibration::load(&partial_path).unwrap_err();
        assert!(err.to_string().contains("THROUGH"));
    }

    #[test]
    fn save_to_unwritable_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        assert!(matches!(
            complete().save(&blocker.join("cal.json")),
            Err(VnaError::CalibrationSaveError { .. })
        ));
    }
}
