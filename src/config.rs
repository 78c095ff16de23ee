//! Configuration System using Figment
//!
//! Settings are layered, later sources overriding earlier ones:
//! 1. Built-in defaults (`Settings::default()`)
//! 2. An optional TOML file
//! 3. Environment variables prefixed with `VNA_HEADLESS_`, nested with `__`
//!
//! # Example
//! ```no_run
//! use vna_headless::config::Settings;
//!
//! # fn main() -> vna_headless::error::Result<()> {
//! // VNA_HEADLESS_SWEEP__POINTS=51 overrides [sweep] points
//! let settings = Settings::load(Some("vna.toml".as_ref()))?;
//! println!("Sweeping {} points", settings.sweep.points);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, VnaError};
use crate::measurement::SamplePolicy;
use crate::sweep::SweepConfig;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "VNA_HEADLESS_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub application: ApplicationConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub sweep: SweepSettings,
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Instrument selection and link parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Use the simulated analyzer instead of hardware
    #[serde(default)]
    pub simulate: bool,
    /// Index into the discovered interfaces
    #[serde(default)]
    pub index: usize,
    /// Explicit serial port, bypassing discovery
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Per-command timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// Default sweep applied when a session starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepSettings {
    #[serde(default = "default_start_hz")]
    pub start_hz: u64,
    #[serde(default = "default_stop_hz")]
    pub stop_hz: u64,
    #[serde(default = "default_segments")]
    pub segments: usize,
    #[serde(default = "default_points")]
    pub points: usize,
}

/// Streaming behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// How long a consumer waits for a new sweep before re-checking the run flag
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// What to do with samples that fail to decode
    #[serde(default)]
    pub sample_policy: SamplePolicy,
}

/// Calibration storage and guide limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Where auto-named calibration files are written
    #[serde(default = "default_calibration_dir")]
    pub directory: PathBuf,
    /// Abort the guide after this many steps (unbounded when unset)
    #[serde(default)]
    pub step_budget: Option<usize>,
}

/// Recording output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingConfig {
    #[serde(default = "default_recording_dir")]
    pub directory: PathBuf,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_timeout_ms() -> u64 {
    1_000
}

fn default_start_hz() -> u64 {
    2_900_000_000
}

fn default_stop_hz() -> u64 {
    3_100_000_000
}

fn default_segments() -> usize {
    1
}

fn default_points() -> usize {
    101
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_calibration_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_recording_dir() -> PathBuf {
    PathBuf::from("recordings")
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            simulate: false,
            index: 0,
            port: None,
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            start_hz: default_start_hz(),
            stop_hz: default_stop_hz(),
            segments: default_segments(),
            points: default_points(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            sample_policy: SamplePolicy::default(),
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            directory: default_calibration_dir(),
            step_budget: None,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            directory: default_recording_dir(),
        }
    }
}

impl Settings {
    /// Load defaults, then `path` (if given), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = path {
            if !path.is_file() {
                return Err(VnaError::InvalidConfig(format!(
                    "configuration file '{}' not found",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }
        let settings: Settings = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a TOML string on top of the defaults.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::string(toml))
            .extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(VnaError::InvalidConfig(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(VnaError::InvalidConfig(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.device.baud_rate == 0 {
            return Err(VnaError::InvalidConfig("baud_rate must be positive".into()));
        }
        if self.device.timeout_ms == 0 {
            return Err(VnaError::InvalidConfig("timeout_ms must be positive".into()));
        }
        if self.acquisition.poll_interval_ms == 0 {
            return Err(VnaError::InvalidConfig(
                "poll_interval_ms must be positive".into(),
            ));
        }
        if self.calibration.step_budget == Some(0) {
            return Err(VnaError::InvalidConfig("step_budget must be positive".into()));
        }

        self.sweep_config().validate()
    }

    /// The configured default sweep.
    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig::new(
            self.sweep.start_hz,
            self.sweep.stop_hz,
            self.sweep.segments,
            self.sweep.points,
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.acquisition.poll_interval_ms)
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_millis(self.device.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.sweep_config().total_points(), 101);
        assert_eq!(settings.acquisition.sample_policy, SamplePolicy::Abort);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            [sweep]
            points = 51
            segments = 4

            [acquisition]
            sample_policy = "skip"
            "#,
        )
        .unwrap();
        assert_eq!(settings.sweep.points, 51);
        assert_eq!(settings.sweep.segments, 4);
        assert_eq!(settings.sweep.start_hz, 2_900_000_000);
        assert_eq!(settings.acquisition.sample_policy, SamplePolicy::Skip);
        assert_eq!(settings.device.baud_rate, 115_200);
    }

    #[test]
    fn test_config_validation() {
        let mut settings = Settings::default();
        settings.application.log_level = "loud".to_string();
        assert!(matches!(
            settings.validate(),
            Err(VnaError::InvalidConfig(_))
        ));

        let mut settings = Settings::default();
        settings.acquisition.poll_interval_ms = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.sweep.start_hz = 4_000_000_000;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_rejected() {
        let err = Settings::load(Some(Path::new("/nonexistent/vna.toml"))).unwrap_err();
        assert!(matches!(err, VnaError::InvalidConfig(_)));
    }

    #[test]
    fn test_env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "vna.toml",
                r#"
                [sweep]
                points = 201

                [device]
                simulate = true
                "#,
            )?;
            jail.set_env("VNA_HEADLESS_SWEEP__POINTS", "51");

            let settings =
                Settings::load(Some(Path::new("vna.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(settings.sweep.points, 51);
            assert!(settings.device.simulate);
            Ok(())
        });
    }
}
