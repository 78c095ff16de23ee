//! Measurement sessions.
//!
//! A session is what a caller holds for the lifetime of one measurement
//! setup. Both variants share the [`Session`] capability interface:
//!
//! - **[`LiveSession`]**: owns a connected instrument, its orchestrator and
//!   calibration. Everything is supported.
//! - **[`PlaybackSession`]**: bound to a recording. Only single reads and
//!   recorded streams are supported; the rest fail with
//!   `UnsupportedInSession`.
//!
//! Shutting a live session down disconnects the instrument and fails with
//! `DisconnectFailure` if the instrument still reports a connection.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use vna_driver::{MockVna, VnaDevice};

use crate::acquisition::{Orchestrator, StreamSource, SweepStream};
use crate::calibration::{
    run_calibration, AutoConfirm, Calibration, CalibrationOutcome, CalibrationRequest,
    StandardPrompt, StandardsGuide,
};
use crate::config::Settings;
use crate::error::{Result, VnaError};
use crate::measurement::SweepResult;
use crate::recording::RecordedSource;
use crate::sweep::{SweepConfig, SweepProducer};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Operations common to live and playback sessions.
pub trait Session {
    /// Short name used in errors and logs.
    fn kind(&self) -> &'static str;

    fn configure_sweep(&mut self, config: SweepConfig) -> Result<()>;

    /// Load a calibration from `load`, or run the calibration guide and save
    /// its result to `save` (a timestamped default name when `None`).
    fn calibrate(&mut self, save: Option<&Path>, load: Option<&Path>)
        -> Result<CalibrationOutcome>;

    fn run_single(&mut self) -> Result<SweepResult>;

    fn open_stream(&mut self, source: StreamSource) -> Result<SweepStream<'_>>;

    /// Stop any stream and release the source. Idempotent.
    fn shutdown(&mut self) -> Result<()>;
}

/// Open the instrument selected by `settings.device`.
pub fn open_device(settings: &Settings) -> Result<Box<dyn VnaDevice>> {
    if settings.device.simulate {
        info!("Using simulated analyzer");
        return Ok(Box::new(MockVna::new()));
    }
    open_serial_device(settings)
}

#[cfg(feature = "instrument_serial")]
fn open_serial_device(settings: &Settings) -> Result<Box<dyn VnaDevice>> {
    use vna_driver::{open_interface, NanoVna};

    let device = &settings.device;
    let timeout = settings.device_timeout();
    let vna = match &device.port {
        Some(port) => NanoVna::new(port.clone(), device.baud_rate, timeout),
        None => open_interface(device.index, device.baud_rate, timeout)?,
    };
    Ok(Box::new(vna))
}

#[cfg(not(feature = "instrument_serial"))]
fn open_serial_device(_settings: &Settings) -> Result<Box<dyn VnaDevice>> {
    Err(VnaError::InvalidConfig(
        "built without serial instrument support; enable simulate".to_string(),
    ))
}

fn identify(device: &mut dyn VnaDevice) -> Result<(String, Vec<String>)> {
    Ok((device.read_firmware()?, device.read_features()?))
}

/// Session on a connected instrument.
pub struct LiveSession {
    orchestrator: Orchestrator,
    prompt: Box<dyn StandardPrompt>,
    calibration: Option<Arc<Calibration>>,
    calibration_dir: PathBuf,
    step_budget: Option<usize>,
    device: String,
    firmware: String,
    features: Vec<String>,
    closed: bool,
}

impl LiveSession {
    /// Connect `device` and prepare it for `config`.
    pub fn new(device: Box<dyn VnaDevice>, config: SweepConfig) -> Result<Self> {
        Self::from_producer(SweepProducer::new(device, config)?, DEFAULT_POLL_INTERVAL)
    }

    /// Open, connect and configure the instrument described by `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let producer = SweepProducer::new(open_device(settings)?, settings.sweep_config())?
            .with_policy(settings.acquisition.sample_policy);
        let mut session = Self::from_producer(producer, settings.poll_interval())?;
        session.calibration_dir = settings.calibration.directory.clone();
        session.step_budget = settings.calibration.step_budget;
        Ok(session)
    }

    /// Connect the producer's instrument and read its identification.
    pub fn from_producer(mut producer: SweepProducer, poll_interval: Duration) -> Result<Self> {
        let device = producer.device_mut();
        device.connect()?;

        let (firmware, features) = match identify(device) {
            Ok(id) => id,
            Err(e) => {
                if let Err(de) = device.disconnect() {
                    warn!(error = %de, "Disconnect after failed identification also failed");
                }
                return Err(e);
            }
        };

        let name = device.name().to_string();
        info!(device = %name, firmware = %firmware.replace('\n', " | "), "Connected to analyzer");
        info!(device = %name, features = %features.join(", "), "Analyzer features");

        Ok(Self {
            orchestrator: Orchestrator::new(producer, poll_interval),
            prompt: Box::new(AutoConfirm::new()),
            calibration: None,
            calibration_dir: PathBuf::from("."),
            step_budget: None,
            device: name,
            firmware,
            features,
            closed: false,
        })
    }

    /// Use `prompt` to ask for calibration standards.
    pub fn with_prompt(mut self, prompt: impl StandardPrompt + 'static) -> Self {
        self.prompt = Box::new(prompt);
        self
    }

    pub fn with_calibration_dir(mut self, directory: impl Into<PathBuf>) -> Self {
        self.calibration_dir = directory.into();
        self
    }

    pub fn with_step_budget(mut self, budget: Option<usize>) -> Self {
        self.step_budget = budget;
        self
    }

    pub fn device_name(&self) -> &str {
        &self.device
    }

    pub fn firmware(&self) -> &str {
        &self.firmware
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_deref()
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut Orchestrator {
        &mut self.orchestrator
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Session for LiveSession {
    fn kind(&self) -> &'static str {
        "live"
    }

    fn configure_sweep(&mut self, config: SweepConfig) -> Result<()> {
        self.orchestrator.configure_sweep(config)
    }

    fn calibrate(
        &mut self,
        save: Option<&Path>,
        load: Option<&Path>,
    ) -> Result<CalibrationOutcome> {
        let request = CalibrationRequest {
            save: save.map(Path::to_path_buf),
            load: load.map(Path::to_path_buf),
            directory: self.calibration_dir.clone(),
            step_budget: self.step_budget,
        };
        let prompt = self.prompt.as_mut();

        let (outcome, calibration) = self.orchestrator.with_producer(
            |producer| -> Result<(CalibrationOutcome, Option<Arc<Calibration>>)> {
                let mut guide = StandardsGuide::new(producer, prompt);
                let outcome = run_calibration(&mut guide, &request)?;
                let calibration = guide.into_calibration().map(Arc::new);
                producer.set_calibration(calibration.clone());
                Ok((outcome, calibration))
            },
        )??;

        self.calibration = calibration;
        info!(?outcome, "Calibration ready");
        Ok(outcome)
    }

    fn run_single(&mut self) -> Result<SweepResult> {
        self.orchestrator.run_single()
    }

    fn open_stream(&mut self, source: StreamSource) -> Result<SweepStream<'_>> {
        self.orchestrator.open_stream(source)
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        if let Err(e) = self.orchestrator.stop() {
            warn!(error = %e, "Sweep producer ended abnormally");
        }

        let still_connected = self.orchestrator.with_producer(|producer| -> Result<bool> {
            let device = producer.device_mut();
            device.disconnect()?;
            Ok(device.connected())
        })??;

        if still_connected {
            error!(device = %self.device, "Analyzer still connected after disconnect");
            return Err(VnaError::DisconnectFailure {
                device: self.device.clone(),
            });
        }
        info!(device = %self.device, "Session closed");
        Ok(())
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Error shutting down session on drop: {}", e);
        }
    }
}

/// Session replaying a recording.
#[derive(Debug)]
pub struct PlaybackSession {
    path: PathBuf,
    looping: bool,
    closed: bool,
}

impl PlaybackSession {
    /// Bind to `path`, failing with `SourceUnavailable` if it cannot be read.
    pub fn new(path: impl Into<PathBuf>, looping: bool) -> Result<Self> {
        let path = path.into();
        RecordedSource::open(&path, false)?;
        info!(path = %path.display(), looping, "Playback session opened");
        Ok(Self {
            path,
            looping,
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream the bound recording.
    pub fn stream(&mut self) -> Result<SweepStream<'_>> {
        let source = StreamSource::recorded(self.path.clone(), self.looping);
        self.open_stream(source)
    }

    fn unsupported(&self, operation: &'static str) -> VnaError {
        VnaError::UnsupportedInSession {
            operation,
            session: self.kind(),
        }
    }
}

impl Session for PlaybackSession {
    fn kind(&self) -> &'static str {
        "playback"
    }

    fn configure_sweep(&mut self, _config: SweepConfig) -> Result<()> {
        Err(self.unsupported("configure_sweep"))
    }

    fn calibrate(
        &mut self,
        _save: Option<&Path>,
        _load: Option<&Path>,
    ) -> Result<CalibrationOutcome> {
        Err(self.unsupported("calibrate"))
    }

    /// The first sweep of the recording.
    fn run_single(&mut self) -> Result<SweepResult> {
        match RecordedSource::open(&self.path, false)?.next() {
            Some(result) => result,
            None => Err(VnaError::MalformedRecording {
                path: self.path.clone(),
                line: 0,
                reason: "recording holds no complete sweep".to_string(),
            }),
        }
    }

    fn open_stream(&mut self, source: StreamSource) -> Result<SweepStream<'_>> {
        match source {
            StreamSource::Live => Err(self.unsupported("open_stream(live)")),
            StreamSource::Recorded { path, looping } => Ok(SweepStream::recorded(
                RecordedSource::open(path, looping)?,
            )),
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            info!(path = %self.path.display(), "Playback session closed");
        }
        Ok(())
    }
}
