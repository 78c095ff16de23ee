//! Producer thread lifecycle.

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::slot::{PassFault, RunShared, RunningGuard};
use super::stream::SweepStream;
use super::RunState;
use crate::error::{Result, VnaError};
use crate::measurement::SweepResult;
use crate::recording::RecordedSource;
use crate::sweep::{SweepConfig, SweepMode, SweepProducer};

/// Name of the background producer thread.
pub const WORKER_THREAD_NAME: &str = "vna-sweep";

/// Where a stream takes its sweeps from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSource {
    /// The instrument, swept continuously on a background thread
    Live,
    /// A recording replayed on the consumer's thread
    Recorded { path: PathBuf, looping: bool },
}

impl StreamSource {
    pub fn recorded(path: impl Into<PathBuf>, looping: bool) -> Self {
        StreamSource::Recorded {
            path: path.into(),
            looping,
        }
    }
}

/// Starts, stops and joins the sweep producer.
///
/// The producer sits behind a mutex that the background thread holds for the
/// whole run; foreground calls that need it refuse with `Busy` while a run is
/// active instead of blocking on the lock.
pub struct Orchestrator {
    producer: Arc<Mutex<SweepProducer>>,
    shared: Option<Arc<RunShared>>,
    worker: Option<JoinHandle<()>>,
    mode: SweepMode,
    last_result: Option<SweepResult>,
    single_faults: Vec<PassFault>,
    poll_interval: Duration,
}

impl Orchestrator {
    pub fn new(producer: SweepProducer, poll_interval: Duration) -> Self {
        let mode = producer.config().mode;
        Self {
            producer: Arc::new(Mutex::new(producer)),
            shared: None,
            worker: None,
            mode,
            last_result: None,
            single_faults: Vec::new(),
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Whether a run is active.
    pub fn is_running(&self) -> bool {
        self.shared.as_ref().is_some_and(|s| s.is_running())
    }

    /// Whether a background thread has not been joined yet.
    pub fn has_worker(&self) -> bool {
        self.worker.is_some()
    }

    /// Replace the sweep configuration. Refused while running.
    pub fn configure_sweep(&mut self, config: SweepConfig) -> Result<()> {
        self.with_producer(|p| p.configure(config))?
    }

    /// Run exactly one sweep on the calling thread.
    ///
    /// Points dropped under `SamplePolicy::Skip` are kept for `take_faults`.
    pub fn run_single(&mut self) -> Result<SweepResult> {
        self.mode = SweepMode::Single;
        let (result, skipped) = self.with_producer(|p| {
            p.set_mode(SweepMode::Single);
            p.run_once()
        })??;
        self.single_faults.extend(skipped);
        self.last_result = Some(result.clone());
        Ok(result)
    }

    /// Open a lazy stream of sweeps.
    ///
    /// `Live` starts the background producer in continuous mode and returns
    /// immediately. `Recorded` opens the file up front, failing with
    /// `SourceUnavailable`, and starts no thread.
    pub fn open_stream(&mut self, source: StreamSource) -> Result<SweepStream<'_>> {
        match source {
            StreamSource::Live => {
                let shared = self.start()?;
                Ok(SweepStream::live(self, shared))
            }
            StreamSource::Recorded { path, looping } => {
                let source = RecordedSource::open(&path, looping)?;
                Ok(SweepStream::recorded(source))
            }
        }
    }

    /// Start the producer loop on the background thread.
    fn start(&mut self) -> Result<Arc<RunShared>> {
        if self.worker.is_some() {
            warn!("Sweep producer still active, stopping it before starting a new stream");
            self.stop()?;
        }

        self.mode = SweepMode::Continuous;
        self.producer.lock().set_mode(SweepMode::Continuous);

        let shared = Arc::new(RunShared::new(true));
        let producer = Arc::clone(&self.producer);
        let guard = RunningGuard(Arc::clone(&shared));

        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || {
                let guard = guard;
                let mut producer = producer.lock();
                debug!("Sweep producer thread started");
                if let Err(e) = producer.run_loop(&guard.0) {
                    guard.0.set_fatal(e);
                }
                debug!(passes = producer.passes(), "Sweep producer thread exiting");
            })?;

        self.shared = Some(Arc::clone(&shared));
        self.worker = Some(handle);
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Started continuous sweep"
        );
        Ok(shared)
    }

    /// Stop the run and join the background thread.
    ///
    /// Idempotent. Returns once the thread has exited; a sweep in flight is
    /// completed first. A panic on the producer thread is reported here as
    /// `ProducerPanicked`.
    pub fn stop(&mut self) -> Result<()> {
        if let Some(shared) = &self.shared {
            shared.request_stop();
        }

        let Some(handle) = self.worker.take() else {
            return Ok(());
        };
        let joined = handle.join();

        if let Some(shared) = &self.shared {
            if let Some((_, latest)) = shared.latest.latest() {
                self.last_result = Some(latest);
            }
            info!(
                faults = shared.fault_count(),
                "Stopped continuous sweep"
            );
        }

        joined.map_err(|payload| {
            let message = panic_message(payload.as_ref());
            error!(%message, "Sweep producer thread panicked");
            VnaError::ProducerPanicked(message)
        })
    }

    pub fn run_state(&self) -> RunState {
        RunState {
            running: self.is_running(),
            mode: self.mode,
            last_result: self.last_result(),
        }
    }

    /// The most recent sweep, from the background run if one is unjoined.
    pub fn last_result(&self) -> Option<SweepResult> {
        let live = self
            .shared
            .as_ref()
            .filter(|_| self.worker.is_some())
            .and_then(|s| s.latest.latest())
            .map(|(_, r)| r);
        live.or_else(|| self.last_result.clone())
    }

    /// Failed passes and skipped points of single sweeps and of the
    /// current or last run, oldest first.
    pub fn take_faults(&mut self) -> Vec<PassFault> {
        let mut faults = std::mem::take(&mut self.single_faults);
        if let Some(shared) = &self.shared {
            faults.extend(shared.take_faults());
        }
        faults
    }

    /// Error that ended the current or last run, if not already taken.
    pub fn take_fatal(&mut self) -> Option<VnaError> {
        self.shared.as_ref().and_then(|s| s.take_fatal())
    }

    /// Run `f` on the producer. Refused while a run is active.
    pub fn with_producer<R>(&mut self, f: impl FnOnce(&mut SweepProducer) -> R) -> Result<R> {
        if self.is_running() {
            return Err(VnaError::Busy("producer is owned by the running sweep"));
        }
        // Join a thread that ended on its own so it releases the producer
        self.stop()?;
        let mut producer = self.producer.lock();
        Ok(f(&mut producer))
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Error stopping sweep producer on drop: {}", e);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vna_driver::{MockVna, VnaDevice};

    fn orchestrator(vna: MockVna) -> Orchestrator {
        let mut device: Box<dyn VnaDevice> = Box::new(vna);
        device.connect().unwrap();
        let producer =
            SweepProducer::new(device, SweepConfig::new(1_000_000, 2_000_000, 1, 11)).unwrap();
        Orchestrator::new(producer, Duration::from_millis(5))
    }

    #[test]
    fn stop_is_idempotent_without_worker() {
        let mut orch = orchestrator(MockVna::new());
        assert!(orch.stop().is_ok());
        assert!(orch.stop().is_ok());
        assert!(!orch.is_running());
    }

    #[test]
    fn run_single_records_last_result() {
        let mut orch = orchestrator(MockVna::new().with_sweep_delay(Duration::ZERO));
        let result = orch.run_single().unwrap();
        assert_eq!(result.len(), 11);
        let state = orch.run_state();
        assert!(!state.running);
        assert_eq!(state.mode, SweepMode::Single);
        assert_eq!(state.last_result, Some(result));
    }

    #[test]
    fn run_single_keeps_skipped_points_for_take_faults() {
        let mut device: Box<dyn VnaDevice> = Box::new(
            MockVna::new()
                .with_sweep_delay(Duration::ZERO)
                .with_malformed_acquisition(0),
        );
        device.connect().unwrap();
        let producer = SweepProducer::new(device, SweepConfig::new(1_000_000, 2_000_000, 1, 11))
            .unwrap()
            .with_policy(crate::measurement::SamplePolicy::Skip);
        let mut orch = Orchestrator::new(producer, Duration::from_millis(5));

        assert_eq!(orch.run_single().unwrap().len(), 10);
        let faults = orch.take_faults();
        assert_eq!(faults.len(), 1);
        assert_eq!(faults[0].pass, 0);
        assert!(matches!(faults[0].error, VnaError::MalformedSample { .. }));

        assert_eq!(orch.run_single().unwrap().len(), 11);
        assert!(orch.take_faults().is_empty());
    }

    #[test]
    fn configure_is_refused_while_streaming() {
        let mut orch = orchestrator(MockVna::new());
        orch.start().unwrap();
        assert!(matches!(
            orch.configure_sweep(SweepConfig::new(1, 2, 1, 2)),
            Err(VnaError::Busy(_))
        ));
        orch.stop().unwrap();
        assert!(!orch.has_worker());
        orch.configure_sweep(SweepConfig::new(1, 2, 1, 2)).unwrap();
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut orch = orchestrator(MockVna::new());
        assert!(matches!(
            orch.configure_sweep(SweepConfig::new(10, 5, 1, 2)),
            Err(VnaError::InvalidConfig(_))
        ));
        assert!(matches!(
            orch.configure_sweep(SweepConfig::new(1_000, 2_000, usize::MAX / 2 + 1, 2)),
            Err(VnaError::InvalidConfig(_))
        ));
        assert_eq!(orch.run_single().unwrap().len(), 11);
    }

    #[test]
    fn restart_replaces_leaked_worker() {
        let mut orch = orchestrator(MockVna::new());
        orch.start().unwrap();
        orch.start().unwrap();
        assert!(orch.has_worker());
        orch.stop().unwrap();
        assert!(!orch.has_worker());
    }

    #[test]
    fn fatal_error_ends_run() {
        let mut orch =
            orchestrator(MockVna::new().with_sweep_delay(Duration::ZERO).with_failing_acquisition(0));
        orch.start().unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while orch.is_running() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!orch.is_running());
        orch.stop().unwrap();
        assert!(matches!(orch.take_fatal(), Some(VnaError::Driver(_))));
    }
}
