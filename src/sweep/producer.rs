//! Sweep producer: drives the instrument through one pass or a continuous loop.

use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};
use vna_driver::{Channel, VnaDevice};

use super::{SweepConfig, SweepMode};
use crate::acquisition::{PassFault, RunShared};
use crate::calibration::Calibration;
use crate::error::{Result, VnaError};
use crate::measurement::{assemble, SamplePolicy, SweepResult};

/// Owns the instrument handle and the sweep configuration.
///
/// Configuration changes go through the orchestrator, which refuses them
/// while a run is active, so the producer never sees a config change
/// mid-loop.
pub struct SweepProducer {
    device: Box<dyn VnaDevice>,
    config: SweepConfig,
    policy: SamplePolicy,
    calibration: Option<Arc<Calibration>>,
    passes: u64,
}

impl SweepProducer {
    /// Create a producer with a validated configuration.
    pub fn new(device: Box<dyn VnaDevice>, config: SweepConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            device,
            config,
            policy: SamplePolicy::default(),
            calibration: None,
            passes: 0,
        })
    }

    pub fn with_policy(mut self, policy: SamplePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    pub fn policy(&self) -> SamplePolicy {
        self.policy
    }

    /// Passes attempted so far, failed ones included.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn device(&self) -> &dyn VnaDevice {
        self.device.as_ref()
    }

    pub fn device_mut(&mut self) -> &mut dyn VnaDevice {
        self.device.as_mut()
    }

    /// Replace the sweep configuration, keeping the current mode.
    pub fn configure(&mut self, config: SweepConfig) -> Result<()> {
        config.validate()?;
        let mode = self.config.mode;
        self.config = config.with_mode(mode);
        self.check_calibration();
        info!(
            start = config.start,
            stop = config.stop,
            segments = config.segments,
            points = config.points,
            "Sweep configured"
        );
        Ok(())
    }

    pub fn set_mode(&mut self, mode: SweepMode) {
        self.config.mode = mode;
    }

    /// Attach (or clear) the calibration used for this instrument.
    pub fn set_calibration(&mut self, calibration: Option<Arc<Calibration>>) {
        self.calibration = calibration;
        self.check_calibration();
    }

    pub fn calibration(&self) -> Option<&Arc<Calibration>> {
        self.calibration.as_ref()
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    fn check_calibration(&self) {
        if let Some(cal) = &self.calibration {
            if !cal.matches(&self.config) {
                warn!(
                    start = self.config.start,
                    stop = self.config.stop,
                    points = self.config.total_points(),
                    "Calibration was taken over a different sweep range"
                );
            }
        }
    }

    /// Acquire one full sweep across all segments.
    ///
    /// Returns the result with the points dropped under `SamplePolicy::Skip`,
    /// each tagged with this pass's index. Under `Abort` the list is empty.
    pub fn run_once(&mut self) -> Result<(SweepResult, Vec<PassFault>)> {
        let pass = self.passes;
        self.passes += 1;

        let mut result = SweepResult::default();
        let mut skipped = Vec::new();
        for (segment, (start, stop)) in self.config.segment_iter().enumerate() {
            self.device.set_sweep(start, stop, self.config.points)?;
            let s11 = self.device.read_values(Channel::S11)?;
            let s21 = self.device.read_values(Channel::S21)?;
            let freq = self.device.read_frequencies()?;
            trace!(pass, segment, start, stop, points = freq.len(), "Segment acquired");

            let (part, dropped) = assemble(&s11, &s21, &freq, self.policy)?;
            result.append(part);
            for error in dropped {
                warn!(pass, segment, error = %error, "Skipped malformed point");
                skipped.push(PassFault { pass, error });
            }
        }

        debug!(
            pass,
            points = result.len(),
            calibrated = self.is_calibrated(),
            "Sweep pass complete"
        );
        Ok((result, skipped))
    }

    /// Acquire passes back-to-back while `shared` says the run is active.
    ///
    /// Every changed result is published to the latest slot; a result equal
    /// to the previous one is not republished. Pass faults are recorded and
    /// the loop moves on; any other error ends the loop and is returned.
    /// In `SweepMode::Single` exactly one pass is attempted.
    pub fn run_loop(&mut self, shared: &RunShared) -> Result<()> {
        let mut previous: Option<SweepResult> = None;

        while shared.is_running() {
            let pass = self.passes;
            match self.run_once() {
                Ok((result, skipped)) => {
                    for fault in skipped {
                        shared.record_fault(fault.pass, fault.error);
                    }
                    if previous.as_ref() == Some(&result) {
                        trace!(pass, "Sweep unchanged, not republished");
                    } else {
                        shared.latest.publish(result.clone());
                        previous = Some(result);
                    }
                }
                Err(e) if e.is_pass_fault() => {
                    warn!(pass, error = %e, "Sweep pass failed");
                    shared.record_fault(pass, e);
                }
                Err(e) => {
                    error!(pass, error = %e, "Sweep loop aborted");
                    return Err(e);
                }
            }

            if self.config.mode == SweepMode::Single {
                break;
            }
        }
        Ok(())
    }
}
