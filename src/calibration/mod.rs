//! Calibration procedure.
//!
//! A [`CalibrationGuide`] is a step machine:
//!
//! ```text
//! NotStarted ──start()──> StepPending ──step()*──> Done
//! ```
//!
//! [`drive_guide`] runs it to completion on the calling thread, trusting the
//! guide's own "no more steps" answer and stopping only when an optional
//! step budget is exceeded. [`run_calibration`] adds the save/load handling:
//! loading skips the steps entirely, a completed run is always saved.

pub mod artifact;
pub mod guide;

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, VnaError};
use crate::recording::writer::timestamped_path;

pub use artifact::{Calibration, Standard, StandardMeasurement};
pub use guide::{AutoConfirm, ConsolePrompt, GuideState, StandardPrompt, StandardsGuide};

/// Step-machine contract of a calibration procedure.
pub trait CalibrationGuide {
    /// Begin the procedure. Returns whether a step is required.
    fn start(&mut self) -> Result<bool>;

    /// Perform one step. Returns whether another step is required.
    fn step(&mut self) -> Result<bool>;

    fn save(&mut self, path: &Path) -> Result<()>;

    fn load(&mut self, path: &Path) -> Result<()>;
}

/// Summary of a driven guide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuideRun {
    /// `step()` calls made, including the final one that answered false
    pub steps: usize,
}

/// Call `start()`, then `step()` until the guide reports it is finished.
///
/// With a `step_budget`, a guide still asking for steps after that many
/// `step()` calls fails with `StepBudgetExceeded`.
pub fn drive_guide<G>(guide: &mut G, step_budget: Option<usize>) -> Result<GuideRun>
where
    G: CalibrationGuide + ?Sized,
{
    let mut more = guide.start()?;
    let mut steps = 0;

    while more {
        if let Some(budget) = step_budget {
            if steps >= budget {
                return Err(VnaError::StepBudgetExceeded { budget });
            }
        }
        more = guide.step()?;
        steps += 1;
        debug!(step = steps, more, "Calibration step done");
    }

    info!(steps, "Calibration guide finished");
    Ok(GuideRun { steps })
}

/// What a calibrate call should do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalibrationRequest {
    /// Save the completed calibration here instead of the default name
    pub save: Option<PathBuf>,
    /// Load this calibration instead of running the guide
    pub load: Option<PathBuf>,
    /// Directory for the default file name
    pub directory: PathBuf,
    pub step_budget: Option<usize>,
}

/// How a calibrate call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalibrationOutcome {
    Loaded { path: PathBuf },
    Completed { steps: usize, saved_to: PathBuf },
}

/// `calibration_<YYYYmmdd_HHMMSS_micros>.json` inside `directory`.
///
/// An existing file is never reused, so back-to-back calibrations keep
/// separate artifacts.
pub fn default_calibration_path(directory: &Path) -> PathBuf {
    timestamped_path(directory, "calibration", "json")
}

/// Load a calibration, or run the guide and save the result.
pub fn run_calibration<G>(guide: &mut G, request: &CalibrationRequest) -> Result<CalibrationOutcome>
where
    G: CalibrationGuide + ?Sized,
{
    if let Some(path) = &request.load {
        guide.load(path)?;
        return Ok(CalibrationOutcome::Loaded { path: path.clone() });
    }

    let run = drive_guide(guide, request.step_budget)?;
    let path = request
        .save
        .clone()
        .unwrap_or_else(|| default_calibration_path(&request.directory));
    guide.save(&path)?;
    Ok(CalibrationOutcome::Completed {
        steps: run.steps,
        saved_to: path,
    })
}
