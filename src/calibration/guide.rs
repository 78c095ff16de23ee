//! Standards guide: measures SHORT, OPEN, LOAD and THROUGH in turn.

use std::io::{self, BufRead, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use super::artifact::{Calibration, Standard};
use super::CalibrationGuide;
use crate::error::{Result, VnaError};
use crate::sweep::SweepProducer;

/// Asks the operator to connect a standard and waits for confirmation.
pub trait StandardPrompt: Send {
    fn request(&mut self, standard: Standard) -> Result<()>;
}

/// Prompts on stdout and waits for `done` on stdin.
#[derive(Debug, Default)]
pub struct ConsolePrompt;

impl ConsolePrompt {
    /// Keep asking until `input` yields a line reading `done`.
    fn confirm(
        standard: Standard,
        input: &mut impl BufRead,
        output: &mut impl Write,
    ) -> Result<()> {
        loop {
            write!(output, "Connect {}: ", standard)?;
            output.flush()?;

            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                return Err(VnaError::CalibrationIncomplete(format!(
                    "input closed while waiting for {}",
                    standard
                )));
            }
            if line.trim().eq_ignore_ascii_case("done") {
                return Ok(());
            }
            writeln!(output, "Invalid input. Please enter 'done' to continue.")?;
        }
    }
}

impl StandardPrompt for ConsolePrompt {
    fn request(&mut self, standard: Standard) -> Result<()> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        Self::confirm(standard, &mut stdin.lock(), &mut stdout.lock())
    }
}

/// Confirms every standard immediately (unattended runs and tests).
#[derive(Debug, Default)]
pub struct AutoConfirm {
    requested: Vec<Standard>,
}

impl AutoConfirm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standards requested so far.
    pub fn requested(&self) -> &[Standard] {
        &self.requested
    }
}

impl StandardPrompt for AutoConfirm {
    fn request(&mut self, standard: Standard) -> Result<()> {
        debug!(%standard, "Auto-confirming standard");
        self.requested.push(standard);
        Ok(())
    }
}

/// Position of a [`StandardsGuide`] in its step sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuideState {
    NotStarted,
    /// Waiting to measure this standard on the next `step()`
    StepPending(Standard),
    Done,
}

/// Calibration guide that sweeps once per standard through the producer.
pub struct StandardsGuide<'a> {
    producer: &'a mut SweepProducer,
    prompt: &'a mut dyn StandardPrompt,
    calibration: Option<Calibration>,
    state: GuideState,
}

impl<'a> StandardsGuide<'a> {
    pub fn new(producer: &'a mut SweepProducer, prompt: &'a mut dyn StandardPrompt) -> Self {
        Self {
            producer,
            prompt,
            calibration: None,
            state: GuideState::NotStarted,
        }
    }

    pub fn state(&self) -> GuideState {
        self.state
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.as_ref()
    }

    /// The completed or loaded calibration.
    pub fn into_calibration(self) -> Option<Calibration> {
        self.calibration.filter(|c| c.is_complete())
    }

    fn completed(&self) -> Result<&Calibration> {
        match (&self.calibration, self.state) {
            (Some(cal), GuideState::Done) => Ok(cal),
            _ => Err(VnaError::CalibrationIncomplete(format!(
                "guide is in state {:?}",
                self.state
            ))),
        }
    }
}

impl CalibrationGuide for StandardsGuide<'_> {
    fn start(&mut self) -> Result<bool> {
        let config = *self.producer.config();
        let device = self.producer.device().name().to_string();
        info!(
            %device,
            start = config.start,
            stop = config.stop,
            points = config.total_points(),
            "Starting calibration"
        );
        self.calibration = Some(Calibration::new(config, device));

        let first = Standard::SEQUENCE[0];
        self.prompt.request(first)?;
        self.state = GuideState::StepPending(first);
        Ok(true)
    }

    fn step(&mut self) -> Result<bool> {
        let standard = match self.state {
            GuideState::StepPending(standard) => standard,
            GuideState::Done => return Ok(false),
            GuideState::NotStarted => {
                return Err(VnaError::CalibrationIncomplete(
                    "step() called before start()".to_string(),
                ))
            }
        };

        let (result, skipped) = self.producer.run_once()?;
        if let Some(fault) = skipped.into_iter().next() {
            warn!(%standard, error = %fault.error, "Standard measured with dropped points");
            return Err(fault.error);
        }
        info!(%standard, points = result.len(), "Measured standard");
        if let Some(cal) = self.calibration.as_mut() {
            cal.record(standard, result);
        }

        match standard.next() {
            Some(next) => {
                self.prompt.request(next)?;
                self.state = GuideState::StepPending(next);
                Ok(true)
            }
            None => {
                self.state = GuideState::Done;
                Ok(false)
            }
        }
    }

    fn save(&mut self, path: &Path) -> Result<()> {
        self.completed()?.save(path)
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        self.calibration = Some(Calibration::load(path)?);
        self.state = GuideState::Done;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn console_prompt_waits_for_done() {
        let mut input = Cursor::new("yes\n  DONE \n");
        let mut output = Vec::new();
        ConsolePrompt::confirm(Standard::Open, &mut input, &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.matches("Connect OPEN: ").count(), 2);
        assert!(text.contains("Please enter 'done'"));
    }

    #[test]
    fn console_prompt_fails_on_eof() {
        let mut input = Cursor::new("");
        let mut output = Vec::new();
        assert!(matches!(
            ConsolePrompt::confirm(Standard::Short, &mut input, &mut output),
            Err(VnaError::CalibrationIncomplete(_))
        ));
    }
}
