//! Integration tests for sessions, shutdown and calibration.

use std::path::Path;
use std::time::Duration;

use vna_driver::MockVna;
use vna_headless::acquisition::StreamSource;
use vna_headless::calibration::{
    drive_guide, AutoConfirm, Calibration, CalibrationGuide, CalibrationOutcome, Standard,
};
use vna_headless::config::Settings;
use vna_headless::error::{Result, VnaError};
use vna_headless::recording::RecordingWriter;
use vna_headless::session::{LiveSession, PlaybackSession, Session};
use vna_headless::sweep::SweepConfig;

fn config() -> SweepConfig {
    SweepConfig::new(2_900_000_000, 3_100_000_000, 1, 21)
}

fn live(vna: MockVna) -> LiveSession {
    LiveSession::new(Box::new(vna.with_sweep_delay(Duration::ZERO)), config())
        .expect("mock session opens")
}

/// Guide scripted to answer `start()` once and `step()` a fixed number of times.
struct ScriptedGuide {
    step_answers: Vec<bool>,
    starts: usize,
    steps: usize,
}

impl CalibrationGuide for ScriptedGuide {
    fn start(&mut self) -> Result<bool> {
        self.starts += 1;
        Ok(true)
    }

    fn step(&mut self) -> Result<bool> {
        let answer = self.step_answers.get(self.steps).copied().unwrap_or(false);
        self.steps += 1;
        Ok(answer)
    }

    fn save(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn load(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

#[test]
fn test_guide_loop_call_counts() {
    let mut guide = ScriptedGuide {
        step_answers: vec![true, true, true, false],
        starts: 0,
        steps: 0,
    };
    drive_guide(&mut guide, None).unwrap();
    assert_eq!(guide.starts, 1);
    assert_eq!(guide.steps, 4);
}

#[test]
fn test_multiple_shutdown_calls() {
    let vna = MockVna::new();
    let probe = vna.probe();
    let mut session = live(vna);
    assert!(probe.is_connected());

    session.shutdown().unwrap();
    assert!(!probe.is_connected());

    // Second shutdown should be a no-op
    session.shutdown().unwrap();
    assert_eq!(probe.disconnects(), 1);
}

#[test]
fn test_shutdown_stops_active_stream_first() {
    let vna = MockVna::new();
    let probe = vna.probe();
    let mut session = live(vna);
    {
        let stream = session.open_stream(StreamSource::Live).unwrap();
        assert_eq!(stream.take(2).count(), 2);
    }
    session.shutdown().unwrap();
    assert!(!session.orchestrator().has_worker());
    assert!(!probe.is_connected());
}

#[test]
fn test_drop_disconnects() {
    let vna = MockVna::new();
    let probe = vna.probe();
    {
        let mut session = live(vna);
        session.run_single().unwrap();
    }
    assert!(!probe.is_connected());
    assert_eq!(probe.disconnects(), 1);
}

#[test]
fn test_stuck_instrument_fails_loudly() {
    let mut session = live(MockVna::new().stuck_connected());
    let err = session.shutdown().unwrap_err();
    assert!(matches!(err, VnaError::DisconnectFailure { .. }));
    assert!(!err.is_recoverable());
}

#[test]
fn test_playback_rejects_live_operations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rec.csv");
    RecordingWriter::create(&path).unwrap().flush().unwrap();

    let mut session = PlaybackSession::new(&path, false).unwrap();
    assert_eq!(session.kind(), "playback");
    assert!(matches!(
        session.configure_sweep(config()),
        Err(VnaError::UnsupportedInSession {
            operation: "configure_sweep",
            session: "playback"
        })
    ));
    assert!(matches!(
        session.calibrate(None, None),
        Err(VnaError::UnsupportedInSession { .. })
    ));
    assert!(matches!(
        session.open_stream(StreamSource::Live),
        Err(VnaError::UnsupportedInSession { .. })
    ));
    // A header-only recording has no sweep to return
    assert!(matches!(
        session.run_single(),
        Err(VnaError::MalformedRecording { .. })
    ));
    session.shutdown().unwrap();
    session.shutdown().unwrap();
}

#[test]
fn test_calibrate_then_reload() {
    let dir = tempfile::tempdir().unwrap();
    let saved = dir.path().join("cal.json");

    let mut session = live(MockVna::new()).with_prompt(AutoConfirm::new());
    let outcome = session.calibrate(Some(saved.as_path()), None).unwrap();
    assert_eq!(
        outcome,
        CalibrationOutcome::Completed {
            steps: 4,
            saved_to: saved.clone()
        }
    );
    let measured = session.calibration().cloned().unwrap();
    for standard in Standard::SEQUENCE {
        assert_eq!(measured.measurement(standard).map(|r| r.len()), Some(21));
    }
    session.shutdown().unwrap();

    let mut other = live(MockVna::new());
    let outcome = other.calibrate(None, Some(saved.as_path())).unwrap();
    assert_eq!(outcome, CalibrationOutcome::Loaded { path: saved.clone() });
    assert_eq!(other.calibration(), Some(&measured));
    assert_eq!(Calibration::load(&saved).unwrap(), measured);
    other.shutdown().unwrap();
}

#[test]
fn test_calibration_load_failure_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = live(MockVna::new());
    let missing = dir.path().join("missing.json");
    let err = session.calibrate(None, Some(missing.as_path())).unwrap_err();
    assert!(matches!(err, VnaError::CalibrationLoadError { .. }));
    assert!(session.calibration().is_none());
    session.shutdown().unwrap();
}

#[test]
fn test_session_from_settings_uses_simulator() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::from_toml_str(&format!(
        r#"
        [device]
        simulate = true

        [sweep]
        start_hz = 1000000
        stop_hz = 2000000
        segments = 2
        points = 11

        [calibration]
        directory = "{}"
        step_budget = 8
        "#,
        dir.path().display()
    ))
    .unwrap();

    let mut session = LiveSession::from_settings(&settings).unwrap();
    assert_eq!(session.run_single().unwrap().len(), 22);

    let outcome = session.calibrate(None, None).unwrap();
    let CalibrationOutcome::Completed { saved_to, .. } = outcome else {
        panic!("expected a fresh calibration");
    };
    assert!(saved_to.starts_with(dir.path()));
    session.shutdown().unwrap();
}

#[test]
fn test_back_to_back_calibrations_keep_both_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = live(MockVna::new()).with_calibration_dir(dir.path());

    let mut saved = Vec::new();
    for _ in 0..2 {
        match session.calibrate(None, None).unwrap() {
            CalibrationOutcome::Completed { saved_to, .. } => saved.push(saved_to),
            other => panic!("expected a fresh calibration, got {other:?}"),
        }
    }
    assert_ne!(saved[0], saved[1]);
    assert!(saved.iter().all(|p| p.is_file()));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    session.shutdown().unwrap();
}
