//! Integration tests for recording and replay.

use std::fs;
use std::time::Duration;

use vna_driver::MockVna;
use vna_headless::acquisition::{StreamPoll, StreamSource};
use vna_headless::error::VnaError;
use vna_headless::measurement::SweepResult;
use vna_headless::recording::{RecordedSource, RecordingWriter};
use vna_headless::session::{LiveSession, PlaybackSession, Session};
use vna_headless::sweep::SweepConfig;

/// Synthetic sweep with values that are exact in binary and decimal.
fn synthetic(k: usize, points: usize) -> SweepResult {
    let base = k as f64;
    SweepResult {
        refl_re: (0..points).map(|i| base + i as f64 * 0.25).collect(),
        refl_im: (0..points).map(|i| -(i as f64) * 0.5).collect(),
        thru_re: (0..points).map(|i| 1.0 / (i as f64 + 2.0)).collect(),
        thru_im: (0..points).map(|i| base * 1e-3 - i as f64).collect(),
        freq: (0..points).map(|i| 1_000_000 + i as u64 * 5_000).collect(),
    }
}

#[test]
fn test_k_sweeps_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sweeps.csv");

    let sweeps: Vec<SweepResult> = (0..7).map(|k| synthetic(k, 11)).collect();
    let mut writer = RecordingWriter::create(&path).unwrap();
    for sweep in &sweeps {
        writer.write_sweep(sweep).unwrap();
    }
    writer.flush().unwrap();
    assert_eq!(writer.sweeps_written(), 7);
    drop(writer);

    let read = RecordedSource::read_all(&path).unwrap();
    assert_eq!(read.len(), sweeps.len());
    assert_eq!(read, sweeps);
}

#[test]
fn test_recorded_file_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("layout.csv");
    let mut writer = RecordingWriter::create(&path).unwrap();
    writer.write_sweep(&synthetic(0, 3)).unwrap();
    writer.write_sweep(&synthetic(1, 3)).unwrap();
    writer.flush().unwrap();
    drop(writer);

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 1 + 2 * 5);
    assert_eq!(lines[0], "reflRe, reflIm, thruRe, thruIm, freq");
    assert_eq!(lines[5], "[1000000, 1005000, 1010000]");
    assert!(lines[1..].iter().all(|l| l.starts_with('[') && l.ends_with(']')));
}

#[test]
fn test_looping_single_sweep_repeats() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("one.csv");
    let sweep = synthetic(3, 5);
    let mut writer = RecordingWriter::create(&path).unwrap();
    writer.write_sweep(&sweep).unwrap();
    writer.flush().unwrap();
    drop(writer);

    let mut session = PlaybackSession::new(&path, true).unwrap();
    let stream = session.stream().unwrap();
    let replayed: Vec<SweepResult> = stream.take(25).collect();
    assert_eq!(replayed.len(), 25);
    assert!(replayed.iter().all(|s| *s == sweep));
}

#[test]
fn test_non_looping_stream_ends() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("two.csv");
    let mut writer = RecordingWriter::create(&path).unwrap();
    writer.write_sweep(&synthetic(0, 4)).unwrap();
    writer.write_sweep(&synthetic(1, 4)).unwrap();
    writer.flush().unwrap();
    drop(writer);

    let mut session = PlaybackSession::new(&path, false).unwrap();
    let mut stream = session
        .open_stream(StreamSource::recorded(&path, false))
        .unwrap();
    assert!(matches!(stream.next_within(Duration::ZERO), StreamPoll::Item(_)));
    assert!(matches!(stream.next_within(Duration::ZERO), StreamPoll::Item(_)));
    assert_eq!(stream.next_within(Duration::ZERO), StreamPoll::Ended);
    assert_eq!(stream.next_within(Duration::ZERO), StreamPoll::Ended);
    assert!(stream.close().is_ok());
}

#[test]
fn test_parse_failure_terminates_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.csv");
    fs::write(
        &path,
        "reflRe, reflIm, thruRe, thruIm, freq\n[1]\n[2]\n[3]\n[4]\n[5]\n[oops]\n[2]\n[3]\n[4]\n[5]\n",
    )
    .unwrap();

    let mut session = PlaybackSession::new(&path, true).unwrap();
    let mut stream = session.stream().unwrap();
    assert_eq!(stream.by_ref().count(), 1);
    assert!(matches!(
        stream.fault(),
        Some(VnaError::MalformedRecording { .. })
    ));
    assert!(stream.close().is_err());
}

#[test]
fn test_missing_recording_is_source_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.csv");
    assert!(matches!(
        PlaybackSession::new(&missing, false),
        Err(VnaError::SourceUnavailable { .. })
    ));

    let mut session = LiveSession::new(
        Box::new(MockVna::new()),
        SweepConfig::new(1_000_000, 2_000_000, 1, 5),
    )
    .unwrap();
    assert!(matches!(
        session.open_stream(StreamSource::recorded(&missing, false)),
        Err(VnaError::SourceUnavailable { .. })
    ));
    assert!(!session.orchestrator().has_worker());
    session.shutdown().unwrap();
}

#[test]
fn test_live_stream_recorded_and_replayed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("live.csv");

    let mut session = LiveSession::new(
        Box::new(MockVna::new().with_noise(1e-3, Some(7))),
        SweepConfig::new(2_900_000_000, 3_100_000_000, 2, 15),
    )
    .unwrap();
    let mut writer = RecordingWriter::create(&path).unwrap();
    let captured: Vec<SweepResult> = session
        .open_stream(StreamSource::Live)
        .unwrap()
        .take(4)
        .collect();
    for sweep in &captured {
        writer.write_sweep(sweep).unwrap();
    }
    writer.flush().unwrap();
    drop(writer);
    session.shutdown().unwrap();

    let replayed = RecordedSource::read_all(&path).unwrap();
    assert_eq!(replayed, captured);
}
