//! Writes sweeps in the recording format.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use csv::{QuoteStyle, WriterBuilder};
use tracing::{debug, info};

use super::COLUMNS;
use crate::error::{Result, VnaError};
use crate::measurement::SweepResult;

/// `recording_<YYYYmmdd_HHMMSS_micros>.csv` inside `directory`.
pub fn default_recording_path(directory: &Path) -> PathBuf {
    timestamped_path(directory, "recording", "csv")
}

/// `<prefix>_<YYYYmmdd_HHMMSS_micros>.<extension>` inside `directory`.
///
/// Never returns a path that already exists: a numeric suffix is added
/// when the timestamped name is taken.
pub(crate) fn timestamped_path(directory: &Path, prefix: &str, extension: &str) -> PathBuf {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S_%6f");
    let mut path = directory.join(format!("{prefix}_{timestamp}.{extension}"));
    let mut suffix = 1;
    while path.exists() {
        path = directory.join(format!("{prefix}_{timestamp}_{suffix}.{extension}"));
        suffix += 1;
    }
    path
}

/// CSV logger for streamed sweeps.
///
/// Each sweep becomes five rows, one per column, written as a bracketed
/// list: `[0.91, 0.87, 0.84]`. Frequencies are written as integers.
pub struct RecordingWriter<W: Write> {
    writer: csv::Writer<W>,
    sweeps: u64,
}

impl RecordingWriter<File> {
    /// Create (or truncate) a recording file, creating parent directories.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        info!(path = %path.display(), "Recording sweeps");
        Self::new(file)
    }
}

impl<W: Write> RecordingWriter<W> {
    /// Wrap `inner` and write the header row.
    pub fn new(inner: W) -> Result<Self> {
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .quote_style(QuoteStyle::Never)
            .from_writer(inner);
        writer
            .write_record(spaced(COLUMNS.iter().map(|c| c.to_string())))
            .map_err(io::Error::from)?;
        Ok(Self { writer, sweeps: 0 })
    }

    /// Append one sweep.
    pub fn write_sweep(&mut self, sweep: &SweepResult) -> Result<()> {
        for row in [&sweep.refl_re, &sweep.refl_im, &sweep.thru_re, &sweep.thru_im] {
            self.write_row(row.iter().map(|v| v.to_string()))?;
        }
        self.write_row(sweep.freq.iter().map(|f| f.to_string()))?;
        self.sweeps += 1;
        debug!(sweep = self.sweeps, points = sweep.len(), "Recorded sweep");
        Ok(())
    }

    fn write_row(&mut self, values: impl Iterator<Item = String>) -> Result<()> {
        let mut fields: Vec<String> = spaced(values).collect();
        match fields.as_mut_slice() {
            [] => fields.push("[]".to_string()),
            [only] => *only = format!("[{}]", only),
            [first, .., last] => {
                first.insert(0, '[');
                last.push(']');
            }
        }
        self.writer
            .write_record(&fields)
            .map_err(io::Error::from)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn sweeps_written(&self) -> u64 {
        self.sweeps
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| VnaError::Io(io::Error::new(e.error().kind(), e.error().to_string())))
    }
}

/// Prefix every field after the first with a space, giving `a, b, c` rows.
fn spaced(values: impl Iterator<Item = String>) -> impl Iterator<Item = String> {
    values
        .enumerate()
        .map(|(i, v)| if i == 0 { v } else { format!(" {}", v) })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep() -> SweepResult {
        SweepResult {
            refl_re: vec![0.5, -0.25],
            refl_im: vec![0.125, 1.0],
            thru_re: vec![0.0, 0.75],
            thru_im: vec![-1.5, 2.0],
            freq: vec![1_000_000, 2_000_000],
        }
    }

    #[test]
    fn writes_header_and_bracketed_rows() {
        let mut writer = RecordingWriter::new(Vec::new()).unwrap();
        writer.write_sweep(&sweep()).unwrap();
        assert_eq!(writer.sweeps_written(), 1);
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "reflRe, reflIm, thruRe, thruIm, freq");
        assert_eq!(lines[1], "[0.5, -0.25]");
        assert_eq!(lines[5], "[1000000, 2000000]");
        assert_eq!(lines.len(), 6);
    }

    #[test]
    fn single_and_empty_rows() {
        let mut writer = RecordingWriter::new(Vec::new()).unwrap();
        let one = SweepResult {
            refl_re: vec![1.0],
            refl_im: vec![2.0],
            thru_re: vec![3.0],
            thru_im: vec![4.0],
            freq: vec![5],
        };
        writer.write_sweep(&one).unwrap();
        writer.write_sweep(&SweepResult::default()).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[1], "[1]");
        assert_eq!(lines[5], "[5]");
        assert_eq!(lines[6], "[]");
    }

    #[test]
    fn default_path_is_timestamped() {
        let path = default_recording_path(Path::new("out"));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("recording_"));
        assert!(name.ends_with(".csv"));
        assert_eq!(name.len(), "recording_20240101_120000_123456.csv".len());
    }

    #[test]
    fn timestamped_path_skips_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut seen = Vec::new();
        for _ in 0..3 {
            let path = timestamped_path(dir.path(), "sample", "txt");
            assert!(!path.exists());
            fs::write(&path, "x").unwrap();
            seen.push(path);
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 3);
    }
}
