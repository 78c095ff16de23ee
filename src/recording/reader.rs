//! Replays a recording as a sequence of sweeps.

use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{debug, info, warn};

use super::{COLUMNS, ROWS_PER_SWEEP};
use crate::error::{Result, VnaError};
use crate::measurement::SweepResult;

/// Reader over a recording file.
///
/// Every five data rows form one sweep, in column order
/// `reflRe, reflIm, thruRe, thruIm, freq`. A trailing incomplete group is
/// dropped. With `looping` the file is reopened at its end; a pass that
/// yields nothing ends the sequence so an empty file cannot spin.
pub struct RecordedSource {
    path: PathBuf,
    looping: bool,
    reader: csv::Reader<File>,
    yielded_this_pass: u64,
    yielded: u64,
    passes: u64,
    done: bool,
}

impl std::fmt::Debug for RecordedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordedSource")
            .field("path", &self.path)
            .field("looping", &self.looping)
            .field("yielded", &self.yielded)
            .field("done", &self.done)
            .finish()
    }
}

impl RecordedSource {
    /// Open `path` and check its header.
    ///
    /// Fails with `SourceUnavailable` when the file cannot be opened and
    /// `MalformedRecording` when the header is not the five recording columns.
    pub fn open(path: impl AsRef<Path>, looping: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = open_reader(&path)?;
        info!(path = %path.display(), looping, "Opened recording");
        Ok(Self {
            path,
            looping,
            reader,
            yielded_this_pass: 0,
            yielded: 0,
            passes: 0,
            done: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Sweeps yielded so far, across all passes.
    pub fn yielded(&self) -> u64 {
        self.yielded
    }

    /// Read every sweep of a recording once.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<SweepResult>> {
        Self::open(path, false)?.collect()
    }

    /// Read the next complete group, or `None` at the end of the file.
    fn read_group(&mut self) -> Result<Option<SweepResult>> {
        let mut rows: Vec<Vec<f64>> = Vec::with_capacity(ROWS_PER_SWEEP - 1);
        let mut freq: Vec<u64> = Vec::new();
        let mut first_line = 0;
        let mut record = StringRecord::new();

        for row in 0..ROWS_PER_SWEEP {
            let more = self
                .reader
                .read_record(&mut record)
                .map_err(|e| csv_error(&self.path, e))?;
            if !more {
                if row > 0 {
                    debug!(
                        path = %self.path.display(),
                        rows = row,
                        "Discarding incomplete trailing sweep"
                    );
                }
                return Ok(None);
            }
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            if row == 0 {
                first_line = line;
            }
            let malformed = |reason| VnaError::MalformedRecording {
                path: self.path.clone(),
                line,
                reason,
            };
            // The last row of a group holds the frequencies
            if row + 1 == ROWS_PER_SWEEP {
                freq = parse_row(&record, parse_frequency).map_err(malformed)?;
            } else {
                rows.push(parse_row(&record, |t| t.parse::<f64>().ok()).map_err(malformed)?);
            }
        }

        let mut rows = rows.into_iter();
        let mut next = || rows.next().unwrap_or_default();
        let result = SweepResult {
            refl_re: next(),
            refl_im: next(),
            thru_re: next(),
            thru_im: next(),
            freq,
        };

        if !result.is_consistent() {
            return Err(VnaError::MalformedRecording {
                path: self.path.clone(),
                line: first_line,
                reason: "rows of one sweep differ in length or frequency order".to_string(),
            });
        }
        Ok(Some(result))
    }

    fn rewind(&mut self) -> Result<()> {
        self.reader = open_reader(&self.path)?;
        self.passes += 1;
        self.yielded_this_pass = 0;
        debug!(path = %self.path.display(), pass = self.passes, "Looping recording");
        Ok(())
    }
}

impl Iterator for RecordedSource {
    type Item = Result<SweepResult>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.read_group() {
                Ok(Some(result)) => {
                    self.yielded_this_pass += 1;
                    self.yielded += 1;
                    return Some(Ok(result));
                }
                Ok(None) if self.looping && self.yielded_this_pass > 0 => {
                    if let Err(e) = self.rewind() {
                        self.done = true;
                        return Some(Err(e));
                    }
                }
                Ok(None) => {
                    if self.looping {
                        warn!(path = %self.path.display(), "Recording holds no complete sweep");
                    }
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>> {
    let file = File::open(path).map_err(|e| VnaError::SourceUnavailable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(file);

    let headers = reader.headers().map_err(|e| csv_error(path, e))?;
    if !headers.iter().eq(COLUMNS) {
        return Err(VnaError::MalformedRecording {
            path: path.to_path_buf(),
            line: 1,
            reason: format!(
                "expected header '{}', found '{}'",
                COLUMNS.join(", "),
                headers.iter().collect::<Vec<_>>().join(", ")
            ),
        });
    }
    Ok(reader)
}

fn csv_error(path: &Path, e: csv::Error) -> VnaError {
    let line = e.position().map(|p| p.line()).unwrap_or_default();
    VnaError::MalformedRecording {
        path: path.to_path_buf(),
        line,
        reason: e.to_string(),
    }
}

/// Parse one row such as `[1.5, -2.0, 3e-3]` into its values.
fn parse_row<T>(
    record: &StringRecord,
    parse: impl Fn(&str) -> Option<T>,
) -> std::result::Result<Vec<T>, String> {
    let last = record.len().saturating_sub(1);
    let mut values = Vec::with_capacity(record.len());
    for (i, field) in record.iter().enumerate() {
        let mut token = field;
        if i == 0 {
            token = token.strip_prefix('[').unwrap_or(token);
        }
        if i == last {
            token = token.strip_suffix(']').unwrap_or(token);
        }
        let token = token.trim();
        if token.is_empty() && record.len() == 1 {
            continue;
        }
        let value = parse(token).ok_or_else(|| format!("'{}' is not a valid value", field))?;
        values.push(value);
    }
    Ok(values)
}

/// Whole non-negative Hz, written either as an integer or as an integral float.
fn parse_frequency(token: &str) -> Option<u64> {
    if let Ok(hz) = token.parse::<u64>() {
        return Some(hz);
    }
    let hz = token.parse::<f64>().ok()?;
    // 2^64: the first float above u64::MAX
    let in_range = hz.is_finite() && hz >= 0.0 && hz < 18_446_744_073_709_551_616.0;
    (in_range && hz.fract() == 0.0).then_some(hz as u64)
}
