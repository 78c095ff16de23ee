//! Sweep results and raw sample decoding.
//!
//! The instrument reports each point as a string holding two
//! whitespace-separated floats (`"0.912344013 -0.330171257"`). Decoding is
//! pure: the same raw input always yields the same `SweepResult`.

use serde::{Deserialize, Serialize};
use vna_driver::Channel;

use super::Datapoint;
use crate::error::{Result, VnaError};

/// How a pass treats points that fail to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplePolicy {
    /// Fail the whole pass on the first malformed point
    #[default]
    Abort,
    /// Drop the offending point from every column and keep the pass
    Skip,
}

/// One complete sweep: S11 and S21 as real/imaginary columns plus frequencies.
///
/// All five columns have the same length and `freq` is non-decreasing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    pub refl_re: Vec<f64>,
    pub refl_im: Vec<f64>,
    pub thru_re: Vec<f64>,
    pub thru_im: Vec<f64>,
    pub freq: Vec<u64>,
}

impl SweepResult {
    /// Number of points.
    pub fn len(&self) -> usize {
        self.freq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freq.is_empty()
    }

    /// Check the column-length and frequency-order invariants.
    pub fn is_consistent(&self) -> bool {
        let n = self.freq.len();
        self.refl_re.len() == n
            && self.refl_im.len() == n
            && self.thru_re.len() == n
            && self.thru_im.len() == n
            && self.freq.windows(2).all(|w| w[0] <= w[1])
    }

    /// Append another sweep (next segment) to this one.
    pub fn append(&mut self, mut other: SweepResult) {
        self.refl_re.append(&mut other.refl_re);
        self.refl_im.append(&mut other.refl_im);
        self.thru_re.append(&mut other.thru_re);
        self.thru_im.append(&mut other.thru_im);
        self.freq.append(&mut other.freq);
    }

    /// S11 as datapoints.
    pub fn s11(&self) -> Vec<Datapoint> {
        self.freq
            .iter()
            .zip(self.refl_re.iter().zip(&self.refl_im))
            .map(|(&f, (&re, &im))| Datapoint::new(f, re, im))
            .collect()
    }

    /// S21 as datapoints.
    pub fn s21(&self) -> Vec<Datapoint> {
        self.freq
            .iter()
            .zip(self.thru_re.iter().zip(&self.thru_im))
            .map(|(&f, (&re, &im))| Datapoint::new(f, re, im))
            .collect()
    }

    /// |S11| per point.
    pub fn s11_magnitude(&self) -> Vec<f64> {
        self.s11().iter().map(Datapoint::magnitude).collect()
    }

    /// |S21| per point.
    pub fn s21_magnitude(&self) -> Vec<f64> {
        self.s21().iter().map(Datapoint::magnitude).collect()
    }
}

/// Decode one raw `"re im"` string.
pub fn decode_sample(line: &str) -> Option<(f64, f64)> {
    let mut tokens = line.split_whitespace();
    let re = tokens.next()?.parse::<f64>().ok()?;
    let im = tokens.next()?.parse::<f64>().ok()?;
    if tokens.next().is_some() {
        return None;
    }
    Some((re, im))
}

/// Decode a whole channel, failing on the first malformed point.
pub fn decode_channel(channel: Channel, raw: &[String]) -> Result<(Vec<f64>, Vec<f64>)> {
    let mut re = Vec::with_capacity(raw.len());
    let mut im = Vec::with_capacity(raw.len());
    for (index, line) in raw.iter().enumerate() {
        let (r, i) = decode_sample(line).ok_or_else(|| VnaError::MalformedSample {
            channel,
            index,
            raw: line.clone(),
        })?;
        re.push(r);
        im.push(i);
    }
    Ok((re, im))
}

/// Build a `SweepResult` from the raw strings of one acquisition.
///
/// Returns the result together with the points skipped under
/// [`SamplePolicy::Skip`]; under `Abort` the skipped list is always empty.
pub fn assemble(
    s11: &[String],
    s21: &[String],
    freq: &[u64],
    policy: SamplePolicy,
) -> Result<(SweepResult, Vec<VnaError>)> {
    for (channel, raw) in [(Channel::S11, s11), (Channel::S21, s21)] {
        if raw.len() != freq.len() {
            return Err(VnaError::ShortRead {
                channel,
                expected: freq.len(),
                got: raw.len(),
            });
        }
    }

    match policy {
        SamplePolicy::Abort => {
            let (refl_re, refl_im) = decode_channel(Channel::S11, s11)?;
            let (thru_re, thru_im) = decode_channel(Channel::S21, s21)?;
            Ok((
                SweepResult {
                    refl_re,
                    refl_im,
                    thru_re,
                    thru_im,
                    freq: freq.to_vec(),
                },
                Vec::new(),
            ))
        }
        SamplePolicy::Skip => {
            let mut result = SweepResult::default();
            let mut skipped = Vec::new();
            for (index, &f) in freq.iter().enumerate() {
                let refl = decode_sample(&s11[index]);
                let thru = decode_sample(&s21[index]);
                match (refl, thru) {
                    (Some((rr, ri)), Some((tr, ti))) => {
                        result.refl_re.push(rr);
                        result.refl_im.push(ri);
                        result.thru_re.push(tr);
                        result.thru_im.push(ti);
                        result.freq.push(f);
                    }
                    (refl, _) => {
                        let (channel, raw) = if refl.is_none() {
                            (Channel::S11, &s11[index])
                        } else {
                            (Channel::S21, &s21[index])
                        };
                        skipped.push(VnaError::MalformedSample {
                            channel,
                            index,
                            raw: raw.clone(),
                        });
                    }
                }
            }
            Ok((result, skipped))
        }
    }
}
