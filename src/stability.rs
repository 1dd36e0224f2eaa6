//! Run-length stability check for captured counter streams
//!
//! When the outputs play a binary counter at `rate_out` and the inputs sample it
//! at `rate_in`, every counter value occupies exactly `rate_in / rate_out`
//! consecutive input samples. A run of any other length means samples were
//! lost (or duplicated) somewhere between the kernel buffers and the capture.

use crate::error::{Result, StreamError};
use log::warn;
use std::collections::BTreeMap;
use std::fmt;

/// Details of the first run that did not have the expected length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunViolation {
    /// Index of the sample that closed the bad run
    pub index: usize,
    /// Value of the bad run
    pub previous_value: u16,
    /// Value that followed it
    pub next_value: u16,
    /// Length the bad run actually had
    pub run_length: usize,
}

impl RunViolation {
    /// Which pull of `chunk_size` samples the violation landed in
    pub fn chunk_index(&self, chunk_size: usize) -> usize {
        if chunk_size == 0 {
            return 0;
        }
        self.index / chunk_size
    }
}

/// Outcome of a stability check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StabilityReport {
    pub stable: bool,
    pub first_violation_index: Option<usize>,
    /// Estimated number of lost samples (0 when stable)
    pub dropped_count: u64,
    /// No transition at all was seen, so nothing could be checked
    pub degenerate: bool,
    pub expected_run_length: usize,
    pub violation: Option<RunViolation>,
}

impl StabilityReport {
    fn stable(expected_run_length: usize, degenerate: bool) -> Self {
        Self {
            stable: true,
            first_violation_index: None,
            dropped_count: 0,
            degenerate,
            expected_run_length,
            violation: None,
        }
    }

    /// Same report with sample indices moved by `start`
    ///
    /// For analyses of a window that begins `start` samples into a capture,
    /// so indices and chunk numbers refer to the whole capture.
    pub fn offset_by(mut self, start: usize) -> Self {
        if let Some(index) = self.first_violation_index.as_mut() {
            *index += start;
        }
        if let Some(violation) = self.violation.as_mut() {
            violation.index += start;
        }
        self
    }

    /// One-line summary including the chunk the violation fell into
    pub fn summary(&self, chunk_size: usize) -> String {
        match &self.violation {
            Some(violation) => format!(
                "{} @ buffer {:3} prev val: {:016b} next val: {:016b}",
                self,
                violation.chunk_index(chunk_size),
                violation.previous_value,
                violation.next_value
            ),
            None => self.to_string(),
        }
    }
}

impl fmt::Display for StabilityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.stable { "  STABLE" } else { "UNSTABLE" };
        write!(f, "{} dropped: {:6} samples", verdict, self.dropped_count)?;
        if let Some(index) = self.first_violation_index {
            write!(f, " at sample {}", index)?;
        }
        if self.degenerate {
            write!(f, " (no transitions observed)")?;
        }
        Ok(())
    }
}

enum Scan {
    SeekingFirstTransition,
    Counting { value: u16, run: usize },
}

/// Checks captured samples against an expected run length
#[derive(Debug, Clone, Copy)]
pub struct StabilityAnalyzer {
    expected_run_length: usize,
}

impl StabilityAnalyzer {
    pub fn new(expected_run_length: usize) -> Result<Self> {
        if expected_run_length == 0 {
            return Err(StreamError::InvalidParameter(
                "Expected run length must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            expected_run_length,
        })
    }

    /// Derive the run length from the input/output sample rates
    pub fn from_rates(sample_rate_in: u32, sample_rate_out: u32) -> Result<Self> {
        if sample_rate_out == 0 {
            return Err(StreamError::InvalidParameter(
                "Output sample rate must be non-zero".to_string(),
            ));
        }
        Self::new((sample_rate_in / sample_rate_out) as usize)
    }

    pub fn expected_run_length(&self) -> usize {
        self.expected_run_length
    }

    /// Scan `samples` and report the first run with the wrong length
    ///
    /// The run before the first transition and the run still open at the end
    /// of the capture are both partial and never judged.
    pub fn analyze(&self, samples: &[u16]) -> StabilityReport {
        let expected = self.expected_run_length;
        let mut state = Scan::SeekingFirstTransition;

        for i in 1..samples.len() {
            state = match state {
                Scan::SeekingFirstTransition => {
                    if samples[i] == samples[i - 1] {
                        Scan::SeekingFirstTransition
                    } else {
                        Scan::Counting {
                            value: samples[i],
                            run: 1,
                        }
                    }
                }
                Scan::Counting { value, run } if samples[i] == value => Scan::Counting {
                    value,
                    run: run + 1,
                },
                Scan::Counting { value, run } if run == expected => Scan::Counting {
                    value: samples[i],
                    run: 1,
                },
                Scan::Counting { value, run } => {
                    let next = samples[i];
                    let dropped = value.abs_diff(next) as u64 * expected as u64 + run as u64
                        - expected as u64;
                    return StabilityReport {
                        stable: false,
                        first_violation_index: Some(i),
                        dropped_count: dropped,
                        degenerate: false,
                        expected_run_length: expected,
                        violation: Some(RunViolation {
                            index: i,
                            previous_value: value,
                            next_value: next,
                            run_length: run,
                        }),
                    };
                }
            };
        }

        let degenerate = matches!(state, Scan::SeekingFirstTransition);
        if degenerate {
            warn!(
                "No transition in {} samples, stream stability could not be checked",
                samples.len()
            );
        }
        StabilityReport::stable(expected, degenerate)
    }
}

/// Iterate over the runs of equal adjacent samples as `(value, length)`
pub fn runs(samples: &[u16]) -> impl Iterator<Item = (u16, usize)> + '_ {
    samples
        .chunk_by(|a, b| a == b)
        .map(|run| (run[0], run.len()))
}

/// How often each run length occurs, excluding the partial first and last runs
pub fn run_length_histogram(samples: &[u16]) -> BTreeMap<usize, usize> {
    let lengths: Vec<usize> = runs(samples).map(|(_, len)| len).collect();
    let mut histogram = BTreeMap::new();
    if lengths.len() > 2 {
        for &len in &lengths[1..lengths.len() - 1] {
            *histogram.entry(len).or_insert(0) += 1;
        }
    }
    histogram
}
