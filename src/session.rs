//! Capture sessions: configure, stream, analyze, release
//!
//! A session drives one device through the whole counter loopback test. The
//! sweep repeats it for a descending list of clock dividers, which is how the
//! highest sample rate that still streams without drops is found.

use crate::common::TimeKeeper;
use crate::config::StreamConfig;
use crate::device::{apply_config, release, AppliedRates, DigitalInterface, SampleSource};
use crate::error::Result;
use crate::relay::DoubleBufferRelay;
use crate::stability::{StabilityAnalyzer, StabilityReport};
use log::{info, warn};
use std::fmt;

/// Control flow for streaming operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamControl {
    /// Continue streaming
    Continue,
    /// Stop streaming
    Break,
}

/// Everything one capture produced
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub samples: Vec<u16>,
    pub report: StabilityReport,
    pub rates: AppliedRates,
    pub elapsed_secs: f64,
}

impl CaptureOutcome {
    /// Achieved capture throughput
    pub fn samples_per_sec(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.samples.len() as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}

/// Run one capture on `device` and check it for dropped samples
///
/// An invalid `config` is rejected before the device is touched. Once
/// configuration starts, the device is released (input flushed, output
/// stopped) whether or not the capture succeeds.
pub fn run_capture<D>(device: &mut D, config: &StreamConfig) -> Result<CaptureOutcome>
where
    D: DigitalInterface + SampleSource + Send,
{
    config.validate()?;
    let analyzer = StabilityAnalyzer::new(config.expected_run_length())?;
    let relay = DoubleBufferRelay::new(config.chunk_count, config.chunk_size)?;

    let rates = match apply_config(device, config) {
        Ok(rates) => rates,
        Err(e) => {
            if let Err(release_err) = release(device) {
                warn!("Release after failed configuration also failed: {}", release_err);
            }
            return Err(e);
        }
    };

    info!(
        "Capturing {} x {} samples at {:.0} Hz in / {:.0} Hz out",
        config.chunk_count, config.chunk_size, rates.sample_rate_in, rates.sample_rate_out
    );

    let timer = TimeKeeper::new();
    let captured = relay.run(device);
    let elapsed_secs = timer.elapsed_secs();

    let released = release(device);
    let samples = captured?;
    released?;

    let report = analyzer.analyze(&samples);
    if !report.stable {
        warn!("Capture unstable: {}", report.summary(config.chunk_size));
    }

    Ok(CaptureOutcome {
        samples,
        report,
        rates,
        elapsed_secs,
    })
}

/// Result of one divider in a sweep
#[derive(Debug, Clone)]
pub struct SweepStep {
    pub divider: u32,
    pub sample_rate_in: u32,
    pub sample_rate_out: u32,
    pub chunk_size: usize,
    pub report: StabilityReport,
}

impl fmt::Display for SweepStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SR_DIVIDER: {:2} SR_IN: {:9} SR_OUT: {:9}, {}",
            self.divider,
            self.sample_rate_in,
            self.sample_rate_out,
            self.report.summary(self.chunk_size)
        )
    }
}

/// Capture once per divider, handing each step to `on_step`
///
/// Stops early when `on_step` returns [`StreamControl::Break`]; the steps
/// completed so far are returned. A failing capture aborts the sweep.
pub fn run_sweep<D, I, F>(
    device: &mut D,
    base: &StreamConfig,
    dividers: I,
    mut on_step: F,
) -> Result<Vec<SweepStep>>
where
    D: DigitalInterface + SampleSource + Send,
    I: IntoIterator<Item = u32>,
    F: FnMut(&SweepStep) -> StreamControl,
{
    let mut steps = Vec::new();

    for divider in dividers {
        let config = base.with_divider(divider);
        let outcome = run_capture(device, &config)?;

        let step = SweepStep {
            divider,
            sample_rate_in: config.sample_rate_in,
            sample_rate_out: config.sample_rate_out,
            chunk_size: config.chunk_size,
            report: outcome.report,
        };

        let control = on_step(&step);
        steps.push(step);
        if control == StreamControl::Break {
            break;
        }
    }

    Ok(steps)
}
