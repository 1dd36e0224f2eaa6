//! Simulated digital interface for running captures without hardware
//!
//! The simulator loops the pushed output pattern back onto the inputs the same
//! way a counter loopback on the real instrument does: the output plays one
//! pattern value per output clock, the input samples it at the input clock, and
//! both clocks are integer dividers of the 100 MHz base clock.

use crate::config::{MAX_KERNEL_BUFFERS, MAX_SAMPLE_RATE};
use crate::device::{DigitalInterface, Direction, SampleSource, DIGITAL_CHANNELS};
use crate::error::{Result, StreamError};
use log::{debug, warn};
use std::thread;
use std::time::Duration;

/// Samples the input DMA loses while restarting after an overrun
const OVERRUN_RESTART_SAMPLES: u64 = 1;

/// In-process stand-in for the digital subsystem of the instrument
#[derive(Debug, Clone)]
pub struct SimulatedDigital {
    divider_in: u64,
    divider_out: u64,
    kernel_buffers: u32,
    directions: [Direction; DIGITAL_CHANNELS as usize],
    enabled: [bool; DIGITAL_CHANNELS as usize],
    cyclic: bool,
    streaming: bool,
    pattern: Vec<u16>,
    generating: bool,
    position: u64,
    pulls: usize,
    skipped: u64,
    sustained_rate: Option<f64>,
    realtime: bool,
    fail_on_pull: Option<usize>,
    short_on_pull: Option<usize>,
}

impl Default for SimulatedDigital {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedDigital {
    /// Fresh device state: full-rate clocks, 4 kernel buffers, all lines inputs
    pub fn new() -> Self {
        Self {
            divider_in: 1,
            divider_out: 1,
            kernel_buffers: 4,
            directions: [Direction::Input; DIGITAL_CHANNELS as usize],
            enabled: [false; DIGITAL_CHANNELS as usize],
            cyclic: false,
            streaming: false,
            pattern: Vec::new(),
            generating: false,
            position: 0,
            pulls: 0,
            skipped: 0,
            sustained_rate: None,
            realtime: false,
            fail_on_pull: None,
            short_on_pull: None,
        }
    }

    /// Limit how fast the host drains the input; faster captures overrun
    pub fn with_sustained_rate(mut self, samples_per_sec: f64) -> Self {
        self.sustained_rate = Some(samples_per_sec);
        self
    }

    /// Block in `pull` for as long as the hardware would need to fill the chunk
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Make the given 1-based pull fail like a dropped USB connection
    pub fn fail_on_pull(mut self, pull: usize) -> Self {
        self.fail_on_pull = Some(pull);
        self
    }

    /// Make the given 1-based pull return half the requested samples
    pub fn short_chunk_on_pull(mut self, pull: usize) -> Self {
        self.short_on_pull = Some(pull);
        self
    }

    pub fn sample_rate_in(&self) -> f64 {
        MAX_SAMPLE_RATE as f64 / self.divider_in as f64
    }

    pub fn sample_rate_out(&self) -> f64 {
        MAX_SAMPLE_RATE as f64 / self.divider_out as f64
    }

    pub fn kernel_buffers(&self) -> u32 {
        self.kernel_buffers
    }

    /// Pulls since the last push or flush
    pub fn pulls(&self) -> usize {
        self.pulls
    }

    /// Samples lost to overruns since creation
    pub fn skipped_samples(&self) -> u64 {
        self.skipped
    }

    /// Clock divider the hardware would pick for a requested rate
    ///
    /// Rates at or above the base clock settle on divider 1.
    fn quantize(rate: f64) -> Result<u64> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(StreamError::InvalidParameter(format!(
                "Sample rate must be a positive number of Hz, got {}",
                rate
            )));
        }
        Ok(((MAX_SAMPLE_RATE as f64 / rate).ceil() as u64).max(1))
    }

    fn check_channel(channel: u32) -> Result<usize> {
        if channel >= DIGITAL_CHANNELS {
            return Err(StreamError::InvalidChannel(channel));
        }
        Ok(channel as usize)
    }

    /// Lines currently driven by the output pattern
    fn output_mask(&self) -> u16 {
        (0..DIGITAL_CHANNELS as usize)
            .filter(|&ch| self.enabled[ch] && self.directions[ch] == Direction::Output)
            .fold(0u16, |mask, ch| mask | (1 << ch))
    }

    fn sample_at(&self, position: u64, mask: u16) -> u16 {
        let len = self.pattern.len() as u64;
        let out_index = position * self.divider_in / self.divider_out;
        let index = if self.cyclic {
            out_index % len
        } else {
            out_index.min(len - 1)
        };
        self.pattern[index as usize] & mask
    }

    /// Samples lost before this pull if the host cannot keep up
    fn overrun_gap(&self, count: usize) -> u64 {
        let limit = match self.sustained_rate {
            Some(limit) if limit > 0.0 => limit,
            _ => return 0,
        };
        let rate = self.sample_rate_in();
        // Kernel buffers absorb the first pulls
        if rate <= limit || self.pulls <= self.kernel_buffers as usize {
            return 0;
        }
        (count as f64 * (rate - limit) / limit).ceil() as u64 + OVERRUN_RESTART_SAMPLES
    }
}

impl SampleSource for SimulatedDigital {
    fn pull(&mut self, count: usize) -> Result<Vec<u16>> {
        if count == 0 {
            return Err(StreamError::InvalidParameter(
                "Cannot pull zero samples".to_string(),
            ));
        }

        self.pulls += 1;
        if self.fail_on_pull == Some(self.pulls) {
            return Err(StreamError::Device(
                "No device found or device disconnected".to_string(),
            ));
        }

        if !self.generating || self.pattern.is_empty() {
            return Err(StreamError::Device("No output buffer pushed".to_string()));
        }

        let mask = self.output_mask();
        if mask == 0 {
            return Err(StreamError::Device("No channel enabled".to_string()));
        }

        // Buffers are moved in 8-byte beats
        let rounded = count.div_ceil(4) * 4;

        let gap = self.overrun_gap(rounded);
        if gap > 0 {
            warn!("Input overrun on pull {}: {} samples lost", self.pulls, gap);
            self.position += gap;
            self.skipped += gap;
        }

        let start = self.position;
        let mut samples: Vec<u16> = (start..start + rounded as u64)
            .map(|p| self.sample_at(p, mask))
            .collect();
        self.position += rounded as u64;

        if self.short_on_pull == Some(self.pulls) {
            samples.truncate(rounded / 2);
        }

        if self.realtime {
            thread::sleep(Duration::from_secs_f64(rounded as f64 / self.sample_rate_in()));
        }

        debug!("Simulated pull {}: {} samples from {}", self.pulls, samples.len(), start);
        Ok(samples)
    }
}

impl DigitalInterface for SimulatedDigital {
    fn set_sample_rate_in(&mut self, rate: f64) -> Result<f64> {
        self.divider_in = Self::quantize(rate)?;
        Ok(self.sample_rate_in())
    }

    fn set_sample_rate_out(&mut self, rate: f64) -> Result<f64> {
        self.divider_out = Self::quantize(rate)?;
        Ok(self.sample_rate_out())
    }

    fn set_kernel_buffers_count_in(&mut self, count: u32) -> Result<()> {
        if count == 0 || count > MAX_KERNEL_BUFFERS {
            return Err(StreamError::InvalidParameter(format!(
                "Kernel buffer count must be 1-{}, got {}",
                MAX_KERNEL_BUFFERS, count
            )));
        }
        self.kernel_buffers = count;
        Ok(())
    }

    fn set_direction(&mut self, channel: u32, direction: Direction) -> Result<()> {
        let ch = Self::check_channel(channel)?;
        self.directions[ch] = direction;
        Ok(())
    }

    fn enable_channel(&mut self, channel: u32, enable: bool) -> Result<()> {
        let ch = Self::check_channel(channel)?;
        self.enabled[ch] = enable;
        Ok(())
    }

    fn set_cyclic(&mut self, cyclic: bool) {
        self.cyclic = cyclic;
    }

    fn set_streaming_flag(&mut self, enable: bool) {
        self.streaming = enable;
    }

    fn push(&mut self, samples: &[u16]) -> Result<()> {
        if samples.is_empty() {
            return Err(StreamError::InvalidParameter(
                "Output buffer is empty".to_string(),
            ));
        }
        self.pattern = samples.to_vec();
        self.generating = true;
        self.position = 0;
        self.pulls = 0;
        debug!(
            "Generating {} pattern values (cyclic={}, streaming={})",
            self.pattern.len(),
            self.cyclic,
            self.streaming
        );
        Ok(())
    }

    fn stop_buffer_out(&mut self) -> Result<()> {
        self.generating = false;
        Ok(())
    }

    fn flush_buffer_in(&mut self) -> Result<()> {
        self.position = 0;
        self.pulls = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stability::runs;

    fn loopback(rate_in: f64, rate_out: f64, bits: u32) -> SimulatedDigital {
        let mut device = SimulatedDigital::new();
        device.set_sample_rate_in(rate_in).unwrap();
        device.set_sample_rate_out(rate_out).unwrap();
        for ch in 0..bits {
            device.set_direction(ch, Direction::Output).unwrap();
            device.enable_channel(ch, true).unwrap();
        }
        device.set_cyclic(true);
        let pattern: Vec<u16> = (0..(1u32 << bits)).map(|v| v as u16).collect();
        device.push(&pattern).unwrap();
        device
    }

    #[test]
    fn test_rates_quantize_to_base_clock_dividers() {
        let mut device = SimulatedDigital::new();
        let actual = device.set_sample_rate_in(3_333_334.0).unwrap();
        assert!((actual - 100_000_000.0 / 30.0).abs() < 1e-6);

        let actual = device.set_sample_rate_out(833_334.0).unwrap();
        assert!((actual - 100_000_000.0 / 120.0).abs() < 1e-6);

        assert!(device.set_sample_rate_in(0.0).is_err());
        assert!(device.set_sample_rate_in(f64::NAN).is_err());
    }

    #[test]
    fn test_rates_above_base_clock_clamp_to_divider_one() {
        let mut device = SimulatedDigital::new();
        for requested in [100_000_001.0, 200_000_000.0] {
            let actual = device.set_sample_rate_in(requested).unwrap();
            assert_eq!(actual, MAX_SAMPLE_RATE as f64);
        }
    }

    #[test]
    fn test_each_value_repeats_divider_ratio() {
        let mut device = loopback(4_000_001.0, 1_000_001.0, 6);
        let samples = device.pull(1024).unwrap();

        assert_eq!(&samples[..8], &[0, 0, 0, 0, 1, 1, 1, 1]);
        assert!(runs(&samples).all(|(_, len)| len == 4));
    }

    #[test]
    fn test_consecutive_pulls_are_continuous() {
        let mut device = loopback(4_000_001.0, 1_000_001.0, 4);
        let first = device.pull(6 * 4).unwrap();
        let second = device.pull(4).unwrap();
        assert_eq!(first.last(), Some(&5));
        assert_eq!(second, vec![6, 6, 6, 6]);
    }

    #[test]
    fn test_counter_wraps_when_cyclic() {
        let mut device = loopback(1_000_001.0, 1_000_001.0, 2);
        assert_eq!(device.pull(8).unwrap(), vec![0, 1, 2, 3, 0, 1, 2, 3]);
    }

    #[test]
    fn test_non_cyclic_holds_last_value() {
        let mut device = loopback(1_000_001.0, 1_000_001.0, 2);
        device.set_cyclic(false);
        assert_eq!(device.pull(8).unwrap(), vec![0, 1, 2, 3, 3, 3, 3, 3]);
    }

    #[test]
    fn test_pull_rounds_up_to_multiple_of_four() {
        let mut device = loopback(1_000_001.0, 1_000_001.0, 4);
        assert_eq!(device.pull(5).unwrap().len(), 8);
    }

    #[test]
    fn test_disabled_lines_read_low() {
        let mut device = loopback(1_000_001.0, 1_000_001.0, 4);
        device.enable_channel(0, false).unwrap();
        assert_eq!(device.pull(4).unwrap(), vec![0, 0, 2, 2]);
    }

    #[test]
    fn test_pull_requires_output() {
        let mut device = SimulatedDigital::new();
        assert!(matches!(device.pull(4), Err(StreamError::Device(_))));

        let mut device = loopback(1_000_001.0, 1_000_001.0, 4);
        device.stop_buffer_out().unwrap();
        assert!(matches!(device.pull(4), Err(StreamError::Device(_))));
    }

    #[test]
    fn test_invalid_channel_and_buffers() {
        let mut device = SimulatedDigital::new();
        assert!(matches!(
            device.enable_channel(16, true),
            Err(StreamError::InvalidChannel(16))
        ));
        assert!(device.set_kernel_buffers_count_in(0).is_err());
        assert!(device.set_kernel_buffers_count_in(8).is_ok());
        assert_eq!(device.kernel_buffers(), 8);
    }

    #[test]
    fn test_fault_injection() {
        let mut device = loopback(1_000_001.0, 1_000_001.0, 4)
            .fail_on_pull(2)
            .short_chunk_on_pull(3);
        assert_eq!(device.pull(8).unwrap().len(), 8);
        assert!(matches!(device.pull(8), Err(StreamError::Device(_))));
        assert_eq!(device.pull(8).unwrap().len(), 4);
    }

    #[test]
    fn test_overrun_after_kernel_buffers_fill() {
        let mut device = loopback(4_000_001.0, 1_000_001.0, 8).with_sustained_rate(2_000_000.0);
        device.set_kernel_buffers_count_in(2).unwrap();

        let mut samples = Vec::new();
        for _ in 0..2 {
            samples.extend(device.pull(64).unwrap());
        }
        assert_eq!(device.skipped_samples(), 0);
        assert!(runs(&samples).all(|(_, len)| len == 4));

        device.pull(64).unwrap();
        // Input at 4 MHz against a 2 MHz drain loses a chunk per chunk, plus the restart
        assert_eq!(device.skipped_samples(), 65);
    }

    #[test]
    fn test_flush_restarts_input() {
        let mut device = loopback(1_000_001.0, 1_000_001.0, 4);
        device.pull(8).unwrap();
        device.flush_buffer_in().unwrap();
        assert_eq!(device.pulls(), 0);
        assert_eq!(device.pull(4).unwrap(), vec![0, 1, 2, 3]);
    }
}
