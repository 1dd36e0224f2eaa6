//! Capture parameters and the sample-rate divider sweep

use crate::device::DIGITAL_CHANNELS;
use crate::error::{Result, StreamError};

/// Base clock of the digital subsystem (Hz)
pub const MAX_SAMPLE_RATE: u32 = 100_000_000;

/// Output rate runs this many times slower than the input rate
pub const OUTPUT_RATE_RATIO: u32 = 4;

pub const DEFAULT_N_BITS: u32 = 16;
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 16;
pub const DEFAULT_CHUNK_COUNT: usize = 100;
pub const DEFAULT_KERNEL_BUFFERS: u32 = 8;
pub const DEFAULT_DIVIDER_START: u32 = 30;
pub const DEFAULT_DIVIDER_STEP: u32 = 1;

/// Upper bound the driver accepts for input kernel buffers
pub const MAX_KERNEL_BUFFERS: u32 = 64;

/// Parameters for one counter loopback capture
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Number of digital lines driving the counter (1-16)
    pub n_bits: u32,
    /// Samples per pull
    pub chunk_size: usize,
    /// Pulls per capture
    pub chunk_count: usize,
    /// Input kernel buffers
    pub kernel_buffers: u32,
    /// Input sample rate (Hz)
    pub sample_rate_in: u32,
    /// Output sample rate (Hz)
    pub sample_rate_out: u32,
    pub cyclic: bool,
    pub streaming_flag: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::from_divider(DEFAULT_DIVIDER_START)
    }
}

impl StreamConfig {
    /// Configuration for a given clock divider of the base rate
    ///
    /// Input runs at `MAX_SAMPLE_RATE / divider`, output four times slower, so
    /// every counter value should show up exactly four times in the capture.
    /// Dividers too large for an output clock leave `sample_rate_out` at zero,
    /// which [`validate`](Self::validate) rejects.
    pub fn from_divider(divider: u32) -> Self {
        let divider = divider.max(1);
        let sample_rate_out = divider
            .checked_mul(OUTPUT_RATE_RATIO)
            .map_or(0, |divider_out| MAX_SAMPLE_RATE / divider_out);
        Self {
            n_bits: DEFAULT_N_BITS,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_count: DEFAULT_CHUNK_COUNT,
            kernel_buffers: DEFAULT_KERNEL_BUFFERS,
            sample_rate_in: MAX_SAMPLE_RATE / divider,
            sample_rate_out,
            cyclic: true,
            streaming_flag: true,
        }
    }

    /// Same capture shape, different clock divider
    pub fn with_divider(&self, divider: u32) -> Self {
        let rates = Self::from_divider(divider);
        Self {
            sample_rate_in: rates.sample_rate_in,
            sample_rate_out: rates.sample_rate_out,
            ..self.clone()
        }
    }

    /// Check parameters before anything is sent to the device
    pub fn validate(&self) -> Result<()> {
        if self.n_bits == 0 || self.n_bits > DIGITAL_CHANNELS {
            return Err(StreamError::InvalidParameter(format!(
                "Counter width must be 1-{} bits, got {}",
                DIGITAL_CHANNELS, self.n_bits
            )));
        }

        if self.chunk_size == 0 || self.chunk_size % 4 != 0 {
            // The HDL moves samples in 8-byte beats
            return Err(StreamError::InvalidParameter(format!(
                "Chunk size must be a non-zero multiple of 4 samples, got {}",
                self.chunk_size
            )));
        }

        if self.chunk_count == 0 {
            return Err(StreamError::InvalidParameter(
                "Chunk count must be at least 1".to_string(),
            ));
        }

        if self.kernel_buffers == 0 || self.kernel_buffers > MAX_KERNEL_BUFFERS {
            return Err(StreamError::InvalidParameter(format!(
                "Kernel buffer count must be 1-{}, got {}",
                MAX_KERNEL_BUFFERS, self.kernel_buffers
            )));
        }

        for (name, rate) in [("input", self.sample_rate_in), ("output", self.sample_rate_out)] {
            if rate == 0 || rate > MAX_SAMPLE_RATE {
                return Err(StreamError::InvalidParameter(format!(
                    "{} sample rate must be 1-{} Hz, got {}",
                    name, MAX_SAMPLE_RATE, rate
                )));
            }
        }

        if self.sample_rate_in < self.sample_rate_out {
            return Err(StreamError::InvalidParameter(format!(
                "Input rate ({} Hz) must not be below output rate ({} Hz)",
                self.sample_rate_in, self.sample_rate_out
            )));
        }

        Ok(())
    }

    /// How many consecutive input samples each output value should occupy
    pub fn expected_run_length(&self) -> usize {
        if self.sample_rate_out == 0 {
            return 0;
        }
        (self.sample_rate_in / self.sample_rate_out) as usize
    }

    /// Total samples one capture yields
    pub fn total_samples(&self) -> usize {
        self.chunk_size.saturating_mul(self.chunk_count)
    }

    /// Binary counter `0..2^n_bits` pushed to the outputs
    pub fn counter_pattern(&self) -> Vec<u16> {
        let len = 1u32 << self.n_bits.min(DIGITAL_CHANNELS);
        (0..len).map(|value| value as u16).collect()
    }
}

/// Descending sequence of clock dividers, stopping before 1
///
/// ```
/// use m2k_digital_stream::DividerSweep;
///
/// let dividers: Vec<u32> = DividerSweep::new(5, 2).collect();
/// assert_eq!(dividers, vec![5, 3]);
/// ```
#[derive(Debug, Clone)]
pub struct DividerSweep {
    next: u32,
    step: u32,
}

impl DividerSweep {
    pub fn new(start: u32, step: u32) -> Self {
        Self {
            next: start,
            step: step.max(1),
        }
    }
}

impl Default for DividerSweep {
    fn default() -> Self {
        Self::new(DEFAULT_DIVIDER_START, DEFAULT_DIVIDER_STEP)
    }
}

impl Iterator for DividerSweep {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.next <= 1 {
            return None;
        }
        let current = self.next;
        self.next = self.next.saturating_sub(self.step);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_divider_30() {
        let config = StreamConfig::default();
        assert_eq!(config.sample_rate_in, 3_333_333);
        assert_eq!(config.sample_rate_out, 833_333);
        assert_eq!(config.expected_run_length(), 4);
        assert_eq!(config.total_samples(), 100 * 65536);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_divider_one_runs_at_full_rate() {
        let config = StreamConfig::from_divider(1);
        assert_eq!(config.sample_rate_in, MAX_SAMPLE_RATE);
        assert_eq!(config.sample_rate_out, 25_000_000);
        assert_eq!(config.expected_run_length(), 4);
    }

    #[test]
    fn test_from_divider_huge_is_rejected() {
        for divider in [1 << 30, u32::MAX] {
            let config = StreamConfig::from_divider(divider);
            assert_eq!(config.sample_rate_out, 0);
            assert!(matches!(config.validate(), Err(StreamError::InvalidParameter(_))));
        }

        let swept = StreamConfig::default().with_divider(1 << 30);
        assert!(swept.validate().is_err());
    }

    #[test]
    fn test_with_divider_keeps_shape() {
        let base = StreamConfig {
            chunk_size: 1024,
            chunk_count: 3,
            ..StreamConfig::default()
        };
        let config = base.with_divider(10);
        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.chunk_count, 3);
        assert_eq!(config.sample_rate_in, 10_000_000);
    }

    #[test]
    fn test_validate_rejects_bad_chunk_size() {
        let config = StreamConfig {
            chunk_size: 1001,
            ..StreamConfig::default()
        };
        assert!(matches!(config.validate(), Err(StreamError::InvalidParameter(_))));
    }

    #[test]
    fn test_validate_rejects_bad_bits_and_buffers() {
        let wide = StreamConfig {
            n_bits: 17,
            ..StreamConfig::default()
        };
        assert!(wide.validate().is_err());

        let no_buffers = StreamConfig {
            kernel_buffers: 0,
            ..StreamConfig::default()
        };
        assert!(no_buffers.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_slow_input() {
        let config = StreamConfig {
            sample_rate_in: 1000,
            sample_rate_out: 2000,
            ..StreamConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_counter_pattern() {
        let config = StreamConfig {
            n_bits: 3,
            ..StreamConfig::default()
        };
        assert_eq!(config.counter_pattern(), vec![0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(StreamConfig::default().counter_pattern().len(), 65536);
    }

    #[test]
    fn test_divider_sweep() {
        let dividers: Vec<u32> = DividerSweep::default().collect();
        assert_eq!(dividers.len(), 29);
        assert_eq!(dividers.first(), Some(&30));
        assert_eq!(dividers.last(), Some(&2));

        let stepped: Vec<u32> = DividerSweep::new(10, 4).collect();
        assert_eq!(stepped, vec![10, 6, 2]);
        assert_eq!(DividerSweep::new(1, 1).count(), 0);
    }
}
