//! Device-facing traits for the digital subsystem
//!
//! The streaming core only needs [`SampleSource::pull`]. Everything else the
//! test programs do to the instrument (rates, kernel buffers, channel setup,
//! cyclic output) goes through [`DigitalInterface`] and is applied once by
//! [`apply_config`] before a capture starts.

use crate::config::StreamConfig;
use crate::error::Result;
use log::debug;

/// Number of digital I/O lines on the instrument
pub const DIGITAL_CHANNELS: u32 = 16;

/// Direction of a digital I/O line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Anything that can hand out fixed-size chunks of digital samples
pub trait SampleSource {
    /// Pull the next `count` samples, blocking until they are available
    fn pull(&mut self, count: usize) -> Result<Vec<u16>>;
}

impl<S: SampleSource + ?Sized> SampleSource for &mut S {
    fn pull(&mut self, count: usize) -> Result<Vec<u16>> {
        (**self).pull(count)
    }
}

/// Configuration surface of the digital subsystem
pub trait DigitalInterface {
    /// Set the input sample rate, returns the rate actually applied
    fn set_sample_rate_in(&mut self, rate: f64) -> Result<f64>;

    /// Set the output sample rate, returns the rate actually applied
    fn set_sample_rate_out(&mut self, rate: f64) -> Result<f64>;

    fn set_kernel_buffers_count_in(&mut self, count: u32) -> Result<()>;

    fn set_direction(&mut self, channel: u32, direction: Direction) -> Result<()>;

    fn enable_channel(&mut self, channel: u32, enable: bool) -> Result<()>;

    fn set_cyclic(&mut self, cyclic: bool);

    /// Let the hardware trigger run the input continuously
    fn set_streaming_flag(&mut self, enable: bool);

    /// Load the output buffer and start generating it
    fn push(&mut self, samples: &[u16]) -> Result<()>;

    fn stop_buffer_out(&mut self) -> Result<()>;

    fn flush_buffer_in(&mut self) -> Result<()>;
}

/// Rates the device settled on after configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppliedRates {
    pub sample_rate_in: f64,
    pub sample_rate_out: f64,
}

/// Configure a device for a counter loopback capture
///
/// Order matches what the instrument expects: rates first, then input
/// buffering, then the output lines, and the output pattern last so that
/// generation starts with everything else settled.
pub fn apply_config<D>(device: &mut D, config: &StreamConfig) -> Result<AppliedRates>
where
    D: DigitalInterface + ?Sized,
{
    config.validate()?;

    // +1 makes the device round onto the intended clock divider
    let sample_rate_in = device.set_sample_rate_in(config.sample_rate_in as f64 + 1.0)?;
    let sample_rate_out = device.set_sample_rate_out(config.sample_rate_out as f64 + 1.0)?;
    device.set_kernel_buffers_count_in(config.kernel_buffers)?;
    device.set_streaming_flag(config.streaming_flag);

    for channel in 0..config.n_bits {
        device.set_direction(channel, Direction::Output)?;
        device.enable_channel(channel, true)?;
    }

    device.set_cyclic(config.cyclic);
    device.push(&config.counter_pattern())?;

    debug!(
        "Configured digital interface: in={:.1} Hz out={:.1} Hz kernel_buffers={} bits={}",
        sample_rate_in, sample_rate_out, config.kernel_buffers, config.n_bits
    );

    Ok(AppliedRates {
        sample_rate_in,
        sample_rate_out,
    })
}

/// Stop the output and drop whatever the input still holds
pub fn release<D>(device: &mut D) -> Result<()>
where
    D: DigitalInterface + ?Sized,
{
    device.flush_buffer_in()?;
    device.stop_buffer_out()
}
