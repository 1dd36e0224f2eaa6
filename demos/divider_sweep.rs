//! Example: Sample-rate sweep against a simulated host bottleneck
//!
//! The simulated device can only be drained at 30 MS/s, so captures above that
//! rate overrun once the kernel buffers are full.
//!
//! Run with: cargo run --example divider_sweep

use m2k_digital_stream::{run_sweep, DividerSweep, SimulatedDigital, StreamConfig, StreamControl};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Divider Sweep Example");
    println!("=====================\n");

    let mut device = SimulatedDigital::new().with_sustained_rate(30_000_000.0);
    let base = StreamConfig {
        chunk_size: 4096,
        chunk_count: 20,
        ..StreamConfig::default()
    };

    let steps = run_sweep(&mut device, &base, DividerSweep::new(12, 1), |step| {
        println!("{}", step);
        StreamControl::Continue
    })?;

    let unstable = steps.iter().filter(|step| !step.report.stable).count();
    println!("\n{} of {} dividers dropped samples", unstable, steps.len());
    println!("Samples lost to overruns: {}", device.skipped_samples());

    Ok(())
}
