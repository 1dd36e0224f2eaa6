//! Digital stream test - Counter loopback capture and stability check
//!
//! Plays a binary counter on the digital outputs, streams it back through the
//! inputs and reports whether every counter value arrived exactly
//! `SAMPLE_RATE_IN / SAMPLE_RATE_OUT` times. With `--sweep` the test is
//! repeated for a descending range of clock dividers.
//!
//! Usage:
//!   digital-stream --divider 10
//!   digital-stream --sweep --sustained-rate 20000000

use clap::Parser;
use m2k_digital_stream::{
    run_capture, run_sweep, sample_window, DividerSweep, SimulatedDigital, StreamConfig,
    StreamControl, StreamError,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "digital-stream")]
#[command(about = "Check continuous digital capture for dropped samples", long_about = None)]
struct Args {
    /// Samples per pull (multiple of 4)
    #[arg(long, default_value = "65536")]
    chunk_size: usize,

    /// Pulls per capture
    #[arg(long, default_value = "100")]
    chunks: usize,

    /// Input kernel buffers
    #[arg(short, long, default_value = "8")]
    kernel_buffers: u32,

    /// Counter width in bits (1-16)
    #[arg(short, long, default_value = "16")]
    bits: u32,

    /// Clock divider for a single capture (input = 100 MHz / divider)
    #[arg(short, long, default_value = "30")]
    divider: u32,

    /// Sweep dividers from --sweep-start down to 2
    #[arg(long)]
    sweep: bool,

    #[arg(long, default_value = "30")]
    sweep_start: u32,

    #[arg(long, default_value = "1")]
    sweep_step: u32,

    /// Stop the sweep at the first unstable divider
    #[arg(long)]
    stop_on_unstable: bool,

    /// Host drain rate of the simulated device in samples/s (unlimited if omitted)
    #[arg(long)]
    sustained_rate: Option<f64>,

    /// Make the simulated device block for the real acquisition time
    #[arg(long)]
    realtime: bool,

    /// Print this many samples around a violation
    #[arg(long)]
    context: Option<usize>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let base = StreamConfig {
        n_bits: args.bits,
        chunk_size: args.chunk_size,
        chunk_count: args.chunks,
        kernel_buffers: args.kernel_buffers,
        ..StreamConfig::from_divider(args.divider)
    };

    if let Err(e) = base.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let mut device = SimulatedDigital::new().with_realtime(args.realtime);
    if let Some(rate) = args.sustained_rate {
        device = device.with_sustained_rate(rate);
    }

    println!("Digital stream speed test parameters");
    println!("Buffersize: {}", base.chunk_size);
    println!("Kernel Buffers: {}", base.kernel_buffers);
    println!("Total Buffers: {}", base.chunk_count);
    println!();

    if args.sweep {
        run_divider_sweep(&mut device, &base, &args)
    } else {
        run_single(&mut device, &base, args.context)
    }
}

fn run_single(
    device: &mut SimulatedDigital,
    config: &StreamConfig,
    context: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let outcome = match run_capture(device, config) {
        Ok(outcome) => outcome,
        Err(StreamError::Acquisition { cycle, source }) => {
            eprintln!("Error: acquisition failed at buffer {}: {}", cycle, source);
            eprintln!("The partial capture was discarded.");
            std::process::exit(1);
        }
        Err(e) => return Err(Box::new(e)),
    };

    println!(
        "SR_IN: {:.0} Hz SR_OUT: {:.0} Hz",
        outcome.rates.sample_rate_in, outcome.rates.sample_rate_out
    );
    println!("{}", outcome.report.summary(config.chunk_size));
    println!(
        "Captured {} samples in {:.2}s ({:.1} MS/s)",
        outcome.samples.len(),
        outcome.elapsed_secs,
        outcome.samples_per_sec() / 1e6
    );

    if let (Some(radius), Some(index)) = (context, outcome.report.first_violation_index) {
        println!();
        for line in sample_window(&outcome.samples, index, radius) {
            println!("{}", line);
        }
    }

    Ok(())
}

fn run_divider_sweep(
    device: &mut SimulatedDigital,
    base: &StreamConfig,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error>> {
    // A running capture always completes; Ctrl+C ends the sweep after it
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, stopping after the current divider...");
        r.store(false, Ordering::SeqCst);
    })?;

    let dividers = DividerSweep::new(args.sweep_start, args.sweep_step);
    let steps = run_sweep(device, base, dividers, |step| {
        println!("{}", step);

        if !running.load(Ordering::SeqCst) || (args.stop_on_unstable && !step.report.stable) {
            StreamControl::Break
        } else {
            StreamControl::Continue
        }
    })?;

    let fastest = steps
        .iter()
        .filter(|step| step.report.stable)
        .min_by_key(|step| step.divider);

    println!();
    match fastest {
        Some(step) => println!(
            "Fastest stable rate: {} Hz (divider {})",
            step.sample_rate_in, step.divider
        ),
        None => println!("No stable divider found"),
    }

    Ok(())
}
