//! Digital Stream Collector
//!
//! Runs one counter loopback capture and writes the raw samples to an HDF5
//! file for later inspection with `analyzer`.
//!
//! Usage:
//!   collector --output capture.h5 --divider 10 --chunks 50

use clap::Parser;
use m2k_digital_stream::{
    run_capture, CaptureWriter, SimulatedDigital, StreamConfig, TimeKeeper,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "collector")]
#[command(about = "Capture a digital counter stream to HDF5 file", long_about = None)]
struct Args {
    /// Output HDF5 file path
    #[arg(short, long, default_value = "digital_capture.h5")]
    output: PathBuf,

    /// Clock divider (input = 100 MHz / divider)
    #[arg(short, long, default_value = "30")]
    divider: u32,

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

    /// Host drain rate of the simulated device in samples/s
    #[arg(long)]
    sustained_rate: Option<f64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = StreamConfig {
        n_bits: args.bits,
        chunk_size: args.chunk_size,
        chunk_count: args.chunks,
        kernel_buffers: args.kernel_buffers,
        ..StreamConfig::from_divider(args.divider)
    };

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    println!("Digital Stream Collector");
    println!("========================");
    println!("Input rate: {} Hz", config.sample_rate_in);
    println!("Output rate: {} Hz", config.sample_rate_out);
    println!("Buffers: {} x {} samples", config.chunk_count, config.chunk_size);
    println!("Output file: {}", args.output.display());
    println!();

    let mut device = SimulatedDigital::new();
    if let Some(rate) = args.sustained_rate {
        device = device.with_sustained_rate(rate);
    }

    println!("Creating HDF5 file...");
    let mut writer = CaptureWriter::create(&args.output, &config)?;

    println!("Capturing...");
    let outcome = run_capture(&mut device, &config)?;

    let timer = TimeKeeper::new();
    for chunk in outcome.samples.chunks(config.chunk_size) {
        writer.append(chunk)?;
    }
    writer.flush()?;

    println!("\nCollection complete!");
    println!("Total samples: {}", writer.sample_count());
    println!("Capture time: {:.2} seconds", outcome.elapsed_secs);
    println!("Write time: {:.2} seconds", timer.elapsed_secs());
    println!("Write rate: {:.0} samples/s", timer.rate(writer.sample_count()));
    println!("Result: {}", outcome.report.summary(config.chunk_size));
    println!("File: {}", args.output.display());

    Ok(())
}
