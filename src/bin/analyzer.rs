//! Digital Stream Analyzer
//!
//! Offline stability check for captures written by `collector`.
//!
//! Usage:
//!   analyzer --input capture.h5
//!   analyzer --input capture.h5 --histogram --context 8
//!   analyzer --input capture.h5 --start 65000 --count 2000

use clap::Parser;
use m2k_digital_stream::{run_length_histogram, sample_window, CaptureReader, StabilityAnalyzer};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "analyzer")]
#[command(about = "Analyze a digital counter capture from HDF5 file", long_about = None)]
struct Args {
    /// Input HDF5 file path
    #[arg(short, long)]
    input: PathBuf,

    /// First sample to analyze (default: file start)
    #[arg(long, default_value = "0")]
    start: usize,

    /// Number of samples to analyze (default: to file end)
    #[arg(long)]
    count: Option<usize>,

    /// Override the expected run length (default: from recorded rates)
    #[arg(long)]
    run_length: Option<usize>,

    /// Print the run-length histogram
    #[arg(long)]
    histogram: bool,

    /// Print this many samples around the first violation
    #[arg(long)]
    context: Option<usize>,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let reader = CaptureReader::open(&args.input)?;
    let metadata = reader.metadata();

    println!("Loading data from {}...", args.input.display());
    let total_samples = reader.total_samples();
    if total_samples == 0 {
        eprintln!("Error: No samples in file");
        return Ok(());
    }

    let count = args.count.unwrap_or(total_samples);
    let samples = reader.read_range(args.start, count)?;
    if samples.is_empty() {
        eprintln!("Error: No samples in specified range");
        return Ok(());
    }

    let run_length = args.run_length.unwrap_or_else(|| metadata.expected_run_length());
    let analyzer = match StabilityAnalyzer::new(run_length) {
        Ok(analyzer) => analyzer,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let mut output: Box<dyn Write> = if let Some(path) = &args.output {
        Box::new(File::create(path)?)
    } else {
        Box::new(io::stdout())
    };

    writeln!(output, "{}", "=".repeat(80))?;
    writeln!(output, "DIGITAL STREAM ANALYSIS REPORT")?;
    writeln!(output, "{}", "=".repeat(80))?;
    writeln!(output)?;
    writeln!(output, "File Information:")?;
    writeln!(output, "  Start time: {}", metadata.start_time)?;
    writeln!(output, "  Sample rate in: {} Hz", metadata.sample_rate_in)?;
    writeln!(output, "  Sample rate out: {} Hz", metadata.sample_rate_out)?;
    writeln!(output, "  Kernel buffers: {}", metadata.kernel_buffers)?;
    writeln!(output, "  Buffer size: {} samples", metadata.chunk_size)?;
    writeln!(output, "  Counter width: {} bits", metadata.n_bits)?;
    writeln!(output, "  Format version: {}", metadata.version)?;
    writeln!(output)?;
    writeln!(output, "Analysis Range:")?;
    writeln!(output, "  Start: {}", args.start)?;
    writeln!(output, "  Samples: {}", samples.len())?;
    writeln!(output, "  Expected run length: {}", run_length)?;

    // Buffer numbers refer to the whole capture, not the analyzed window
    let local = analyzer.analyze(&samples);
    let report = local.clone().offset_by(args.start);

    writeln!(output, "\n{}", "=".repeat(80))?;
    writeln!(output, "STABILITY")?;
    writeln!(output, "{}", "=".repeat(80))?;
    writeln!(output, "{}", report.summary(metadata.chunk_size))?;

    if let (Some(radius), Some(index)) = (args.context, local.first_violation_index) {
        writeln!(output)?;
        writeln!(output, "Samples around violation (absolute index {}):", args.start + index)?;
        for line in sample_window(&samples, index, radius) {
            writeln!(output, "{}", line)?;
        }
    }

    if args.histogram {
        writeln!(output, "\n{}", "=".repeat(80))?;
        writeln!(output, "RUN LENGTHS")?;
        writeln!(output, "{}", "=".repeat(80))?;
        let histogram = run_length_histogram(&samples);
        if histogram.is_empty() {
            writeln!(output, "  No complete runs")?;
        }
        for (length, occurrences) in &histogram {
            let marker = if *length == run_length { " (expected)" } else { "" };
            writeln!(output, "  {:>8} samples: {:>10}{}", length, occurrences, marker)?;
        }
    }

    writeln!(output, "\n{}", "=".repeat(80))?;
    writeln!(output, "Analysis complete!")?;

    Ok(())
}
