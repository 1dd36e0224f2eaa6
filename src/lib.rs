//! Digital stream validation for USB mixed-signal instruments
//!
//! This library checks that continuous digital capture from an ADALM2000-class
//! instrument loses no samples. The outputs play a binary counter, the inputs
//! read it back through a double-buffered producer/consumer relay, and the
//! capture is scanned for runs that do not match the input/output rate ratio.
//!
//! # Quick Start
//!
//! ## One Capture
//! ```no_run
//! use m2k_digital_stream::{run_capture, SimulatedDigital, StreamConfig};
//!
//! let mut device = SimulatedDigital::new();
//! let config = StreamConfig::from_divider(10);
//!
//! let outcome = run_capture(&mut device, &config)?;
//! println!("{}", outcome.report.summary(config.chunk_size));
//! # Ok::<(), m2k_digital_stream::StreamError>(())
//! ```
//!
//! ## Finding the Fastest Stable Rate
//! ```no_run
//! use m2k_digital_stream::{run_sweep, DividerSweep, SimulatedDigital, StreamConfig, StreamControl};
//!
//! let mut device = SimulatedDigital::new().with_sustained_rate(20_000_000.0);
//!
//! run_sweep(&mut device, &StreamConfig::default(), DividerSweep::default(), |step| {
//!     println!("{}", step);
//!     if step.report.stable {
//!         StreamControl::Continue
//!     } else {
//!         StreamControl::Break  // Stop at the first rate that drops samples
//!     }
//! })?;
//! # Ok::<(), m2k_digital_stream::StreamError>(())
//! ```
//!
//! ## Checking an Existing Capture
//! ```
//! use m2k_digital_stream::StabilityAnalyzer;
//!
//! let analyzer = StabilityAnalyzer::new(3)?;
//! let report = analyzer.analyze(&[0, 0, 0, 1, 1, 2, 2, 2]);
//!
//! assert!(!report.stable);
//! assert_eq!(report.first_violation_index, Some(5));
//! # Ok::<(), m2k_digital_stream::StreamError>(())
//! ```

pub mod common;
pub mod config;
pub mod device;
pub mod error;
#[cfg(feature = "storage")]
pub mod hdf5_format;
pub mod relay;
pub mod session;
pub mod simulator;
pub mod stability;

// Re-export public API
pub use common::{sample_window, TimeKeeper};
pub use config::{DividerSweep, StreamConfig, MAX_SAMPLE_RATE};
pub use device::{apply_config, release, AppliedRates, DigitalInterface, Direction, SampleSource};
pub use error::{Result, StreamError};
#[cfg(feature = "storage")]
pub use hdf5_format::{CaptureMetadata, CaptureReader, CaptureWriter};
pub use relay::{Chunk, DoubleBufferRelay};
pub use session::{run_capture, run_sweep, CaptureOutcome, StreamControl, SweepStep};
pub use simulator::SimulatedDigital;
pub use stability::{run_length_histogram, runs, RunViolation, StabilityAnalyzer, StabilityReport};
