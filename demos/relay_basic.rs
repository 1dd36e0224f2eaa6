//! Example: Double-buffered capture from a custom sample source
//!
//! Shows the relay on its own, with a source that just counts upward and
//! prints each chunk as the consumer receives it.
//!
//! Run with: cargo run --example relay_basic

use m2k_digital_stream::{DoubleBufferRelay, Result, SampleSource, StabilityAnalyzer};

/// Emits every counter value `repeat` times
struct SlowCounter {
    value: u16,
    emitted: usize,
    repeat: usize,
}

impl SampleSource for SlowCounter {
    fn pull(&mut self, count: usize) -> Result<Vec<u16>> {
        let mut chunk = Vec::with_capacity(count);
        for _ in 0..count {
            chunk.push(self.value);
            self.emitted += 1;
            if self.emitted == self.repeat {
                self.emitted = 0;
                self.value = self.value.wrapping_add(1);
            }
        }
        Ok(chunk)
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("Double Buffer Relay Example");
    println!("===========================\n");

    let mut source = SlowCounter {
        value: 0,
        emitted: 0,
        repeat: 4,
    };

    let relay = DoubleBufferRelay::new(4, 16)?;
    let samples = relay.run_with(&mut source, |cycle, chunk| {
        println!("Buffer {}: {:?}", cycle, chunk);
    })?;

    println!("\nCaptured {} samples", samples.len());

    let report = StabilityAnalyzer::new(4)?.analyze(&samples);
    println!("{}", report);

    Ok(())
}
