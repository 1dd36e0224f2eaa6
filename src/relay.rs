//! Double-buffered producer/consumer relay for continuous sample capture
//!
//! A producer thread pulls chunks from the device while a consumer thread
//! appends them to the capture. The two meet at a single hand-off slot built
//! from a pair of channels: the chunk itself travels on the "full" channel and
//! the consumer hands back an acknowledgement on the "empty" channel once it
//! has copied the chunk out. The producer only pulls the next chunk after that
//! acknowledgement, so there is never more than one chunk in flight and chunk
//! `k` is always consumed before chunk `k + 1` exists.
//!
//! Throughput is traded for the guarantee that the device is never asked for
//! more than one buffer ahead of what has been processed.

use crate::device::SampleSource;
use crate::error::{Result, StreamError};
use log::{debug, info};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread;

/// One pull worth of samples, tagged with the cycle that produced it
#[derive(Debug)]
pub struct Chunk {
    /// 1-based pull index
    pub cycle: usize,
    pub samples: Vec<u16>,
}

/// Runs a fixed number of pull/copy cycles between two threads
#[derive(Debug, Clone, Copy)]
pub struct DoubleBufferRelay {
    chunk_count: usize,
    chunk_size: usize,
}

impl DoubleBufferRelay {
    /// Create a relay for `chunk_count` pulls of `chunk_size` samples
    ///
    /// # Returns
    /// * `Err(StreamError::InvalidParameter)` - if either value is zero or the
    ///   total capture size does not fit in memory addressing
    pub fn new(chunk_count: usize, chunk_size: usize) -> Result<Self> {
        if chunk_count == 0 || chunk_size == 0 {
            return Err(StreamError::InvalidParameter(format!(
                "Relay needs at least one chunk of at least one sample, got {} x {}",
                chunk_count, chunk_size
            )));
        }

        if chunk_count.checked_mul(chunk_size).is_none() {
            return Err(StreamError::InvalidParameter(format!(
                "Capture of {} x {} samples is too large",
                chunk_count, chunk_size
            )));
        }

        Ok(Self {
            chunk_count,
            chunk_size,
        })
    }

    /// Number of samples a successful run returns
    pub fn total_samples(&self) -> usize {
        self.chunk_count * self.chunk_size
    }

    /// Capture `chunk_count * chunk_size` samples from `source`
    ///
    /// # Returns
    /// * `Ok(Vec<u16>)` - every sample, in pull order
    /// * `Err(StreamError::Acquisition)` - a pull failed or came back short;
    ///   nothing captured so far is returned
    ///
    /// # Example
    /// ```
    /// use m2k_digital_stream::{DoubleBufferRelay, SampleSource, Result};
    ///
    /// struct Ramp(u16);
    ///
    /// impl SampleSource for Ramp {
    ///     fn pull(&mut self, count: usize) -> Result<Vec<u16>> {
    ///         let start = self.0;
    ///         self.0 += count as u16;
    ///         Ok((start..self.0).collect())
    ///     }
    /// }
    ///
    /// let relay = DoubleBufferRelay::new(3, 4)?;
    /// let samples = relay.run(&mut Ramp(0))?;
    /// assert_eq!(samples, (0..12).collect::<Vec<u16>>());
    /// # Ok::<(), m2k_digital_stream::StreamError>(())
    /// ```
    pub fn run<S>(&self, source: &mut S) -> Result<Vec<u16>>
    where
        S: SampleSource + Send + ?Sized,
    {
        self.run_with(source, |_, _| {})
    }

    /// Like [`run`](Self::run), calling `inspect(cycle, samples)` on the
    /// consumer thread for every chunk before its slot is released
    pub fn run_with<S, F>(&self, source: &mut S, inspect: F) -> Result<Vec<u16>>
    where
        S: SampleSource + Send + ?Sized,
        F: FnMut(usize, &[u16]) + Send,
    {
        info!(
            "Starting relay: {} chunks of {} samples",
            self.chunk_count, self.chunk_size
        );

        // Slot full: carries the chunk. Slot empty: consumer is done with it.
        let (full_tx, full_rx) = mpsc::sync_channel::<Chunk>(1);
        let (empty_tx, empty_rx) = mpsc::sync_channel::<()>(1);
        let relay = *self;

        let (produced, consumed) = thread::scope(|scope| {
            let producer = scope.spawn(move || relay.produce(source, full_tx, empty_rx));
            let consumer = scope.spawn(move || relay.consume(full_rx, empty_tx, inspect));

            (producer.join(), consumer.join())
        });

        let produced = produced.map_err(|_| StreamError::WorkerPanicked("Producer"))?;
        let consumed = consumed.map_err(|_| StreamError::WorkerPanicked("Consumer"))?;

        // A producer failure is the root cause of any consumer hang-up
        produced?;
        let samples = consumed?;

        info!("Relay complete: {} samples", samples.len());
        Ok(samples)
    }

    /// Producer loop: wait for an empty slot, pull, fill the slot
    fn produce<S>(
        &self,
        source: &mut S,
        full_tx: SyncSender<Chunk>,
        empty_rx: Receiver<()>,
    ) -> Result<()>
    where
        S: SampleSource + ?Sized,
    {
        for cycle in 1..=self.chunk_count {
            // The slot starts out empty
            if cycle > 1 && empty_rx.recv().is_err() {
                return Err(StreamError::Device(format!(
                    "Consumer stopped before cycle {}",
                    cycle
                )));
            }

            let samples = source
                .pull(self.chunk_size)
                .map_err(|e| StreamError::Acquisition {
                    cycle,
                    source: Box::new(e),
                })?;

            if samples.len() != self.chunk_size {
                return Err(StreamError::Acquisition {
                    cycle,
                    source: Box::new(StreamError::ChunkLength {
                        expected: self.chunk_size,
                        actual: samples.len(),
                    }),
                });
            }

            debug!("Produced chunk {}/{}", cycle, self.chunk_count);

            if full_tx.send(Chunk { cycle, samples }).is_err() {
                return Err(StreamError::Device(format!(
                    "Consumer stopped while handing over cycle {}",
                    cycle
                )));
            }
        }

        Ok(())
    }

    /// Consumer loop: wait for a full slot, copy it out, release the slot
    fn consume<F>(
        &self,
        full_rx: Receiver<Chunk>,
        empty_tx: SyncSender<()>,
        mut inspect: F,
    ) -> Result<Vec<u16>>
    where
        F: FnMut(usize, &[u16]),
    {
        let mut values = Vec::with_capacity(self.total_samples());

        for cycle in 1..=self.chunk_count {
            let chunk = full_rx.recv().map_err(|_| {
                StreamError::Device(format!("Producer stopped before cycle {}", cycle))
            })?;
            debug_assert_eq!(chunk.cycle, cycle);

            inspect(chunk.cycle, &chunk.samples);
            values.extend_from_slice(&chunk.samples);
            drop(chunk);

            debug!("Consumed chunk {}/{}", cycle, self.chunk_count);

            // Producer is gone after its last cycle, nothing to wake up
            if cycle < self.chunk_count && empty_tx.send(()).is_err() {
                break;
            }
        }

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Hands out a fixed list of chunks, then fails
    struct ScriptedSource {
        chunks: Vec<Vec<u16>>,
        pulls: usize,
    }

    impl ScriptedSource {
        fn new(chunks: Vec<Vec<u16>>) -> Self {
            Self { chunks, pulls: 0 }
        }
    }

    impl SampleSource for ScriptedSource {
        fn pull(&mut self, _count: usize) -> Result<Vec<u16>> {
            let chunk = self.chunks.get(self.pulls).cloned();
            self.pulls += 1;
            chunk.ok_or_else(|| StreamError::Device("source exhausted".to_string()))
        }
    }

    /// Counts up, failing on one chosen pull
    struct CountingSource {
        next: u16,
        pulls: usize,
        fail_on: Option<usize>,
    }

    impl SampleSource for CountingSource {
        fn pull(&mut self, count: usize) -> Result<Vec<u16>> {
            self.pulls += 1;
            if self.fail_on == Some(self.pulls) {
                return Err(StreamError::Device("USB transfer failed".to_string()));
            }
            let chunk = (0..count)
                .map(|_| {
                    let value = self.next;
                    self.next = self.next.wrapping_add(1);
                    value
                })
                .collect();
            Ok(chunk)
        }
    }

    #[test]
    fn test_relay_concatenates_in_pull_order() {
        let mut source = ScriptedSource::new(vec![
            vec![0, 1, 2, 3],
            vec![4, 5, 6, 7],
            vec![8, 9, 10, 11],
        ]);
        let relay = DoubleBufferRelay::new(3, 4).unwrap();

        let samples = relay.run(&mut source).unwrap();

        assert_eq!(samples, vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
        assert_eq!(source.pulls, 3);
    }

    #[test]
    fn test_relay_length_is_count_times_size() {
        for &(count, size) in &[(1, 1), (1, 7), (5, 1), (4, 16), (17, 3)] {
            let mut source = CountingSource {
                next: 0,
                pulls: 0,
                fail_on: None,
            };
            let relay = DoubleBufferRelay::new(count, size).unwrap();
            let samples = relay.run(&mut source).unwrap();

            assert_eq!(samples.len(), count * size);
            assert!(samples.iter().enumerate().all(|(i, &v)| v == i as u16));
            assert_eq!(source.pulls, count);
        }
    }

    #[test]
    fn test_relay_reports_failing_cycle() {
        for fail_on in [1, 2, 5] {
            let mut source = CountingSource {
                next: 0,
                pulls: 0,
                fail_on: Some(fail_on),
            };
            let relay = DoubleBufferRelay::new(5, 8).unwrap();

            let err = relay.run(&mut source).unwrap_err();

            assert_eq!(err.cycle(), Some(fail_on));
            assert!(matches!(
                err,
                StreamError::Acquisition { ref source, .. } if matches!(**source, StreamError::Device(_))
            ));
            // Nothing is pulled after the failure
            assert_eq!(source.pulls, fail_on);
        }
    }

    #[test]
    fn test_relay_rejects_short_chunk() {
        let mut source = ScriptedSource::new(vec![vec![1, 2, 3, 4], vec![5, 6]]);
        let relay = DoubleBufferRelay::new(2, 4).unwrap();

        let err = relay.run(&mut source).unwrap_err();

        match err {
            StreamError::Acquisition { cycle, source } => {
                assert_eq!(cycle, 2);
                assert!(matches!(
                    *source,
                    StreamError::ChunkLength { expected: 4, actual: 2 }
                ));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_relay_keeps_one_chunk_in_flight() {
        struct GuardedSource {
            pulls: usize,
            consumed: Arc<AtomicUsize>,
        }

        impl SampleSource for GuardedSource {
            fn pull(&mut self, count: usize) -> Result<Vec<u16>> {
                // Every earlier chunk must already be consumed
                assert_eq!(self.consumed.load(Ordering::SeqCst), self.pulls);
                self.pulls += 1;
                std::thread::sleep(std::time::Duration::from_millis(1));
                Ok(vec![self.pulls as u16; count])
            }
        }

        let consumed = Arc::new(AtomicUsize::new(0));
        let mut source = GuardedSource {
            pulls: 0,
            consumed: consumed.clone(),
        };
        let relay = DoubleBufferRelay::new(10, 32).unwrap();
        let mut seen = Vec::new();

        let samples = relay
            .run_with(&mut source, |cycle, chunk| {
                assert_eq!(chunk[0] as usize, cycle);
                seen.push(cycle);
                consumed.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert_eq!(samples.len(), 320);
        assert_eq!(seen, (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_relay_producer_panic_is_reported() {
        struct PanickingSource;

        impl SampleSource for PanickingSource {
            fn pull(&mut self, _count: usize) -> Result<Vec<u16>> {
                panic!("driver crashed");
            }
        }

        let relay = DoubleBufferRelay::new(2, 4).unwrap();
        let err = relay.run(&mut PanickingSource).unwrap_err();
        assert!(matches!(err, StreamError::WorkerPanicked("Producer")));
    }

    #[test]
    fn test_relay_rejects_empty_shape() {
        assert!(DoubleBufferRelay::new(0, 4).is_err());
        assert!(DoubleBufferRelay::new(4, 0).is_err());
        assert!(DoubleBufferRelay::new(usize::MAX, 2).is_err());
    }
}
