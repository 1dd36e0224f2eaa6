//! Common utilities shared across programs

use std::time::Instant;

/// Tracks elapsed time since creation
pub struct TimeKeeper {
    start: Instant,
}

impl TimeKeeper {
    /// Create a new TimeKeeper starting now
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time in seconds
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Average rate of `count` events since creation
    pub fn rate(&self, count: usize) -> f64 {
        let elapsed = self.elapsed_secs();
        if elapsed > 0.0 {
            count as f64 / elapsed
        } else {
            0.0
        }
    }
}

impl Default for TimeKeeper {
    fn default() -> Self {
        Self::new()
    }
}

/// Format the samples around `center` as `index: binary` lines
///
/// Handy for eyeballing what happened at a kernel buffer boundary.
///
/// # Arguments
/// * `samples` - Captured samples
/// * `center` - Index to show the neighbourhood of
/// * `radius` - Samples to show on each side
///
/// # Example
/// ```
/// use m2k_digital_stream::sample_window;
///
/// let lines = sample_window(&[0, 0, 1, 1, 2], 2, 1);
/// assert_eq!(lines.len(), 3);
/// assert!(lines[1].starts_with(">"));
/// ```
pub fn sample_window(samples: &[u16], center: usize, radius: usize) -> Vec<String> {
    if samples.is_empty() {
        return Vec::new();
    }

    let center = center.min(samples.len() - 1);
    let start = center.saturating_sub(radius);
    let end = (center + radius + 1).min(samples.len());

    (start..end)
        .map(|i| {
            let marker = if i == center { '>' } else { ' ' };
            format!("{}{:10}: {:016b}", marker, i, samples[i])
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_window_middle() {
        let samples: Vec<u16> = (0..20).collect();
        let lines = sample_window(&samples, 10, 2);
        assert_eq!(lines.len(), 5);
        assert!(lines[2].starts_with('>'));
        assert!(lines[2].ends_with("0000000000001010"));
    }

    #[test]
    fn test_sample_window_clamps_edges() {
        let samples: Vec<u16> = (0..5).collect();
        assert_eq!(sample_window(&samples, 0, 3).len(), 4);
        assert_eq!(sample_window(&samples, 99, 1).len(), 2);
        assert!(sample_window(&[], 0, 3).is_empty());
    }

    #[test]
    fn test_timekeeper() {
        let keeper = TimeKeeper::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let elapsed = keeper.elapsed_secs();
        assert!(elapsed >= 0.01); // At least 10ms
        assert!(keeper.rate(100) > 0.0);
    }
}
