//! Error types for digital stream acquisition

use thiserror::Error;

/// Error type for streaming operations
#[derive(Error, Debug)]
pub enum StreamError {
    /// A pull failed or returned the wrong amount of data; the capture is invalid
    #[error("Acquisition failed at cycle {cycle}: {source}")]
    Acquisition {
        /// 1-based index of the failing pull
        cycle: usize,
        source: Box<StreamError>,
    },

    /// Chunk length mismatch
    #[error("Chunk length mismatch: expected {expected} samples, got {actual}")]
    ChunkLength { expected: usize, actual: usize },

    /// Error reported by the device itself
    #[error("Device error: {0}")]
    Device(String),

    /// Invalid digital channel index
    #[error("Invalid channel index: {0}")]
    InvalidChannel(u32),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A relay worker thread panicked
    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),

    /// Capture file error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl StreamError {
    /// Cycle index of an acquisition failure, if this is one
    pub fn cycle(&self) -> Option<usize> {
        match self {
            StreamError::Acquisition { cycle, .. } => Some(*cycle),
            _ => None,
        }
    }
}

/// Result type for streaming operations
pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_display_includes_cause() {
        let err = StreamError::Acquisition {
            cycle: 3,
            source: Box::new(StreamError::ChunkLength { expected: 8, actual: 4 }),
        };
        let text = err.to_string();
        assert!(text.contains("cycle 3"));
        assert!(text.contains("expected 8"));
        assert_eq!(err.cycle(), Some(3));
    }

    #[test]
    fn test_cycle_none_for_other_errors() {
        assert_eq!(StreamError::InvalidChannel(17).cycle(), None);
    }
}
