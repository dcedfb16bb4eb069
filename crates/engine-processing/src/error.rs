use std::time::Duration;
use thiserror::Error;

/// Failure of a whole batch call, as opposed to a per-item failure reported
/// inside a [`crate::batch::BatchOutcome`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchError {
    #[error("Batch handler failed: {message}")]
    Handler { message: String, transient: bool },

    #[error("Batch {batch_number} timed out after {elapsed:?}")]
    Timeout { batch_number: usize, elapsed: Duration },

    #[error("Batch failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: usize, last: Box<BatchError> },
}

impl BatchError {
    pub fn fatal(message: impl Into<String>) -> Self {
        BatchError::Handler {
            message: message.into(),
            transient: false,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        BatchError::Handler {
            message: message.into(),
            transient: true,
        }
    }

    /// Whether repeating the same batch may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            BatchError::Handler { transient, .. } => *transient,
            BatchError::Timeout { .. } => true,
            BatchError::RetriesExhausted { .. } => false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SizingError {
    #[error("Batch size bounds must be at least 1 (min {min}, max {max})")]
    ZeroSize { min: usize, max: usize },

    #[error("Minimum batch size {min} exceeds maximum {max}")]
    InvertedBounds { min: usize, max: usize },

    #[error("Initial batch size {initial} is outside [{min}, {max}]")]
    InitialOutOfBounds { initial: usize, min: usize, max: usize },

    #[error("Growth factor must be greater than 1, got {0}")]
    GrowthFactor(f64),

    #[error("Shrink factor must be within (0, 1), got {0}")]
    ShrinkFactor(f64),

    #[error("Latency tolerance must be within [0, 1), got {0}")]
    Tolerance(f64),
}
