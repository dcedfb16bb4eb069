use engine_core::error::ProgressError;
use engine_processing::error::{BatchError, SizingError};
use thiserror::Error;

/// Errors surfaced by the import orchestrator and pipeline.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Unknown phase: {0}")]
    UnknownPhase(String),

    /// The phase list has no phase named after the importing stage.
    #[error("Phase list must declare the '{0}' phase")]
    MissingImportPhase(String),

    #[error("Cannot {action} while the import is {state}")]
    InvalidTransition { action: &'static str, state: String },

    #[error("Progress error: {0}")]
    Progress(#[from] ProgressError),

    #[error("Batch sizing error: {0}")]
    Sizing(#[from] SizingError),

    /// The batch handler failed outside per-item reporting.
    #[error("Batch processing aborted: {0}")]
    SchedulerFatal(BatchError),
}
