use engine_core::error::ProgressError;
use engine_processing::error::SizingError;
use thiserror::Error;

/// Errors raised when loading or validating import settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON for [`super::ImportSettings`].
    #[error("Failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// An environment override carried a value of the wrong shape.
    #[error("Invalid value '{value}' for {var}: {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Invalid batch sizing: {0}")]
    Sizing(#[from] SizingError),

    #[error("Invalid phase list: {0}")]
    Phases(#[from] ProgressError),

    /// One or more settings failed validation.
    #[error("Settings validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),
}
