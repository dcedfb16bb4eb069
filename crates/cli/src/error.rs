use engine_config::{error::ReportError, settings::error::SettingsError};
use engine_runtime::error::ImportError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read rows: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Import failed: {0}")]
    Import(#[from] ImportError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}
