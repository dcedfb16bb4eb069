use thiserror::Error;

/// Errors raised while rendering or persisting an import report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write report to {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
