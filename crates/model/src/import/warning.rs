use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningCode {
    /// Row-level validation issue that did not fail the row.
    Validation,
    /// An identifier value collided across several stored entities.
    ReconciliationAmbiguity,
    /// No entity matched and the row was not turned into a new entity.
    Unmatched,
    /// Row intentionally left out of the import (e.g. nothing changed).
    Skipped,
}

impl WarningCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningCode::Validation => "WARN_VALIDATION",
            WarningCode::ReconciliationAmbiguity => "WARN_AMBIGUOUS_MATCH",
            WarningCode::Unmatched => "WARN_UNMATCHED",
            WarningCode::Skipped => "WARN_SKIPPED",
        }
    }
}

impl fmt::Display for WarningCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-fatal issue recorded during an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportWarning {
    pub row_index: Option<usize>,
    pub code: WarningCode,
    pub message: String,
}

impl ImportWarning {
    pub fn new(code: WarningCode, message: impl Into<String>) -> Self {
        ImportWarning {
            row_index: None,
            code,
            message: message.into(),
        }
    }

    pub fn for_row(row_index: usize, code: WarningCode, message: impl Into<String>) -> Self {
        ImportWarning {
            row_index: Some(row_index),
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ImportWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row_index {
            Some(row) => write!(f, "[{}] row {}: {}", self.code, row, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}
