use crate::{
    core::key::IdentifierKey,
    import::{change::EntityDiff, change::IncomingAmount, warning::ImportWarning},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a new entity would look like if the row were created as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityPreview {
    pub row_index: usize,
    pub identifiers: BTreeMap<IdentifierKey, String>,
    pub values: Vec<IncomingAmount>,
}

impl EntityPreview {
    pub fn total(&self) -> f64 {
        self.values.iter().map(|v| v.amount).sum()
    }
}

/// Outcome of reconciling one row; exactly one variant per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReconciliationResult {
    NewEntity(EntityPreview),
    UpdateEntity(EntityDiff),
    Unmatched(ImportWarning),
}

impl ReconciliationResult {
    pub fn kind(&self) -> &'static str {
        match self {
            ReconciliationResult::NewEntity(_) => "new",
            ReconciliationResult::UpdateEntity(_) => "update",
            ReconciliationResult::Unmatched(_) => "unmatched",
        }
    }
}

/// A write the import phase has to commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ImportAction {
    Create(EntityPreview),
    Update(EntityDiff),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportItem {
    pub row_index: usize,
    pub action: ImportAction,
}

/// What to do with a row no stored entity matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedPolicy {
    /// Propose a new entity built from the row.
    #[default]
    Create,
    /// Leave the row out and record an unmatched warning.
    Skip,
}
