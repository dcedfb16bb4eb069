use crate::core::{identifiers::EntityId, key::IdentifierKey};
use serde::{Deserialize, Serialize};

/// One field/amount pair parsed from an incoming row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingAmount {
    pub field: String,
    pub amount: f64,
}

impl IncomingAmount {
    pub fn new(field: impl Into<String>, amount: f64) -> Self {
        IncomingAmount {
            field: field.into(),
            amount,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    New,
    Updated,
    Unchanged,
}

/// One field-level difference between stored and incoming values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub field: String,
    pub old_value: Option<f64>,
    pub new_value: f64,
    pub change_type: ChangeType,
}

impl ChangeRecord {
    pub fn is_change(&self) -> bool {
        self.change_type != ChangeType::Unchanged
    }
}

/// Field-level diff of a matched entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDiff {
    pub entity_id: EntityId,
    pub matched_by: Option<IdentifierKey>,
    pub changes: Vec<ChangeRecord>,
    /// Sum of incoming amounts minus sum of the entity's current amounts.
    pub aggregate_delta: f64,
}

impl EntityDiff {
    pub fn has_changes(&self) -> bool {
        self.changes.iter().any(ChangeRecord::is_change)
    }

    pub fn count(&self, change_type: ChangeType) -> usize {
        self.changes
            .iter()
            .filter(|c| c.change_type == change_type)
            .count()
    }
}
