use crate::core::identifiers::EntityId;
use serde::{Deserialize, Serialize};

/// Final disposition of a single source row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowDisposition {
    Created(EntityId),
    Updated(EntityId),
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportOutcome {
    pub succeeded_count: usize,
    pub failed_count: usize,
    pub created_ids: Vec<EntityId>,
    pub updated_ids: Vec<EntityId>,
    pub failed_indices: Vec<usize>,
    pub skipped_indices: Vec<usize>,
    /// Rows never dispatched because the import was cancelled first.
    pub pending_indices: Vec<usize>,
    pub cancelled: bool,
}

impl ImportOutcome {
    pub fn record(&mut self, row_index: usize, disposition: RowDisposition) {
        match disposition {
            RowDisposition::Created(id) => {
                self.succeeded_count += 1;
                self.created_ids.push(id);
            }
            RowDisposition::Updated(id) => {
                self.succeeded_count += 1;
                self.updated_ids.push(id);
            }
            RowDisposition::Skipped => self.skipped_indices.push(row_index),
            RowDisposition::Failed(_) => {
                self.failed_count += 1;
                self.failed_indices.push(row_index);
            }
        }
    }

    /// Number of rows accounted for across every disposition.
    pub fn accounted_rows(&self) -> usize {
        self.succeeded_count
            + self.failed_count
            + self.skipped_indices.len()
            + self.pending_indices.len()
    }
}
