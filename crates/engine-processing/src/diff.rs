use model::{
    core::key::IdentifierKey,
    import::change::{ChangeRecord, ChangeType, EntityDiff, IncomingAmount},
    records::entity::EntityRecord,
};
use std::collections::BTreeMap;

/// Absolute tolerance below which two amounts are considered equal.
pub const AMOUNT_TOLERANCE: f64 = 0.01;

/// Compares an entity's current value set against incoming amounts.
#[derive(Debug, Clone, Copy)]
pub struct DiffCalculator {
    tolerance: f64,
    skip_zero_amounts: bool,
}

impl Default for DiffCalculator {
    fn default() -> Self {
        DiffCalculator {
            tolerance: AMOUNT_TOLERANCE,
            skip_zero_amounts: false,
        }
    }
}

impl DiffCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops incoming zero amounts for fields the entity does not have yet.
    pub fn with_skip_zero_amounts(mut self, skip: bool) -> Self {
        self.skip_zero_amounts = skip;
        self
    }

    pub fn diff(
        &self,
        entity: &EntityRecord,
        incoming: &[IncomingAmount],
        matched_by: Option<IdentifierKey>,
    ) -> EntityDiff {
        let (changes, aggregate_delta) = self.compare(&entity.values, incoming);
        EntityDiff {
            entity_id: entity.id.clone(),
            matched_by,
            changes,
            aggregate_delta,
        }
    }

    /// Change records in incoming order plus `Σ incoming − Σ current`.
    pub fn compare(
        &self,
        current: &BTreeMap<String, f64>,
        incoming: &[IncomingAmount],
    ) -> (Vec<ChangeRecord>, f64) {
        let mut changes = Vec::with_capacity(incoming.len());
        let mut incoming_total = 0.0;

        for amount in incoming {
            let old_value = current.get(&amount.field).copied();
            if self.skip_zero_amounts && old_value.is_none() && amount.amount == 0.0 {
                continue;
            }

            let change_type = match old_value {
                None => ChangeType::New,
                Some(old) if (amount.amount - old).abs() > self.tolerance => ChangeType::Updated,
                Some(_) => ChangeType::Unchanged,
            };

            incoming_total += amount.amount;
            changes.push(ChangeRecord {
                field: amount.field.clone(),
                old_value,
                new_value: amount.amount,
                change_type,
            });
        }

        let current_total: f64 = current.values().sum();
        (changes, incoming_total - current_total)
    }

    /// Value set after writing every new and updated field of `diff`.
    pub fn apply(current: &BTreeMap<String, f64>, diff: &EntityDiff) -> BTreeMap<String, f64> {
        let mut values = current.clone();
        for change in diff.changes.iter().filter(|c| c.is_change()) {
            values.insert(change.field.clone(), change.new_value);
        }
        values
    }
}
