use crate::core::{identifiers::EntityId, key::IdentifierKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical stored entity a row may resolve to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    #[serde(default)]
    pub identifiers: BTreeMap<IdentifierKey, String>,
    /// Current composed value set, field name to amount.
    #[serde(default)]
    pub values: BTreeMap<String, f64>,
}

impl EntityRecord {
    pub fn new(id: impl Into<EntityId>) -> Self {
        EntityRecord {
            id: id.into(),
            identifiers: BTreeMap::new(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_identifier(mut self, key: IdentifierKey, value: impl Into<String>) -> Self {
        self.identifiers.insert(key, value.into());
        self
    }

    pub fn with_value(mut self, field: impl Into<String>, amount: f64) -> Self {
        self.values.insert(field.into(), amount);
        self
    }

    pub fn identifier(&self, key: IdentifierKey) -> Option<&str> {
        self.identifiers
            .get(&key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    pub fn total(&self) -> f64 {
        self.values.values().sum()
    }
}
