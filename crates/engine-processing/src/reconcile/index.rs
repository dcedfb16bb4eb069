use model::{
    core::{identifiers::EntityId, key::IdentifierKey},
    records::entity::EntityRecord,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Lookup tables from normalized identifier values to stored entities.
///
/// Positions are kept in insertion order, so the first candidate for a value
/// is always the first entity that carried it.
#[derive(Debug, Clone, Default)]
pub struct EntityIndex {
    entities: Vec<EntityRecord>,
    by_key: HashMap<IdentifierKey, HashMap<String, Vec<usize>>>,
    by_id: HashMap<EntityId, usize>,
}

impl EntityIndex {
    pub fn build(entities: impl IntoIterator<Item = EntityRecord>) -> Self {
        let mut index = EntityIndex::default();
        for entity in entities {
            index.insert(entity);
        }

        debug!(
            entities = index.entities.len(),
            keys = index.by_key.len(),
            "Entity index built"
        );
        index
    }

    /// Adds an entity; a second record with an already indexed id is ignored.
    pub fn insert(&mut self, entity: EntityRecord) -> bool {
        if self.by_id.contains_key(&entity.id) {
            warn!(entity_id = %entity.id, "Duplicate entity id ignored while indexing");
            return false;
        }

        let position = self.entities.len();
        for (key, raw) in &entity.identifiers {
            if raw.trim().is_empty() {
                continue;
            }
            self.by_key
                .entry(*key)
                .or_default()
                .entry(key.normalize(raw))
                .or_default()
                .push(position);
        }
        self.by_id.insert(entity.id.clone(), position);
        self.entities.push(entity);
        true
    }

    /// Entity positions carrying `value` under `key`, in index order.
    pub fn lookup(&self, key: IdentifierKey, value: &str) -> &[usize] {
        self.by_key
            .get(&key)
            .and_then(|values| values.get(&key.normalize(value)))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn get(&self, position: usize) -> Option<&EntityRecord> {
        self.entities.get(position)
    }

    pub fn by_id(&self, id: &EntityId) -> Option<&EntityRecord> {
        self.by_id.get(id).and_then(|pos| self.entities.get(*pos))
    }

    pub fn entities(&self) -> &[EntityRecord] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Identifier values shared by more than one entity, per key.
    pub fn collisions(&self) -> Vec<(IdentifierKey, String, usize)> {
        let mut found: Vec<_> = self
            .by_key
            .iter()
            .flat_map(|(key, values)| {
                values
                    .iter()
                    .filter(|(_, positions)| {
                        positions.iter().collect::<HashSet<_>>().len() > 1
                    })
                    .map(|(value, positions)| (*key, value.clone(), positions.len()))
            })
            .collect();
        found.sort();
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities() -> Vec<EntityRecord> {
        vec![
            EntityRecord::new("a")
                .with_identifier(IdentifierKey::EmployeeCode, "e01")
                .with_identifier(IdentifierKey::FullName, "Wang Fang"),
            EntityRecord::new("b").with_identifier(IdentifierKey::FullName, "Wang  Fang"),
            EntityRecord::new("a").with_identifier(IdentifierKey::EmployeeCode, "E99"),
        ]
    }

    #[test]
    fn normalizes_values_and_keeps_order() {
        let index = EntityIndex::build(entities());
        assert_eq!(index.len(), 2);
        assert_eq!(index.lookup(IdentifierKey::EmployeeCode, " E01"), &[0]);
        assert_eq!(index.lookup(IdentifierKey::FullName, "wang fang"), &[] as &[usize]);
        assert_eq!(index.lookup(IdentifierKey::FullName, "Wang Fang"), &[0, 1]);
        assert!(index.lookup(IdentifierKey::EmployeeCode, "E99").is_empty());
    }

    #[test]
    fn reports_collisions() {
        let index = EntityIndex::build(entities());
        assert_eq!(
            index.collisions(),
            vec![(IdentifierKey::FullName, "Wang Fang".to_string(), 2)]
        );
        assert_eq!(index.by_id(&EntityId::new("b")).unwrap().id.as_str(), "b");
    }
}
