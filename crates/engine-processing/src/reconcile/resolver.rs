use crate::reconcile::index::EntityIndex;
use model::{
    core::{
        identifiers::EntityId,
        key::{ColumnMap, IdentifierKey},
    },
    records::{entity::EntityRecord, row::SourceRow},
};
use std::collections::BTreeMap;

/// An identifier value that points at more than one stored entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ambiguity {
    pub key: IdentifierKey,
    pub value: String,
    pub candidates: Vec<EntityId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution<'a> {
    pub entity: Option<&'a EntityRecord>,
    pub matched_by: Option<IdentifierKey>,
    pub ambiguity: Option<Ambiguity>,
}

impl Resolution<'_> {
    fn unmatched() -> Self {
        Resolution {
            entity: None,
            matched_by: None,
            ambiguity: None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.entity.is_some()
    }
}

/// Matches a row to at most one stored entity by trying identifier keys in
/// priority order. Pure: the same row and index always give the same answer.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    priority: Vec<IdentifierKey>,
    columns: ColumnMap,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        IdentityResolver::new(IdentifierKey::PRIORITY.to_vec(), ColumnMap::default())
    }
}

impl IdentityResolver {
    /// Repeated keys in `priority` keep their first position.
    pub fn new(priority: Vec<IdentifierKey>, columns: ColumnMap) -> Self {
        let mut ordered: Vec<IdentifierKey> = Vec::with_capacity(priority.len());
        for key in priority {
            if !ordered.contains(&key) {
                ordered.push(key);
            }
        }
        IdentityResolver {
            priority: ordered,
            columns,
        }
    }

    pub fn priority(&self) -> &[IdentifierKey] {
        &self.priority
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    pub fn resolve<'a>(&self, row: &SourceRow, index: &'a EntityIndex) -> Resolution<'a> {
        for key in &self.priority {
            let Some(value) = row.identifier(*key, &self.columns) else {
                continue;
            };

            let positions = index.lookup(*key, value);
            let Some(first) = positions.first() else {
                continue;
            };

            let ambiguity = (positions.len() > 1).then(|| Ambiguity {
                key: *key,
                value: value.to_string(),
                candidates: positions
                    .iter()
                    .filter_map(|pos| index.get(*pos))
                    .map(|entity| entity.id.clone())
                    .collect(),
            });

            return Resolution {
                entity: index.get(*first),
                matched_by: Some(*key),
                ambiguity,
            };
        }

        Resolution::unmatched()
    }

    /// Whether the row carries a value for any key this resolver matches on.
    pub fn has_identifier(&self, row: &SourceRow) -> bool {
        row.has_identifier(&self.priority, &self.columns)
    }

    /// Every identifier the row carries, for previews of new entities.
    pub fn identifiers_of(&self, row: &SourceRow) -> BTreeMap<IdentifierKey, String> {
        self.priority
            .iter()
            .filter_map(|key| {
                row.identifier(*key, &self.columns)
                    .map(|value| (*key, value.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> EntityIndex {
        EntityIndex::build(vec![
            EntityRecord::new("by-id")
                .with_identifier(IdentifierKey::IdNumber, "110101199001011234")
                .with_identifier(IdentifierKey::EmployeeCode, "E001"),
            EntityRecord::new("by-code").with_identifier(IdentifierKey::EmployeeCode, "E002"),
            EntityRecord::new("name-1").with_identifier(IdentifierKey::FullName, "Zhang San"),
            EntityRecord::new("name-2").with_identifier(IdentifierKey::FullName, "Zhang San"),
        ])
    }

    #[test]
    fn higher_priority_key_wins() {
        let index = index();
        let row = SourceRow::from_pairs(
            0,
            [("id_number", "110101199001011234"), ("employee_code", "E002")],
        );

        let resolution = IdentityResolver::default().resolve(&row, &index);
        assert_eq!(resolution.entity.unwrap().id.as_str(), "by-id");
        assert_eq!(resolution.matched_by, Some(IdentifierKey::IdNumber));
        assert!(resolution.ambiguity.is_none());
    }

    #[test]
    fn falls_through_keys_without_hits() {
        let index = index();
        let row = SourceRow::from_pairs(1, [("id_number", "999"), ("员工编号", "e002")]);

        let resolution = IdentityResolver::default().resolve(&row, &index);
        assert_eq!(resolution.entity.unwrap().id.as_str(), "by-code");
        assert_eq!(resolution.matched_by, Some(IdentifierKey::EmployeeCode));
    }

    #[test]
    fn colliding_name_returns_first_and_reports_ambiguity() {
        let index = index();
        let row = SourceRow::from_pairs(2, [("employee_code", " "), ("full_name", "Zhang San")]);

        let resolver = IdentityResolver::default();
        let first = resolver.resolve(&row, &index);
        let second = resolver.resolve(&row, &index);

        assert_eq!(first, second);
        assert_eq!(first.entity.unwrap().id.as_str(), "name-1");
        let ambiguity = first.ambiguity.unwrap();
        assert_eq!(ambiguity.key, IdentifierKey::FullName);
        assert_eq!(
            ambiguity.candidates,
            vec![EntityId::new("name-1"), EntityId::new("name-2")]
        );
    }

    #[test]
    fn no_hit_is_unmatched() {
        let index = index();
        let row = SourceRow::from_pairs(3, [("full_name", "Nobody")]);
        let resolution = IdentityResolver::default().resolve(&row, &index);
        assert!(!resolution.is_match());
        assert_eq!(resolution.matched_by, None);
    }

    #[test]
    fn custom_priority_changes_precedence() {
        let index = index();
        let row = SourceRow::from_pairs(
            4,
            [("id_number", "110101199001011234"), ("employee_code", "E002")],
        );
        let resolver = IdentityResolver::new(
            vec![IdentifierKey::EmployeeCode, IdentifierKey::IdNumber],
            ColumnMap::default(),
        );
        assert_eq!(
            resolver.resolve(&row, &index).entity.unwrap().id.as_str(),
            "by-code"
        );
    }

    #[test]
    fn keys_outside_the_priority_do_not_count_as_identifiers() {
        let row = SourceRow::from_pairs(5, [("full_name", "Nobody"), ("basic_salary", "10")]);
        let codes_only = IdentityResolver::new(vec![IdentifierKey::EmployeeCode], ColumnMap::default());

        assert!(!codes_only.has_identifier(&row));
        assert!(IdentityResolver::default().has_identifier(&row));
    }
}
