use crate::error::CliError;
use model::records::{entity::EntityRecord, row::SourceRow};
use std::{fs, path::Path};
use tracing::info;

/// Reads a headed CSV file into source rows, numbered from zero in file order.
pub fn read_rows(path: &Path) -> Result<Vec<SourceRow>, CliError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let row = SourceRow::from_pairs(index, headers.iter().zip(record.iter()));
        rows.push(row);
    }

    info!(path = %path.display(), rows = rows.len(), columns = headers.len(), "Rows loaded");
    Ok(rows)
}

/// Reads the stored entity set from a JSON array.
pub fn read_entities(path: &Path) -> Result<Vec<EntityRecord>, CliError> {
    let source = fs::read_to_string(path)?;
    let entities: Vec<EntityRecord> = serde_json::from_str(&source)?;

    info!(path = %path.display(), entities = entities.len(), "Entities loaded");
    Ok(entities)
}

pub fn write_entities(path: &Path, entities: &[EntityRecord]) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(entities)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::{identifiers::EntityId, key::IdentifierKey};

    #[test]
    fn reads_headed_csv_with_short_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.csv");
        fs::write(
            &path,
            "员工编号,员工姓名,basic_salary\nE001 , Li Wei,\"5,200\"\nE002,Wang Fang\n",
        )
        .unwrap();

        let rows = read_rows(&path).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].index(), 0);
        assert_eq!(rows[0].get("员工编号"), Some("E001"));
        assert_eq!(rows[0].get("basic_salary"), Some("5,200"));
        assert_eq!(rows[1].get("basic_salary"), None);
    }

    #[test]
    fn entities_round_trip_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities.json");
        let entities = vec![
            EntityRecord::new("e1")
                .with_identifier(IdentifierKey::EmployeeCode, "E001")
                .with_value("basic_salary", 5000.0),
        ];

        write_entities(&path, &entities).unwrap();
        let loaded = read_entities(&path).unwrap();

        assert_eq!(loaded, entities);
        assert_eq!(loaded[0].id, EntityId::new("e1"));
    }
}
