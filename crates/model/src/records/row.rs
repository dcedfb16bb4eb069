use crate::{
    core::key::{ColumnMap, IdentifierKey},
    error::RowValueError,
    import::change::IncomingAmount,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub column: String,
    pub value: String,
}

/// One ingested record prior to reconciliation.
///
/// The column set is caller-defined, so cells are kept in source order and
/// looked up by name; typed accessors sit on top for the fields the engine
/// understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRow {
    index: usize,
    cells: Vec<Cell>,
}

impl SourceRow {
    pub fn new(index: usize, cells: Vec<Cell>) -> Self {
        SourceRow { index, cells }
    }

    pub fn from_pairs<K, V>(index: usize, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let cells = pairs
            .into_iter()
            .map(|(column, value)| Cell {
                column: column.into(),
                value: value.into(),
            })
            .collect();
        SourceRow { index, cells }
    }

    /// Zero-based position of the row in its source.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|c| c.value.trim().is_empty())
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        let column = column.trim();
        self.cells
            .iter()
            .find(|c| c.column.trim().eq_ignore_ascii_case(column))
            .map(|c| c.value.as_str())
    }

    /// Like [`SourceRow::get`] but treats blank cells as absent.
    pub fn get_non_empty(&self, column: &str) -> Option<&str> {
        self.get(column)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    /// First non-empty value among the key's column aliases.
    pub fn identifier(&self, key: IdentifierKey, columns: &ColumnMap) -> Option<&str> {
        columns
            .aliases(key)
            .iter()
            .find_map(|alias| self.get_non_empty(alias))
    }

    /// True when any of `keys` has a non-empty value in this row.
    pub fn has_identifier(&self, keys: &[IdentifierKey], columns: &ColumnMap) -> bool {
        keys.iter()
            .any(|key| self.identifier(*key, columns).is_some())
    }

    pub fn amount(&self, column: &str) -> Result<Option<f64>, RowValueError> {
        match self.get_non_empty(column) {
            Some(raw) => parse_amount(self.index, column, raw).map(Some),
            None => Ok(None),
        }
    }

    /// Every non-reserved, non-empty cell parsed as an amount, in column order.
    pub fn amounts(&self, columns: &ColumnMap) -> Result<Vec<IncomingAmount>, RowValueError> {
        let mut amounts = Vec::new();
        for cell in &self.cells {
            if columns.is_reserved(&cell.column) {
                continue;
            }
            let raw = cell.value.trim();
            if raw.is_empty() {
                continue;
            }
            let amount = parse_amount(self.index, &cell.column, raw)?;
            amounts.push(IncomingAmount::new(cell.column.trim(), amount));
        }
        Ok(amounts)
    }
}

fn parse_amount(row: usize, column: &str, raw: &str) -> Result<f64, RowValueError> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    let value = cleaned
        .parse::<f64>()
        .map_err(|_| RowValueError::NotANumber {
            row,
            column: column.to_string(),
            value: raw.to_string(),
        })?;

    if !value.is_finite() {
        return Err(RowValueError::NotFinite {
            row,
            column: column.to_string(),
        });
    }
    Ok(value)
}
