use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// An attribute usable to resolve an incoming row to a stored entity.
///
/// Declaration order is the default resolution priority: the national id
/// number is the most reliable key, the display name the least.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKey {
    IdNumber,
    EmployeeCode,
    FullName,
}

impl IdentifierKey {
    pub const PRIORITY: [IdentifierKey; 3] = [
        IdentifierKey::IdNumber,
        IdentifierKey::EmployeeCode,
        IdentifierKey::FullName,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKey::IdNumber => "id_number",
            IdentifierKey::EmployeeCode => "employee_code",
            IdentifierKey::FullName => "full_name",
        }
    }

    /// Canonical form used for index lookups.
    pub fn normalize(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        match self {
            IdentifierKey::IdNumber | IdentifierKey::EmployeeCode => trimmed.to_ascii_uppercase(),
            IdentifierKey::FullName => trimmed.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }

    fn default_aliases(&self) -> &'static [&'static str] {
        match self {
            IdentifierKey::IdNumber => &["id_number", "national_id", "身份证号"],
            IdentifierKey::EmployeeCode => &["employee_code", "code", "员工编号"],
            IdentifierKey::FullName => &["full_name", "name", "员工姓名"],
        }
    }
}

impl fmt::Display for IdentifierKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentifierKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "id_number" | "idnumber" => Ok(IdentifierKey::IdNumber),
            "employee_code" | "employeecode" | "code" => Ok(IdentifierKey::EmployeeCode),
            "full_name" | "fullname" | "name" => Ok(IdentifierKey::FullName),
            other => Err(format!("unknown identifier key '{other}'")),
        }
    }
}

/// Maps semantic identifier keys onto the caller's column names.
///
/// Rows arrive with arbitrary headers, so each key lists every alias it may
/// appear under. Columns listed in `ignored` are neither identifiers nor
/// amounts (department, remarks, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMap {
    pub identifiers: BTreeMap<IdentifierKey, Vec<String>>,
    #[serde(default)]
    pub ignored: Vec<String>,
}

impl Default for ColumnMap {
    fn default() -> Self {
        let identifiers = IdentifierKey::PRIORITY
            .iter()
            .map(|key| {
                let aliases = key.default_aliases().iter().map(|a| a.to_string()).collect();
                (*key, aliases)
            })
            .collect();

        ColumnMap {
            identifiers,
            ignored: vec![
                "department".to_string(),
                "position".to_string(),
                "remarks".to_string(),
            ],
        }
    }
}

impl ColumnMap {
    pub fn aliases(&self, key: IdentifierKey) -> &[String] {
        self.identifiers
            .get(&key)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// True when the column carries an identifier or is explicitly ignored.
    pub fn is_reserved(&self, column: &str) -> bool {
        let column = column.trim();
        self.identifiers
            .values()
            .flatten()
            .chain(self.ignored.iter())
            .any(|alias| alias.eq_ignore_ascii_case(column))
    }
}
