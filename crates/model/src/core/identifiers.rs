use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(Arc::from(id.into()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifies one import run.
    ImportId
);

string_id!(
    /// Identifier of a stored entity (employee, account, ...).
    EntityId
);

string_id!(
    /// Identifier of one dispatched batch, unique within an import.
    BatchId
);

impl ImportId {
    /// Generates a fresh random import id.
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

impl EntityId {
    /// Id assigned to an entity created during an import.
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

impl BatchId {
    pub fn for_batch(import: &ImportId, batch_number: usize) -> Self {
        Self::new(format!("{import}-b{batch_number:05}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_id_is_derived_from_import() {
        let import = ImportId::new("imp-1");
        assert_eq!(BatchId::for_batch(&import, 3).as_str(), "imp-1-b00003");
    }

    #[test]
    fn generated_ids_differ() {
        assert_ne!(EntityId::generate(), EntityId::generate());
    }
}
