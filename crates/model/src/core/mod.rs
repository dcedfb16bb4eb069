pub mod identifiers;
pub mod key;
