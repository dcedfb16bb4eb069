pub mod core;
pub mod error;
pub mod import;
pub mod records;
