pub mod batch;
pub mod diff;
pub mod error;
pub mod reconcile;
