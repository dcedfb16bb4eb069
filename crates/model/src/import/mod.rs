pub mod change;
pub mod outcome;
pub mod reconciliation;
pub mod warning;
