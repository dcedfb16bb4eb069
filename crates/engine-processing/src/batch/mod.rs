pub mod guard;
pub mod handler;
pub mod scheduler;
pub mod sizing;

pub use handler::{BatchHandler, BatchOutcome, BatchRequest, ItemError, ItemFailure, ItemSuccess};
pub use scheduler::{BatchScheduler, BatchState, SchedulerConfig, SchedulerReport, Termination};
pub use sizing::{AdaptiveSizer, SizingConfig};
