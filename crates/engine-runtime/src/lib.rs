pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod writer;
