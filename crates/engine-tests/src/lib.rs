pub mod pipeline;
pub mod utils;
