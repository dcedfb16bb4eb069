use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProgressError {
    #[error("A pipeline needs at least one phase")]
    EmptyPipeline,

    #[error("Phase '{0}' is declared more than once")]
    DuplicatePhase(String),

    #[error("Phase '{phase}' has weight {weight}, expected a value in (0, 1]")]
    InvalidWeight { phase: String, weight: f64 },

    #[error("Phase weights sum to {0}, expected 1.0")]
    WeightSum(f64),
}
