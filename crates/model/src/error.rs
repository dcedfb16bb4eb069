use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowValueError {
    #[error("Row {row}: column '{column}' is not a number: '{value}'")]
    NotANumber {
        row: usize,
        column: String,
        value: String,
    },

    #[error("Row {row}: column '{column}' is not finite")]
    NotFinite { row: usize, column: String },
}
