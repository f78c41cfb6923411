// crates/engine_columns/src/error.rs
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("row has {found} columns, table has {expected}")]
    ColumnCountMismatch { expected: usize, found: usize },

    #[error("table has no column of type {0}")]
    UnknownColumn(&'static str),

    #[error("row contains column type {0} more than once")]
    DuplicateColumn(&'static str),
}
