//! Error types for gridstate

use crate::column::ColumnType;
use crate::filter::FilterOperator;
use thiserror::Error;

/// Core error type for gridstate operations
#[derive(Error, Debug)]
pub enum GridError {
    /// A filter clause used an operator that is not defined for the
    /// column's type. This is a programmer error and fails fast during
    /// state validation rather than being swallowed at evaluation time.
    #[error("Operator {operator:?} is not valid for column type {column_type:?}")]
    InvalidFilterOperator {
        operator: FilterOperator,
        column_type: ColumnType,
    },

    /// The remote data source failed. Recoverable: the engine keeps the
    /// previously known-good rows and surfaces this for caller display.
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Export failed after partial progress. `processed_rows` reports how
    /// many rows were resolved before the failure so the caller can retry.
    #[error("Export error after {processed_rows} rows: {message}")]
    Export {
        message: String,
        processed_rows: u64,
    },

    /// A second export was requested while one is still running. Only one
    /// export lifecycle may be active per table instance.
    #[error("An export is already in progress")]
    ExportInProgress,

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for gridstate operations
pub type Result<T> = std::result::Result<T, GridError>;
