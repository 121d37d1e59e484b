use thiserror::Error;

use crate::types::ColumnType;

/// Errors raised while inferring, validating or coercing a table layout.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("CSV header is empty")]
    EmptyHeader,

    #[error("Column {index} has an empty name")]
    EmptyColumnName { index: usize },

    #[error("Duplicate column name '{name}' (column names are case-insensitive)")]
    DuplicateColumn { name: String },

    #[error("Row {row} has {cells} cells but the header has {expected}")]
    RaggedRow {
        row: usize,
        cells: usize,
        expected: usize,
    },

    #[error("Invalid table name '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: String },

    #[error("Row {row}, column '{column}': cannot convert '{value}' to {target}")]
    Coercion {
        row: usize,
        column: String,
        value: String,
        target: ColumnType,
    },

    #[error("Row {row}, column '{column}': NULL in a NOT NULL column")]
    NullInNotNull { row: usize, column: String },
}

impl SchemaError {
    /// Whether this error concerns the table identifier rather than the data.
    pub fn is_identifier_error(&self) -> bool {
        matches!(self, SchemaError::InvalidIdentifier { .. })
    }

    /// Whether this error was raised while coercing values to their column type.
    pub fn is_coercion_error(&self) -> bool {
        matches!(
            self,
            SchemaError::Coercion { .. } | SchemaError::NullInNotNull { .. }
        )
    }
}
