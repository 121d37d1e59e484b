//! Schema inference over untyped CSV rows.
//!
//! Uses ALL values, not a sample: one [`ColumnSolver`] per column eliminates
//! candidate types as values arrive. The result is deterministic for a given
//! input and never touches the database.

pub mod solver;

pub use solver::ColumnSolver;

use tracing::debug;

use crate::error::SchemaError;
use crate::types::{check_column_names, ColumnProfile, TableSchema};

/// Infer ordered column profiles from a header and data rows.
///
/// Rows shorter than the header contribute nulls; longer rows are rejected.
pub fn infer_columns(
    header: &[String],
    rows: &[Vec<String>],
) -> Result<Vec<ColumnProfile>, SchemaError> {
    if header.is_empty() {
        return Err(SchemaError::EmptyHeader);
    }
    check_column_names(header.iter().map(String::as_str))?;

    let mut solvers: Vec<ColumnSolver> = header.iter().map(ColumnSolver::new).collect();

    for (index, row) in rows.iter().enumerate() {
        if row.len() > header.len() {
            return Err(SchemaError::RaggedRow {
                row: index + 1,
                cells: row.len(),
                expected: header.len(),
            });
        }
        for (col_index, solver) in solvers.iter_mut().enumerate() {
            solver.add_value(row.get(col_index).map(String::as_str));
        }
    }

    let columns: Vec<ColumnProfile> = solvers.into_iter().map(ColumnSolver::finish).collect();
    debug!(
        columns = columns.len(),
        rows = rows.len(),
        "inferred column profiles"
    );
    Ok(columns)
}

/// Infer a [`TableSchema`] named `table_name`.
pub fn infer(
    table_name: &str,
    header: &[String],
    rows: &[Vec<String>],
) -> Result<TableSchema, SchemaError> {
    let columns = infer_columns(header, rows)?;
    TableSchema::new(table_name, columns)
}
