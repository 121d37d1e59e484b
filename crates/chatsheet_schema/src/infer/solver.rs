//! Elimination-based column type solver.
//!
//! Every candidate type starts possible; each non-null value removes the
//! candidates whose parser rejects it. Whatever survives all values is, by
//! construction, a type every value satisfies.

use tracing::trace;

use crate::coerce::{accepts, is_null};
use crate::types::{ColumnProfile, ColumnType};

#[derive(Debug)]
pub struct ColumnSolver {
    column_name: String,

    /// Still-possible candidates, in priority order.
    possible_types: Vec<ColumnType>,

    values_processed: usize,
    null_count: usize,
}

impl ColumnSolver {
    pub fn new(column_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            possible_types: ColumnType::CANDIDATES.to_vec(),
            values_processed: 0,
            null_count: 0,
        }
    }

    /// Feed one cell; `None` is a missing cell.
    pub fn add_value(&mut self, value: Option<&str>) {
        self.values_processed += 1;

        if is_null(value) {
            self.null_count += 1;
            return;
        }
        let value = value.unwrap_or_default();

        if self.possible_types.is_empty() {
            return;
        }
        let column = &self.column_name;
        self.possible_types.retain(|ty| {
            let keep = accepts(*ty, value);
            if !keep {
                trace!(column = %column, eliminated = %ty, value, "type eliminated");
            }
            keep
        });
    }

    pub fn null_count(&self) -> usize {
        self.null_count
    }

    pub fn non_null_count(&self) -> usize {
        self.values_processed - self.null_count
    }

    /// Resolve to the narrowest surviving type.
    pub fn finish(self) -> ColumnProfile {
        let inferred_type = if self.non_null_count() == 0 {
            ColumnType::Text
        } else {
            self.possible_types
                .first()
                .copied()
                .unwrap_or(ColumnType::Text)
        };
        let nullable = self.null_count > 0 || self.non_null_count() == 0;
        ColumnProfile::new(self.column_name, inferred_type, nullable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solve(values: &[&str]) -> ColumnProfile {
        let mut solver = ColumnSolver::new("c");
        for v in values {
            solver.add_value(Some(v));
        }
        solver.finish()
    }

    #[test]
    fn integer_beats_float_and_boolean() {
        assert_eq!(solve(&["1", "0", "1"]).inferred_type, ColumnType::Integer);
    }

    #[test]
    fn one_decimal_makes_float() {
        assert_eq!(solve(&["1", "2.5"]).inferred_type, ColumnType::Float);
    }

    #[test]
    fn words_make_boolean() {
        assert_eq!(solve(&["yes", "No", "t"]).inferred_type, ColumnType::Boolean);
    }

    #[test]
    fn mixed_boolean_and_number_falls_back_to_text() {
        assert_eq!(solve(&["yes", "1"]).inferred_type, ColumnType::Text);
    }

    #[test]
    fn dates_make_datetime() {
        let profile = solve(&["2024-01-01", "2024/02/03", "2024-03-04 10:00"]);
        assert_eq!(profile.inferred_type, ColumnType::DateTime);
    }

    #[test]
    fn missing_cells_count_as_null() {
        let mut solver = ColumnSolver::new("c");
        solver.add_value(Some("1"));
        solver.add_value(None);
        let profile = solver.finish();
        assert_eq!(profile.inferred_type, ColumnType::Integer);
        assert!(profile.nullable);
    }

    #[test]
    fn all_null_column_is_nullable_text() {
        let profile = solve(&["", "  "]);
        assert_eq!(profile.inferred_type, ColumnType::Text);
        assert!(profile.nullable);

        let empty = ColumnSolver::new("c").finish();
        assert_eq!(empty.inferred_type, ColumnType::Text);
        assert!(empty.nullable);
    }
}
