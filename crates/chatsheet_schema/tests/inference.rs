//! Inference behaviour over whole tables.

use chatsheet_schema::{coerce_rows, infer, infer_columns, ColumnType, SchemaError};
use proptest::prelude::*;

fn header(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
    data.iter()
        .map(|row| row.iter().map(|s| s.to_string()).collect())
        .collect()
}

fn single_column(values: &[&str]) -> (ColumnType, bool) {
    let data: Vec<Vec<String>> = values.iter().map(|v| vec![v.to_string()]).collect();
    let columns = infer_columns(&header(&["c"]), &data).unwrap();
    (columns[0].inferred_type, columns[0].nullable)
}

#[test]
fn test_integer_column_nullability() {
    assert_eq!(single_column(&["1", "2", "3"]), (ColumnType::Integer, false));
    assert_eq!(
        single_column(&["1", "2", "3", ""]),
        (ColumnType::Integer, true)
    );
    assert_eq!(
        single_column(&["1", "2", "3", "abc"]),
        (ColumnType::Text, false)
    );
}

#[test]
fn test_mixed_table() {
    let schema = infer(
        "orders",
        &header(&["id", "amount", "paid", "placed_at", "note"]),
        &rows(&[
            &["1", "9.99", "yes", "2024-05-01 10:00:00", "first"],
            &["2", "15", "no", "2024-05-02", ""],
            &["3", "-0.5", "Y", "2024-05-03T08:15:00Z"],
        ]),
    )
    .unwrap();

    let types: Vec<(&str, ColumnType, bool)> = schema
        .columns()
        .iter()
        .map(|c| (c.name.as_str(), c.inferred_type, c.nullable))
        .collect();
    assert_eq!(
        types,
        vec![
            ("id", ColumnType::Integer, false),
            ("amount", ColumnType::Float, false),
            ("paid", ColumnType::Boolean, false),
            ("placed_at", ColumnType::DateTime, false),
            ("note", ColumnType::Text, true),
        ]
    );
    assert_eq!(schema.table_name(), "orders");
}

#[test]
fn test_header_errors() {
    assert_eq!(infer_columns(&[], &[]).unwrap_err(), SchemaError::EmptyHeader);
    assert!(matches!(
        infer_columns(&header(&["id", "ID"]), &[]).unwrap_err(),
        SchemaError::DuplicateColumn { .. }
    ));
    assert!(matches!(
        infer_columns(&header(&["id", " "]), &[]).unwrap_err(),
        SchemaError::EmptyColumnName { index: 1 }
    ));
}

#[test]
fn test_long_row_rejected() {
    let err = infer_columns(&header(&["a"]), &rows(&[&["1"], &["2", "3"]])).unwrap_err();
    assert_eq!(
        err,
        SchemaError::RaggedRow {
            row: 2,
            cells: 2,
            expected: 1
        }
    );
}

#[test]
fn test_header_only_gives_nullable_text() {
    let columns = infer_columns(&header(&["a", "b"]), &[]).unwrap();
    assert!(columns
        .iter()
        .all(|c| c.inferred_type == ColumnType::Text && c.nullable));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Whatever gets inferred, every row coerces under it.
    #[test]
    fn test_inferred_schema_always_coerces(
        data in prop::collection::vec(
            prop::collection::vec(
                prop_oneof![
                    Just(String::new()),
                    any::<i64>().prop_map(|v| v.to_string()),
                    any::<f64>().prop_map(|v| v.to_string()),
                    Just("yes".to_string()),
                    Just("2024-01-31".to_string()),
                    "[a-z ]{0,8}",
                ],
                3,
            ),
            0..20,
        )
    ) {
        let schema = infer("t", &header(&["a", "b", "c"]), &data).unwrap();
        prop_assert!(coerce_rows(&schema, &data).is_ok());
    }

    #[test]
    fn test_integers_infer_as_integer(values in prop::collection::vec(any::<i64>(), 1..50)) {
        let data: Vec<Vec<String>> = values.iter().map(|v| vec![v.to_string()]).collect();
        let columns = infer_columns(&header(&["n"]), &data).unwrap();
        prop_assert_eq!(columns[0].inferred_type, ColumnType::Integer);
        prop_assert!(!columns[0].nullable);
    }

    #[test]
    fn test_inference_is_deterministic(values in prop::collection::vec(".{0,6}", 0..30)) {
        let data: Vec<Vec<String>> = values.iter().map(|v| vec![v.clone()]).collect();
        let first = infer_columns(&header(&["x"]), &data).unwrap();
        let second = infer_columns(&header(&["x"]), &data).unwrap();
        prop_assert_eq!(first, second);
    }
}
