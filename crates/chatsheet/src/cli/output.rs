//! Output formatting for CLI commands

use chatsheet::{QueryResult, SchemaChange, SchemaRegistry, TableSchema};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

/// Render a table with styled headers.
pub fn render_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for row in rows {
        table.add_row(row);
    }

    table.to_string()
}

pub fn render_table_schema(schema: &TableSchema) -> String {
    let rows = schema
        .columns()
        .iter()
        .map(|c| {
            vec![
                c.name.clone(),
                c.inferred_type.sql_type().to_string(),
                if c.nullable { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    format!(
        "Table: {}\n{}",
        schema.table_name(),
        render_table(&["column", "type", "nullable"], rows)
    )
}

/// Schema of a freshly loaded table, preceded by what changed when it
/// replaced `previous`.
pub fn render_load(previous: Option<&TableSchema>, schema: &TableSchema) -> String {
    let rendered = render_table_schema(schema);
    let Some(previous) = previous else {
        return rendered;
    };
    let change = SchemaChange::between(previous, schema);
    let warning = if change.is_breaking() {
        " Queries written against the old columns may fail."
    } else {
        ""
    };
    format!(
        "Replaced table '{}' ({}).{}\n{}",
        schema.table_name(),
        change,
        warning,
        rendered
    )
}

pub fn render_registry(registry: &SchemaRegistry) -> String {
    if registry.is_empty() {
        return "No tables loaded.".to_string();
    }
    registry
        .tables()
        .map(render_table_schema)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Result rows as a table, then the executed SQL and summary when present.
pub fn render_result(result: &QueryResult) -> String {
    let mut out = String::new();
    if let Some(sql) = &result.sql {
        out.push_str(&format!("SQL: {}\n", sql));
    }

    if result.columns.is_empty() {
        out.push_str("(no columns)");
    } else {
        let headers: Vec<&str> = result.columns.iter().map(String::as_str).collect();
        let rows = result
            .rows
            .iter()
            .map(|row| row.iter().map(|(_, v)| v.to_string()).collect())
            .collect();
        out.push_str(&render_table(&headers, rows));
        if result.rows.is_empty() {
            out.push_str("\n(no rows)");
        }
    }

    if let Some(summary) = &result.natural_language_summary {
        out.push_str(&format!("\n{}", summary));
    }
    out
}

pub fn render_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsheet::{ColumnProfile, ColumnType};
    use chatsheet_db::{DbRow, DbValue};

    #[test]
    fn test_render_result() {
        let columns = vec!["name".to_string()];
        let result = QueryResult {
            columns: columns.clone(),
            rows: vec![DbRow::new(columns, vec![DbValue::Text("Alice".into())])],
            natural_language_summary: Some("One person.".to_string()),
            sql: Some("SELECT name FROM people".to_string()),
        };
        let text = render_result(&result);
        assert!(text.starts_with("SQL: SELECT name FROM people\n"));
        assert!(text.contains("Alice"));
        assert!(text.ends_with("One person."));
    }

    #[test]
    fn test_render_schema() {
        let schema = TableSchema::new(
            "people",
            vec![ColumnProfile::new("id", ColumnType::Integer, false)],
        )
        .unwrap();
        let text = render_table_schema(&schema);
        assert!(text.starts_with("Table: people\n"));
        assert!(text.contains("BIGINT"));
        assert_eq!(render_registry(&SchemaRegistry::new()), "No tables loaded.");
    }

    #[test]
    fn test_render_load_reports_replacement() {
        let old = TableSchema::new(
            "people",
            vec![
                ColumnProfile::new("id", ColumnType::Integer, false),
                ColumnProfile::new("joined", ColumnType::DateTime, true),
            ],
        )
        .unwrap();
        let new = TableSchema::new(
            "people",
            vec![ColumnProfile::new("id", ColumnType::Text, false)],
        )
        .unwrap();

        assert!(render_load(None, &new).starts_with("Table: people\n"));
        let text = render_load(Some(&old), &new);
        assert!(text.starts_with(
            "Replaced table 'people' (removed: joined; retyped: id integer -> text). \
             Queries written against the old columns may fail.\n"
        ));
        let unchanged = render_load(Some(&old), &old);
        assert!(unchanged.starts_with("Replaced table 'people' (no column changes).\n"));
    }

    #[test]
    fn test_result_json() {
        let columns = vec!["n".to_string()];
        let result = QueryResult {
            columns: columns.clone(),
            rows: vec![DbRow::new(columns, vec![DbValue::Integer(2)])],
            natural_language_summary: None,
            sql: None,
        };
        let json: serde_json::Value = serde_json::from_str(&render_json(&result).unwrap()).unwrap();
        assert_eq!(json["rows"][0]["n"], 2);
        assert!(json["natural_language_summary"].is_null());
        assert!(json.get("sql").is_none());
    }
}
