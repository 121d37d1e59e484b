//! Prompt construction.

use chatsheet_db::{quote_ident, QueryOutput};
use chatsheet_schema::{is_reserved_word, SchemaRegistry};
use chatsheet_sql::parser::is_keyword;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::{OperationHint, TranslationRequest};

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that generates DuckDB SQL queries \
and corresponding result templates. Ensure your templates only use column names that appear \
in your SQL query.";

/// Render every registered table: columns with SQL type and nullability,
/// then the sample rows found in `samples` (keyed by lower-cased table name).
pub fn describe_schema(
    registry: &SchemaRegistry,
    samples: &BTreeMap<String, QueryOutput>,
) -> String {
    if registry.is_empty() {
        return "No tables loaded.".to_string();
    }

    let mut out = String::new();
    for schema in registry.tables() {
        let _ = writeln!(out, "Table: {}", schema.table_name());
        out.push_str("Columns:\n");
        for column in schema.columns() {
            let _ = writeln!(
                out,
                "  - {} ({}, {})",
                column_ident(&column.name),
                column.inferred_type.sql_type(),
                if column.nullable { "NULL" } else { "NOT NULL" }
            );
        }

        match samples.get(&schema.table_name().to_lowercase()) {
            Some(sample) if !sample.rows.is_empty() => {
                out.push_str("Sample data:\n");
                let _ = writeln!(out, "  {}", sample.columns.join(" | "));
                for row in &sample.rows {
                    let cells: Vec<String> = row.iter().map(|(_, v)| v.to_string()).collect();
                    let _ = writeln!(out, "  {}", cells.join(" | "));
                }
            }
            _ => out.push_str("Sample data: none\n"),
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

/// Column name the way SQL must spell it: bare when it is a plain
/// identifier, double-quoted when it has spaces or symbols or is a keyword.
fn column_ident(name: &str) -> String {
    let plain = name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !is_reserved_word(name)
        && !is_keyword(&name.to_ascii_uppercase());
    if plain {
        name.to_string()
    } else {
        quote_ident(name)
    }
}

fn examples(hint: OperationHint) -> &'static str {
    match hint {
        OperationHint::Select => {
            "Example 1: Generic Data Retrieval
SQL: SELECT * FROM items WHERE type = 'example';
TEMPLATE: There are {row_count} items of type 'example'. For instance, the item with id {id} is named {name}.

Example 2: Count Operation
SQL: SELECT COUNT(*) AS total_items FROM items;
TEMPLATE: There are {total_items} items in the table."
        }
        OperationHint::Insert => {
            "Example: Data Insertion
SQL: INSERT INTO items (name, value) VALUES ('Sample Item', 100);
TEMPLATE: {rows_affected} item(s) added."
        }
        OperationHint::Update => {
            "Example: Data Update
SQL: UPDATE items SET value = value + 10 WHERE id = 1;
TEMPLATE: {rows_affected} item(s) updated."
        }
        OperationHint::Delete => {
            "Example: Data Deletion
SQL: DELETE FROM items WHERE id = 1;
TEMPLATE: {rows_affected} item(s) deleted."
        }
        OperationHint::Other => {
            "Example: Join Operation
SQL: SELECT a.col1, b.col2 FROM table_a a JOIN table_b b ON a.id = b.a_id;
TEMPLATE: The record for {col1} has detail {col2}."
        }
    }
}

/// User prompt for one request.
pub fn build_prompt(request: &TranslationRequest) -> String {
    format!(
        "Given the following DuckDB database schema:

{schema}

For the following question: \"{question}\"

Using the examples below as guidance, generate two parts in your response:
SQL: a single SQL statement that performs the requested operation.
TEMPLATE: a natural language template that describes the result.
Ensure that:
- The SQL uses table and column names exactly as they appear in the schema, keeping any double quotes.
- The SQL is one statement only and does not read files or change table definitions.
- The template uses placeholders in single curly braces (e.g., {{name}}) that exactly match the columns returned by your SQL.
- The template may also use {{results}} (every row as 'col: value' pairs), {{row_count}} and {{count}}.
- Do not include any additional commentary or numbering in your response.

{examples}",
        schema = request.schema_description,
        question = request.question,
        examples = examples(request.operation_hint),
    )
}
