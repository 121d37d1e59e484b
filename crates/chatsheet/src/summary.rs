//! Natural-language summaries by template substitution.
//!
//! Templates come from the translator (or a built-in default) and use
//! `{key}` placeholders. Substitution never fails: unknown keys render as
//! `[unknown]`.

use chatsheet_db::QueryOutput;
use chatsheet_sql::StatementKind;
use std::collections::HashMap;
use tracing::warn;

pub const UNKNOWN_PLACEHOLDER: &str = "[unknown]";
pub const ROWS_AFFECTED: &str = "rows_affected";

const DEFAULT_EMPTY: &str = "{row_count} row(s) returned.";
const DEFAULT_ROWS: &str = "{row_count} row(s) returned: {results}";
const DEFAULT_WRITE: &str = "{rows_affected} row(s) affected.";

/// Substitution values for `output`.
///
/// Each column maps to the values of all rows joined with `", "`.
/// `results` lists every row as `col: value` pairs, rows joined with `"; "`.
/// `row_count` and `count` are the number of rows. A result column with one
/// of these names keeps its own values.
pub fn summary_values(output: &QueryOutput) -> HashMap<String, String> {
    let mut values = HashMap::new();

    for (index, column) in output.columns.iter().enumerate() {
        let joined = output
            .rows
            .iter()
            .filter_map(|row| row.get_raw(index))
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        values.insert(column.to_lowercase(), joined);
    }

    let results = output
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|(column, value)| format!("{}: {}", column, value))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect::<Vec<_>>()
        .join("; ");
    let count = output.rows.len().to_string();
    for (key, value) in [("results", results), ("row_count", count.clone()), ("count", count)] {
        values.entry(key.to_string()).or_insert(value);
    }
    values
}

/// Replace `{key}` placeholders in `template`.
///
/// `{{key}}` reads as `{key}`. A placeholder may carry a format suffix after
/// `:` (`{total:.2f}`); only the key is used. Keys match case-insensitively.
/// An unclosed `{` is kept literally.
pub fn render(template: &str, values: &HashMap<String, String>) -> String {
    let template = template.replace("{{", "{").replace("}}", "}");
    let mut out = String::with_capacity(template.len());
    let mut rest = template.as_str();

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };

        let placeholder = &after[..close];
        let key = placeholder
            .split(':')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        match values.get(&key) {
            Some(value) => out.push_str(value),
            None => {
                warn!(placeholder = %placeholder, "summary template references unknown key");
                out.push_str(UNKNOWN_PLACEHOLDER);
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Summary for `output`, using `template` or a default for `kind`.
pub fn summarize(template: Option<&str>, output: &QueryOutput, kind: StatementKind) -> String {
    let template = template.unwrap_or_else(|| default_template(output, kind));
    render(template, &summary_values(output))
}

fn default_template(output: &QueryOutput, kind: StatementKind) -> &'static str {
    if kind.is_write() {
        DEFAULT_WRITE
    } else if output.rows.is_empty() {
        DEFAULT_EMPTY
    } else {
        DEFAULT_ROWS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsheet_db::{DbRow, DbValue};

    fn people() -> QueryOutput {
        let columns = vec!["id".to_string(), "name".to_string()];
        QueryOutput {
            columns: columns.clone(),
            rows: vec![
                DbRow::new(
                    columns.clone(),
                    vec![DbValue::Integer(1), DbValue::Text("Alice".into())],
                ),
                DbRow::new(columns, vec![DbValue::Integer(2), DbValue::Null]),
            ],
        }
    }

    #[test]
    fn test_values() {
        let values = summary_values(&people());
        assert_eq!(values["id"], "1, 2");
        assert_eq!(values["name"], "Alice, NULL");
        assert_eq!(values["results"], "id: 1, name: Alice; id: 2, name: NULL");
        assert_eq!(values["row_count"], "2");
        assert_eq!(values["count"], "2");
    }

    #[test]
    fn test_render_placeholders() {
        let values = summary_values(&people());
        assert_eq!(
            render("{row_count} people: {{name}} (ids {ID})", &values),
            "2 people: Alice, NULL (ids 1, 2)"
        );
        assert_eq!(render("{total:.2f} spent", &values), "[unknown] spent");
        assert_eq!(render("open { brace", &values), "open { brace");
        assert_eq!(render("no placeholders", &values), "no placeholders");
    }

    #[test]
    fn test_default_templates() {
        assert_eq!(
            summarize(None, &people(), StatementKind::Select),
            "2 row(s) returned: id: 1, name: Alice; id: 2, name: NULL"
        );
        let empty = QueryOutput {
            columns: vec!["id".to_string()],
            rows: vec![],
        };
        assert_eq!(summarize(None, &empty, StatementKind::Select), "0 row(s) returned.");

        let columns = vec![ROWS_AFFECTED.to_string()];
        let write = QueryOutput {
            columns: columns.clone(),
            rows: vec![DbRow::new(columns, vec![DbValue::Integer(3)])],
        };
        assert_eq!(summarize(None, &write, StatementKind::Delete), "3 row(s) affected.");
    }

    #[test]
    fn test_model_template_wins() {
        assert_eq!(
            summarize(Some("There are {count} people."), &people(), StatementKind::Select),
            "There are 2 people."
        );
    }
}
