//! Parse a model reply into SQL and a summary template.

use super::{Translation, TranslationError};

const SQL_MARKERS: &[&str] = &["SQL Query:", "SQL:"];
const TEMPLATE_MARKERS: &[&str] = &["TEMPLATE:", "Template:"];
const SQL_LEADERS: &[&str] = &["SELECT", "WITH", "INSERT", "UPDATE", "DELETE", "VALUES", "FROM"];

/// Split `text` into SQL and an optional template.
///
/// Looks for `SQL:` and `TEMPLATE:` markers (either order). Without a SQL
/// marker the whole reply is taken as SQL when it starts with a statement
/// keyword. Code fences and leading list numbering are stripped.
pub fn parse_response(text: &str) -> Result<Translation, TranslationError> {
    let sql_at = find_marker(text, SQL_MARKERS);
    let template_at = find_marker(text, TEMPLATE_MARKERS);

    let (sql, template) = match (sql_at, template_at) {
        (Some((sql_start, sql_len)), Some((tpl_start, tpl_len))) => {
            let sql_body = sql_start + sql_len;
            let tpl_body = tpl_start + tpl_len;
            if sql_start < tpl_start {
                (&text[sql_body..tpl_start], Some(&text[tpl_body..]))
            } else {
                (&text[sql_body..], Some(&text[tpl_body..sql_start]))
            }
        }
        (Some((start, len)), None) => (&text[start + len..], None),
        (None, Some((tpl_start, tpl_len))) => {
            (&text[..tpl_start], Some(&text[tpl_start + tpl_len..]))
        }
        (None, None) => (text, None),
    };

    let sql = clean(sql);
    if sql.is_empty() {
        return Err(TranslationError::InvalidResponse(
            "response contains no SQL".to_string(),
        ));
    }
    if sql_at.is_none() && !starts_with_statement(&sql) {
        return Err(TranslationError::InvalidResponse(format!(
            "response is not SQL: {}",
            preview(&sql)
        )));
    }

    let template = template.map(clean).filter(|t| !t.is_empty());
    Ok(Translation { sql, template })
}

/// Earliest occurrence of any marker, as `(offset, marker length)`.
fn find_marker(text: &str, markers: &[&str]) -> Option<(usize, usize)> {
    markers
        .iter()
        .filter_map(|m| text.find(m).map(|at| (at, m.len())))
        .min_by_key(|(at, len)| (*at, std::cmp::Reverse(*len)))
}

fn clean(section: &str) -> String {
    let lines: Vec<&str> = section
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("```"))
        .map(strip_numbering)
        .collect();
    lines.join("\n").trim().to_string()
}

/// `"2. SELECT ..."` -> `"SELECT ..."`.
fn strip_numbering(line: &str) -> &str {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    let rest = &line[digits..];
    match rest.strip_prefix('.') {
        Some(after) if digits > 0 && (after.is_empty() || after.starts_with(' ')) => {
            after.trim_start()
        }
        _ => line,
    }
}

fn starts_with_statement(sql: &str) -> bool {
    let first = sql
        .split(|c: char| c.is_whitespace() || c == '(')
        .find(|w| !w.is_empty())
        .unwrap_or("");
    SQL_LEADERS
        .iter()
        .any(|leader| first.eq_ignore_ascii_case(leader))
}

fn preview(text: &str) -> String {
    const MAX: usize = 60;
    match text.char_indices().nth(MAX) {
        Some((at, _)) => format!("{}...", &text[..at]),
        None => text.to_string(),
    }
}
