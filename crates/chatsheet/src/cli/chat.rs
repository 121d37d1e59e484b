//! Interactive loop: `exit`, `schema`, `load <csv> [table]`, `sql <statement>`,
//! `reset`, `help`; anything else is a question.

use anyhow::Result;
use chatsheet::{mapper, Session};
use std::io::{BufRead, Write};
use std::path::Path;

use super::error::HelpfulError;
use super::output::{render_load, render_registry, render_result};

const HELP: &str = "Commands:
  schema                 show loaded tables
  load <csv> [table]     load a CSV file (table defaults to the file name)
  sql <statement>        run SQL directly (validated like generated SQL)
  reset                  drop every loaded table
  help                   show this message
  exit                   leave
Anything else is asked as a question.";

#[derive(Debug, Clone, Copy)]
pub struct ChatOptions {
    pub show_sql: bool,
    pub show_summary: bool,
}

enum Line<'a> {
    Exit,
    Help,
    Schema,
    Reset,
    Load { path: &'a str, table: Option<&'a str> },
    Sql(&'a str),
    Question(&'a str),
}

fn parse_line(line: &str) -> Option<Line<'_>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };
    let parsed = match head.to_ascii_lowercase().as_str() {
        "exit" | "quit" if rest.is_empty() => Line::Exit,
        "help" if rest.is_empty() => Line::Help,
        "schema" if rest.is_empty() => Line::Schema,
        "reset" if rest.is_empty() => Line::Reset,
        "load" if !rest.is_empty() => {
            let mut parts = rest.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(path), table) => Line::Load { path, table },
                (None, _) => Line::Question(line),
            }
        }
        "sql" if !rest.is_empty() => Line::Sql(rest),
        _ => Line::Question(line),
    };
    Some(parsed)
}

/// Read commands from `input` until `exit` or end of input. Errors are
/// printed and the loop continues.
pub fn run<R: BufRead, W: Write>(
    session: &mut Session,
    input: R,
    out: &mut W,
    options: ChatOptions,
) -> Result<()> {
    writeln!(
        out,
        "ChatSheet ({} translator). Type 'help' for commands, 'exit' to quit.",
        session.translator_name()
    )?;

    for line in input.lines() {
        let line = line?;
        let Some(command) = parse_line(&line) else {
            continue;
        };

        let reply = match command {
            Line::Exit => break,
            Line::Help => Ok(HELP.to_string()),
            Line::Schema => Ok(render_registry(session.registry())),
            Line::Reset => session.reset().map(|()| "All tables dropped.".to_string()),
            Line::Load { path, table } => {
                let path = Path::new(path);
                let table = table
                    .map(str::to_string)
                    .unwrap_or_else(|| mapper::default_table_name(path));
                let previous = session.registry().get(&table).cloned();
                session
                    .load_csv(&table, path)
                    .map(|schema| render_load(previous.as_ref(), &schema))
            }
            Line::Sql(sql) => session
                .run_sql(sql, options.show_summary)
                .map(|result| render_result(&result)),
            Line::Question(question) => session
                .ask(question, options.show_sql, options.show_summary)
                .map(|result| render_result(&result)),
        };

        match reply {
            Ok(text) => writeln!(out, "{}", text)?,
            Err(err) => write!(out, "{}", HelpfulError::from_error(&err))?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsheet::MockTranslator;
    use std::io::Cursor;

    #[test]
    fn test_parse_line() {
        assert!(parse_line("   ").is_none());
        assert!(matches!(parse_line("EXIT"), Some(Line::Exit)));
        assert!(matches!(
            parse_line("load data/people.csv people"),
            Some(Line::Load {
                path: "data/people.csv",
                table: Some("people")
            })
        ));
        assert!(matches!(parse_line("sql SELECT 1"), Some(Line::Sql("SELECT 1"))));
        assert!(matches!(
            parse_line("schema of the orders table?"),
            Some(Line::Question(_))
        ));
    }

    #[test]
    fn test_session_loop() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("people.csv");
        std::fs::write(&csv, "id,name\n1,Alice\n2,Bob\n").unwrap();

        let mut session = Session::in_memory(Box::new(MockTranslator::echo())).unwrap();
        let script = format!(
            "load {}\nschema\nSELECT COUNT(*) AS n FROM people\nsql SELECT * FROM ghosts\nexit\nschema\n",
            csv.display()
        );
        let mut out = Vec::new();
        run(
            &mut session,
            Cursor::new(script),
            &mut out,
            ChatOptions {
                show_sql: false,
                show_summary: true,
            },
        )
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Table: people"));
        assert!(text.contains("1 row(s) returned: n: 2"));
        assert!(text.contains("table 'ghosts' does not exist"));
        assert_eq!(text.matches("Table: people").count(), 2);
    }

    #[test]
    fn test_reload_reports_schema_change() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.csv");
        let second = dir.path().join("second.csv");
        std::fs::write(&first, "id,age\n1,30\n").unwrap();
        std::fs::write(&second, "id,email\nx1,a@example.com\n").unwrap();

        let mut session = Session::in_memory(Box::new(MockTranslator::echo())).unwrap();
        let script = format!(
            "load {} people\nload {} people\n",
            first.display(),
            second.display()
        );
        let mut out = Vec::new();
        run(
            &mut session,
            Cursor::new(script),
            &mut out,
            ChatOptions {
                show_sql: false,
                show_summary: false,
            },
        )
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("Replaced table").count(), 1);
        assert!(text.contains("removed: age; retyped: id integer -> text; added: email"));
        assert!(session.registry().get("people").unwrap().has_column("email"));
    }
}
