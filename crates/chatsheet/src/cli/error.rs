//! Error presentation for CLI commands.

use chatsheet::{Error, TranslationError};
use std::fmt;
use std::path::Path;

/// A failure as shown to a person: what happened, optionally why, and
/// what to try.
#[derive(Debug)]
pub struct HelpfulError {
    pub message: String,
    pub context: Option<String>,
    pub suggestions: Vec<String>,
}

/// Context line and suggestions for a library error, if it has any.
fn hints(err: &Error) -> (Option<&'static str>, &'static [&'static str]) {
    match err {
        Error::InvalidIdentifier(_) => (
            Some("Table names must be letters, digits and underscores, not starting with a digit"),
            &["Pass a different name with --table"],
        ),
        Error::DataCoercion(_) => (
            Some("Nothing was loaded; the previous table (if any) is unchanged"),
            &["Fix the cell named above, or check the delimiter with --delimiter"],
        ),
        Error::SchemaInference(_) => (
            None,
            &["Check that the first row is a header with unique, non-empty names"],
        ),
        Error::InvalidQuery(_) => (
            Some("The statement was rejected before it reached the database"),
            &["Run `chatsheet schema` to see the tables and columns available"],
        ),
        Error::Translation(TranslationError::NotConfigured(_)) => (
            None,
            &[
                "Set OPENAI_API_KEY or pass --api-key",
                "Use --offline and type SQL directly",
            ],
        ),
        Error::Translation(TranslationError::Timeout(_)) => {
            (None, &["Raise llm.timeout_seconds in config.toml"])
        }
        Error::Database(chatsheet_db::BackendError::Locked(_)) => (
            Some("Another chatsheet process has this database open"),
            &["Close the other process or use a different --db"],
        ),
        _ => (None, &[]),
    }
}

impl HelpfulError {
    pub fn from_error(err: &Error) -> Self {
        let (context, suggestions) = hints(err);
        Self {
            message: err.to_string(),
            context: context.map(str::to_string),
            suggestions: suggestions.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn file_not_found(path: &Path) -> Self {
        Self {
            message: format!("File not found: {}", path.display()),
            context: None,
            suggestions: vec![format!("Check the path: ls -la {}", path.display())],
        }
    }
}

/// ```text
/// ERROR: <message>
/// CONTEXT: <context>
///
///   TRY: <suggestion>
/// ```
impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;
        if let Some(context) = &self.context {
            writeln!(f, "CONTEXT: {context}")?;
        }
        if !self.suggestions.is_empty() {
            writeln!(f)?;
        }
        self.suggestions
            .iter()
            .try_for_each(|s| writeln!(f, "  TRY: {s}"))
    }
}

impl std::error::Error for HelpfulError {}

impl From<Error> for HelpfulError {
    fn from(err: Error) -> Self {
        Self::from_error(&err)
    }
}

/// Print an error as `{"error": ...}` for `--json` callers.
pub fn print_json_error(err: &anyhow::Error) {
    let payload = serde_json::json!({ "error": format!("{:#}", err) });
    println!("{}", payload);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_query_has_hint() {
        let err = HelpfulError::from_error(&Error::InvalidQuery(
            "table 'ghosts' does not exist".to_string(),
        ));
        let text = err.to_string();
        assert!(text.starts_with("ERROR: Invalid query: table 'ghosts' does not exist"));
        assert!(text.contains("chatsheet schema"));
    }

    #[test]
    fn test_plain_error_has_no_suggestions() {
        let err = HelpfulError::from_error(&Error::Execution("boom".to_string()));
        assert!(err.suggestions.is_empty());
        assert_eq!(err.to_string(), "ERROR: Query execution failed: boom\n");
    }
}
