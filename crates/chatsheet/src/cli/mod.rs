//! CLI commands for ChatSheet.
//!
//! Every command builds a [`Session`] from config, environment and flags
//! (in increasing precedence), loads any `--csv` files, then runs.

pub mod chat;
pub mod error;
pub mod output;

use anyhow::{Context, Result};
use chatsheet::{
    mapper, ChatSheetConfig, MockTranslator, OpenAiTranslator, Session, SqlTranslator,
    TranslationError,
};
use std::path::{Path, PathBuf};
use tracing::info;

use self::error::HelpfulError;

/// `--csv path[:table]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvSpec {
    pub path: PathBuf,
    pub table: Option<String>,
}

impl CsvSpec {
    pub fn table_name(&self) -> String {
        self.table
            .clone()
            .unwrap_or_else(|| mapper::default_table_name(&self.path))
    }
}

/// Split `path[:table]`. A suffix containing a path separator belongs to the
/// path (`C:\data.csv`).
pub fn parse_csv_spec(value: &str) -> std::result::Result<CsvSpec, String> {
    if value.trim().is_empty() {
        return Err("CSV path is empty".to_string());
    }
    let spec = match value.rsplit_once(':') {
        Some((path, table))
            if !path.is_empty()
                && !table.is_empty()
                && !table.contains(['/', '\\']) =>
        {
            CsvSpec {
                path: PathBuf::from(path),
                table: Some(table.to_string()),
            }
        }
        _ => CsvSpec {
            path: PathBuf::from(value),
            table: None,
        },
    };
    Ok(spec)
}

/// Flags shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub db: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub api_key: Option<String>,
    pub allow_writes: bool,
    pub offline: bool,
    pub csv: Vec<CsvSpec>,
}

/// File config, then environment, then flags.
pub fn resolve_config(options: &GlobalOptions) -> Result<ChatSheetConfig> {
    let path = options
        .config
        .clone()
        .unwrap_or_else(chatsheet_logging::config_path);
    let mut config = ChatSheetConfig::load(&path)
        .with_context(|| format!("Failed to load config: {}", path.display()))?;
    config.apply_env();

    if let Some(db) = &options.db {
        config.database.path = Some(db.clone());
    }
    if let Some(key) = &options.api_key {
        config.llm.api_key = Some(key.clone());
    }
    if options.allow_writes {
        config.query.allow_writes = true;
    }
    Ok(config)
}

/// OpenAI translator, or the echo translator when offline. Without an API key
/// this fails if `required`, and falls back to echo otherwise.
fn build_translator(
    config: &ChatSheetConfig,
    offline: bool,
    required: bool,
) -> Result<Box<dyn SqlTranslator>> {
    if offline {
        return Ok(Box::new(MockTranslator::echo()));
    }
    match OpenAiTranslator::new(&config.llm) {
        Ok(translator) => Ok(Box::new(translator)),
        Err(TranslationError::NotConfigured(reason)) if !required => {
            info!(%reason, "translator not configured, reading questions as SQL");
            Ok(Box::new(MockTranslator::echo()))
        }
        Err(err) => Err(HelpfulError::from_error(&err.into()).into()),
    }
}

pub fn open_session(
    options: &GlobalOptions,
    config: &ChatSheetConfig,
    translator_required: bool,
) -> Result<Session> {
    let translator = build_translator(config, options.offline, translator_required)?;
    let mut session = Session::from_config(config, translator).map_err(HelpfulError::from)?;

    for spec in &options.csv {
        load_file(&mut session, &spec.path, &spec.table_name())?;
    }
    Ok(session)
}

fn load_file(session: &mut Session, path: &Path, table: &str) -> Result<()> {
    if !path.exists() {
        return Err(HelpfulError::file_not_found(path).into());
    }
    session
        .load_csv(table, path)
        .map_err(HelpfulError::from)
        .with_context(|| format!("Failed to load {} as '{}'", path.display(), table))?;
    Ok(())
}

pub fn load(
    options: &GlobalOptions,
    path: &Path,
    table: Option<String>,
    delimiter: Option<char>,
) -> Result<()> {
    let mut config = resolve_config(options)?;
    if let Some(delimiter) = delimiter {
        config.csv.delimiter = delimiter;
    }
    let mut session = open_session(options, &config, false)?;
    let table = table.unwrap_or_else(|| mapper::default_table_name(path));
    let previous = session.registry().get(&table).cloned();
    load_file(&mut session, path, &table)?;

    if let Some(schema) = session.registry().get(&table) {
        println!("{}", output::render_load(previous.as_ref(), schema));
    }
    Ok(())
}

pub fn schema(options: &GlobalOptions, json: bool) -> Result<()> {
    let config = resolve_config(options)?;
    let session = open_session(options, &config, false)?;
    if json {
        println!("{}", output::render_json(session.registry())?);
    } else {
        println!("{}", output::render_registry(session.registry()));
    }
    Ok(())
}

/// `--flag` / `--no-flag` pair: `None` leaves the config value in charge.
pub fn flag_override(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

pub fn ask(
    options: &GlobalOptions,
    question: &str,
    show_sql: bool,
    summary: Option<bool>,
    json: bool,
) -> Result<()> {
    let config = resolve_config(options)?;
    let session = open_session(options, &config, true)?;
    let result = session
        .ask(
            question,
            show_sql || config.query.show_sql,
            summary.unwrap_or(config.query.show_summary),
        )
        .map_err(HelpfulError::from)?;
    print_result(&result, json)
}

pub fn sql(
    options: &GlobalOptions,
    statement: &str,
    summary: Option<bool>,
    json: bool,
) -> Result<()> {
    let config = resolve_config(options)?;
    let session = open_session(options, &config, false)?;
    let result = session
        .run_sql(statement, summary.unwrap_or(config.query.show_summary))
        .map_err(HelpfulError::from)?;
    print_result(&result, json)
}

pub fn chat(options: &GlobalOptions) -> Result<()> {
    let config = resolve_config(options)?;
    let mut session = open_session(options, &config, false)?;
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    chat::run(
        &mut session,
        stdin.lock(),
        &mut stdout,
        chat::ChatOptions {
            show_sql: config.query.show_sql,
            show_summary: config.query.show_summary,
        },
    )
}

fn print_result(result: &chatsheet::QueryResult, json: bool) -> Result<()> {
    if json {
        println!("{}", output::render_json(result)?);
    } else {
        println!("{}", output::render_result(result));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_flags_override_config() {
        let config = ChatSheetConfig::default();
        assert!(config.query.show_summary);
        let effective = |on, off| flag_override(on, off).unwrap_or(config.query.show_summary);
        assert!(effective(false, false));
        assert!(!effective(false, true));
        assert!(effective(true, false));
        assert!(flag_override(true, false).unwrap_or(false));
    }

    #[test]
    fn test_parse_csv_spec() {
        assert_eq!(
            parse_csv_spec("data/people.csv:people").unwrap(),
            CsvSpec {
                path: PathBuf::from("data/people.csv"),
                table: Some("people".to_string())
            }
        );
        let plain = parse_csv_spec("data/Sales Q1.csv").unwrap();
        assert_eq!(plain.table, None);
        assert_eq!(plain.table_name(), "sales_q1");

        let windows = parse_csv_spec(r"C:\data\people.csv").unwrap();
        assert_eq!(windows.path, PathBuf::from(r"C:\data\people.csv"));
        assert!(windows.table.is_none());

        assert!(parse_csv_spec("  ").is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("config.toml");
        std::fs::write(&config_file, "[llm]\napi_key = \"from-file\"\n").unwrap();

        let options = GlobalOptions {
            config: Some(config_file),
            api_key: Some("from-flag".to_string()),
            allow_writes: true,
            db: Some(dir.path().join("x.duckdb")),
            ..GlobalOptions::default()
        };
        let config = resolve_config(&options).unwrap();
        assert_eq!(config.llm.api_key.as_deref(), Some("from-flag"));
        assert!(config.query.allow_writes);
        assert_eq!(config.database.path, Some(dir.path().join("x.duckdb")));
    }

    #[test]
    fn test_offline_session_loads_csv() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("people.csv");
        std::fs::write(&csv, "id,name\n1,Alice\n").unwrap();

        let options = GlobalOptions {
            offline: true,
            csv: vec![parse_csv_spec(&format!("{}:folks", csv.display())).unwrap()],
            ..GlobalOptions::default()
        };
        let session = open_session(&options, &ChatSheetConfig::default(), true).unwrap();
        assert!(session.registry().contains("folks"));
        assert_eq!(session.translator_name(), "echo");
    }
}
