//! Configuration parsing
//!
//! Reads settings from `~/.chatsheet/config.toml` (see
//! [`chatsheet_logging::config_path`]). Every section and key is optional.
//! Environment variables override the file and CLI flags override both.

use chatsheet_sql::ValidatorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Error type for config operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DB_PATH_ENV: &str = "CHATSHEET_DB";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatSheetConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub csv: CsvConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// DuckDB file; in-memory when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Translator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    /// OpenAI-compatible API root, without `/chat/completions`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Rows per table shown to the model alongside the schema
    #[serde(default = "default_sample_rows")]
    pub sample_rows: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
            sample_rows: default_sample_rows(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default)]
    pub allow_writes: bool,

    #[serde(default)]
    pub show_sql: bool,

    #[serde(default = "default_show_summary")]
    pub show_summary: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            allow_writes: false,
            show_sql: false,
            show_summary: default_show_summary(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
        }
    }
}

fn default_base_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_model() -> String { "gpt-3.5-turbo".to_string() }
fn default_temperature() -> f32 { 0.3 }
fn default_timeout() -> u64 { 30 }
fn default_sample_rows() -> usize { 3 }
fn default_show_summary() -> bool { true }
fn default_delimiter() -> char { ',' }

impl ChatSheetConfig {
    /// Load from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.check()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (environment variable name -> value).
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.llm.api_key = Some(key);
        }
        if let Some(path) = lookup(DB_PATH_ENV).filter(|v| !v.trim().is_empty()) {
            self.database.path = Some(PathBuf::from(path));
        }
    }

    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            allow_writes: self.query.allow_writes,
        }
    }

    /// CSV delimiter as a byte.
    pub fn delimiter_byte(&self) -> Result<u8> {
        delimiter_byte(self.csv.delimiter)
    }

    fn check(&self) -> Result<()> {
        delimiter_byte(self.csv.delimiter)?;
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Invalid(format!(
                "llm.temperature must be between 0 and 2, got {}",
                self.llm.temperature
            )));
        }
        Ok(())
    }
}

pub fn delimiter_byte(delimiter: char) -> Result<u8> {
    if delimiter.is_ascii() && delimiter != '"' && delimiter != '\n' && delimiter != '\r' {
        Ok(delimiter as u8)
    } else {
        Err(ConfigError::Invalid(format!(
            "CSV delimiter must be a single ASCII character other than a quote or newline, got {:?}",
            delimiter
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ChatSheetConfig::default();
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert_eq!(config.llm.temperature, 0.3);
        assert_eq!(config.llm.sample_rows, 3);
        assert!(!config.query.allow_writes);
        assert!(config.query.show_summary);
        assert_eq!(config.csv.delimiter, ',');
        assert!(config.database.path.is_none());
    }

    #[test]
    fn test_partial_file() {
        let config = ChatSheetConfig::from_toml_str(
            r#"
[llm]
model = "gpt-4o-mini"

[query]
allow_writes = true

[csv]
delimiter = ";"
"#,
        )
        .unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
        assert!(config.validator_config().allow_writes);
        assert_eq!(config.delimiter_byte().unwrap(), b';');
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            ChatSheetConfig::from_toml_str("[csv]\ndelimiter = \"é\""),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ChatSheetConfig::from_toml_str("[llm]\ntemperature = 5.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ChatSheetConfig::from_toml_str("[llm\n"),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = ChatSheetConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ChatSheetConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> =
            HashMap::from([(API_KEY_ENV, "sk-env"), (DB_PATH_ENV, "/tmp/x.duckdb")]);
        let mut config = ChatSheetConfig::default();
        config.apply_env_from(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.database.path, Some(PathBuf::from("/tmp/x.duckdb")));
    }
}
