//! ChatSheet: load CSV files into DuckDB tables and query them in natural
//! language.
//!
//! # Modules
//!
//! - [`mapper`]: CSV reading and transactional table loads
//! - [`translator`]: question to SQL (`SqlTranslator`, OpenAI and mock)
//! - [`query`]: the per-query pipeline (translate, validate, execute, summarize)
//! - [`summary`]: template substitution over query results
//! - [`session`]: caller-facing API owning the database and registry
//! - [`config`]: `config.toml` and environment overrides
//!
//! ```rust,ignore
//! use chatsheet::{MockTranslator, Session};
//!
//! let mock = MockTranslator::new();
//! mock.queue_sql("SELECT COUNT(*) FROM people");
//! let mut session = Session::in_memory(Box::new(mock))?;
//! session.load_csv("people", Path::new("people.csv"))?;
//! let result = session.ask("How many people are there?", false, true)?;
//! ```

pub mod config;
pub mod error;
pub mod mapper;
pub mod query;
pub mod session;
pub mod summary;
pub mod translator;

pub use config::{ChatSheetConfig, ConfigError, LlmConfig};
pub use error::{Error, Result};
pub use query::{QueryOptions, QueryOrchestrator, QueryResult, QueryState};
pub use session::Session;
pub use translator::{
    MockTranslator, OpenAiTranslator, OperationHint, SqlTranslator, Translation,
    TranslationError, TranslationRequest,
};

pub use chatsheet_schema::{
    ColumnProfile, ColumnType, SchemaChange, SchemaRegistry, TableSchema, TypeChange,
};
pub use chatsheet_sql::{StatementKind, ValidationResult, ValidatorConfig};
