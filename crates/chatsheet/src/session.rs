//! Caller-facing session: one database, one registry, one translator.

use chatsheet_db::{quote_ident, DbConnection};
use chatsheet_schema::{SchemaRegistry, TableSchema};
use chatsheet_sql::{Validator, ValidatorConfig};
use std::path::Path;
use tracing::info;

use crate::config::ChatSheetConfig;
use crate::error::Result;
use crate::mapper;
use crate::query::{QueryOptions, QueryOrchestrator, QueryResult};
use crate::translator::SqlTranslator;

/// Loading takes `&mut self` and querying `&self`, so a query never sees a
/// table whose schema and data are half replaced. Share across threads
/// behind a `Mutex`.
pub struct Session {
    db: DbConnection,
    registry: SchemaRegistry,
    validator: Validator,
    translator: Box<dyn SqlTranslator>,
    sample_rows: usize,
    delimiter: u8,
}

impl Session {
    fn with_db(db: DbConnection, registry: SchemaRegistry, translator: Box<dyn SqlTranslator>) -> Self {
        Self {
            db,
            registry,
            validator: Validator::read_only(),
            translator,
            sample_rows: 3,
            delimiter: b',',
        }
    }

    /// Session over a fresh in-memory database.
    pub fn in_memory(translator: Box<dyn SqlTranslator>) -> Result<Self> {
        let db = DbConnection::open_in_memory()?;
        Ok(Self::with_db(db, SchemaRegistry::new(), translator))
    }

    /// Session over a DuckDB file, locked for this process. Tables already
    /// in the file are registered from the catalog.
    pub fn open(path: &Path, translator: Box<dyn SqlTranslator>) -> Result<Self> {
        let db = DbConnection::open(path)?;
        let registry = mapper::rebuild_registry(&db)?;
        if !registry.is_empty() {
            info!(path = %path.display(), tables = registry.len(), "re-attached existing tables");
        }
        Ok(Self::with_db(db, registry, translator))
    }

    /// Session configured from `config`: database path, allowed statement
    /// kinds, sample rows and delimiter.
    pub fn from_config(config: &ChatSheetConfig, translator: Box<dyn SqlTranslator>) -> Result<Self> {
        let session = match &config.database.path {
            Some(path) => Self::open(path, translator)?,
            None => Self::in_memory(translator)?,
        };
        Ok(session
            .with_validator_config(&config.validator_config())
            .with_sample_rows(config.llm.sample_rows)
            .with_delimiter(config.delimiter_byte()?))
    }

    pub fn with_validator_config(mut self, config: &ValidatorConfig) -> Self {
        self.validator = Validator::new(config);
        self
    }

    pub fn with_sample_rows(mut self, sample_rows: usize) -> Self {
        self.sample_rows = sample_rows;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Load a CSV file as `table_name`, replacing any table of that name.
    pub fn load_csv(&mut self, table_name: &str, path: &Path) -> Result<TableSchema> {
        mapper::load_csv_file(&self.db, &mut self.registry, table_name, path, self.delimiter)
    }

    /// Load already-split rows as `table_name`.
    pub fn load_rows(
        &mut self,
        table_name: &str,
        header: &[String],
        rows: &[Vec<String>],
    ) -> Result<TableSchema> {
        mapper::load(&self.db, &mut self.registry, table_name, header, rows)
    }

    /// Snapshot of the registry.
    pub fn get_schema(&self) -> SchemaRegistry {
        self.registry.clone()
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn ask(&self, question: &str, show_sql: bool, show_summary: bool) -> Result<QueryResult> {
        self.orchestrator().ask(
            question,
            QueryOptions {
                show_sql,
                show_summary,
            },
        )
    }

    /// Validate and run SQL typed by the user.
    pub fn run_sql(&self, sql: &str, show_summary: bool) -> Result<QueryResult> {
        self.orchestrator().run_sql(
            sql,
            QueryOptions {
                show_sql: true,
                show_summary,
            },
        )
    }

    /// Schema description as the translator would receive it.
    pub fn describe_schema(&self) -> String {
        self.orchestrator().schema_description()
    }

    pub fn translator_name(&self) -> &str {
        self.translator.name()
    }

    pub fn database(&self) -> &DbConnection {
        &self.db
    }

    /// Drop every registered table and clear the registry.
    pub fn reset(&mut self) -> Result<()> {
        let names: Vec<String> = self
            .registry
            .table_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        self.db.transaction(|tx| {
            for name in &names {
                tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)))?;
            }
            Ok(())
        })?;
        self.registry.clear();
        info!(tables = names.len(), "session reset");
        Ok(())
    }

    fn orchestrator(&self) -> QueryOrchestrator<'_> {
        QueryOrchestrator::new(
            &self.db,
            &self.registry,
            &self.validator,
            self.translator.as_ref(),
        )
        .with_sample_rows(self.sample_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::MockTranslator;

    #[test]
    fn test_reset_drops_tables() {
        let mut session = Session::in_memory(Box::new(MockTranslator::new())).unwrap();
        session
            .load_rows("people", &["id".to_string()], &[vec!["1".to_string()]])
            .unwrap();
        assert_eq!(session.get_schema().len(), 1);

        session.reset().unwrap();
        assert!(session.get_schema().is_empty());
        assert!(mapper::list_tables(session.database()).unwrap().is_empty());
    }

    #[test]
    fn test_schema_snapshot_is_detached() {
        let mut session = Session::in_memory(Box::new(MockTranslator::new())).unwrap();
        session
            .load_rows("people", &["id".to_string()], &[vec!["1".to_string()]])
            .unwrap();
        let snapshot = session.get_schema();
        session.reset().unwrap();
        assert!(snapshot.contains("people"));
    }
}
