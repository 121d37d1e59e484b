//! Question to answer pipeline.
//!
//! Each query walks `Received -> Translated -> Validated -> Executed ->
//! Summarized` and stops at the first failure. Translator output is
//! untrusted: only the validator's normalized SQL ever reaches the database.

use chatsheet_db::{quote_ident, DbConnection, DbRow, DbValue, QueryOutput};
use chatsheet_schema::SchemaRegistry;
use chatsheet_sql::{StatementKind, Validator};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::summary::{summarize, ROWS_AFFECTED};
use crate::translator::{describe_schema, SqlTranslator, TranslationError, TranslationRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Received,
    Translated,
    Validated,
    Executed,
    Summarized,
}

impl QueryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryState::Received => "received",
            QueryState::Translated => "translated",
            QueryState::Validated => "validated",
            QueryState::Executed => "executed",
            QueryState::Summarized => "summarized",
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// Return the executed SQL in [`QueryResult::sql`].
    pub show_sql: bool,
    pub show_summary: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            show_sql: false,
            show_summary: true,
        }
    }
}

/// Rows and columns of one executed statement.
///
/// A write reports a single `rows_affected` column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<DbRow>,
    pub natural_language_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
}

/// Runs questions and user SQL against one database and registry.
pub struct QueryOrchestrator<'a> {
    db: &'a DbConnection,
    registry: &'a SchemaRegistry,
    validator: &'a Validator,
    translator: &'a dyn SqlTranslator,
    sample_rows: usize,
}

impl<'a> QueryOrchestrator<'a> {
    pub fn new(
        db: &'a DbConnection,
        registry: &'a SchemaRegistry,
        validator: &'a Validator,
        translator: &'a dyn SqlTranslator,
    ) -> Self {
        Self {
            db,
            registry,
            validator,
            translator,
            sample_rows: 3,
        }
    }

    /// Rows per table included in the schema description (0 disables).
    pub fn with_sample_rows(mut self, sample_rows: usize) -> Self {
        self.sample_rows = sample_rows;
        self
    }

    /// Answer a natural-language question.
    pub fn ask(&self, question: &str, options: QueryOptions) -> Result<QueryResult> {
        let query_id = Uuid::new_v4();
        let start = Instant::now();
        let question = question.trim();
        debug!(%query_id, state = %QueryState::Received, tables = self.registry.len());
        if question.is_empty() {
            return Err(TranslationError::EmptyQuestion.into());
        }

        let request = TranslationRequest::new(question, self.schema_description());
        let translation = self.translator.translate(&request).map_err(|e| {
            debug!(%query_id, translator = self.translator.name(), error = %e, "translation failed");
            Error::from(e)
        })?;
        debug!(
            %query_id,
            state = %QueryState::Translated,
            translator = self.translator.name(),
            hint = %request.operation_hint,
            has_template = translation.template.is_some()
        );

        let result = self.finish(
            query_id,
            &translation.sql,
            translation.template.as_deref(),
            options,
        )?;
        info!(
            %query_id,
            rows = result.rows.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "answered question"
        );
        Ok(result)
    }

    /// Validate and run SQL typed by the user. No translation happens, so the
    /// summary (when requested) uses the default template.
    pub fn run_sql(&self, sql: &str, options: QueryOptions) -> Result<QueryResult> {
        let query_id = Uuid::new_v4();
        debug!(%query_id, state = %QueryState::Received, "user sql");
        self.finish(query_id, sql, None, options)
    }

    /// Schema description with sample rows, as sent to the translator.
    pub fn schema_description(&self) -> String {
        describe_schema(self.registry, &self.samples())
    }

    fn finish(
        &self,
        query_id: Uuid,
        sql: &str,
        template: Option<&str>,
        options: QueryOptions,
    ) -> Result<QueryResult> {
        let validation = self.validator.validate(self.registry, sql);
        let kind = validation.kind.unwrap_or(StatementKind::Other);
        let normalized = validation.into_result().map_err(|reason| {
            debug!(%query_id, %reason, "validation failed");
            Error::InvalidQuery(reason)
        })?;
        debug!(%query_id, state = %QueryState::Validated, %kind);

        let output = self.execute(&normalized, kind).map_err(|e| {
            debug!(%query_id, error = %e, "execution failed");
            e
        })?;
        debug!(%query_id, state = %QueryState::Executed, rows = output.rows.len());

        let natural_language_summary = if options.show_summary {
            let summary = summarize(template, &output, kind);
            debug!(%query_id, state = %QueryState::Summarized);
            Some(summary)
        } else {
            None
        };

        Ok(QueryResult {
            columns: output.columns,
            rows: output.rows,
            natural_language_summary,
            sql: options.show_sql.then_some(normalized),
        })
    }

    fn execute(&self, sql: &str, kind: StatementKind) -> Result<QueryOutput> {
        if kind.is_write() {
            let affected = self
                .db
                .execute(sql, &[])
                .map_err(|e| Error::Execution(e.to_string()))?;
            let columns = vec![ROWS_AFFECTED.to_string()];
            let row = DbRow::new(columns.clone(), vec![DbValue::Integer(affected as i64)]);
            Ok(QueryOutput {
                columns,
                rows: vec![row],
            })
        } else {
            self.db
                .query(sql, &[])
                .map_err(|e| Error::Execution(e.to_string()))
        }
    }

    /// First rows of each table, fetched through the validator like any
    /// other query. Failures only cost the sample.
    fn samples(&self) -> BTreeMap<String, QueryOutput> {
        let mut samples = BTreeMap::new();
        if self.sample_rows == 0 {
            return samples;
        }
        for name in self.registry.table_names() {
            let sql = format!("SELECT * FROM {} LIMIT {}", quote_ident(name), self.sample_rows);
            let sample = self
                .validator
                .validate(self.registry, &sql)
                .into_result()
                .map_err(Error::InvalidQuery)
                .and_then(|normalized| self.execute(&normalized, StatementKind::Select));
            match sample {
                Ok(output) => {
                    samples.insert(name.to_lowercase(), output);
                }
                Err(e) => warn!(table = name, error = %e, "could not sample table"),
            }
        }
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper;
    use crate::translator::MockTranslator;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn people_db() -> (DbConnection, SchemaRegistry) {
        let db = DbConnection::open_in_memory().unwrap();
        let mut registry = SchemaRegistry::new();
        mapper::load(
            &db,
            &mut registry,
            "people",
            &strings(&["id", "name"]),
            &[strings(&["1", "Alice"]), strings(&["2", "Bob"])],
        )
        .unwrap();
        (db, registry)
    }

    #[test]
    fn test_schema_description_includes_samples() {
        let (db, registry) = people_db();
        let validator = Validator::read_only();
        let mock = MockTranslator::new();
        let orchestrator =
            QueryOrchestrator::new(&db, &registry, &validator, &mock).with_sample_rows(1);
        let text = orchestrator.schema_description();
        assert!(text.contains("Table: people"));
        assert!(text.contains("1 | Alice"));
        assert!(!text.contains("Bob"));
    }

    #[test]
    fn test_empty_question() {
        let (db, registry) = people_db();
        let validator = Validator::read_only();
        let mock = MockTranslator::new();
        let orchestrator = QueryOrchestrator::new(&db, &registry, &validator, &mock);
        let err = orchestrator.ask("   ", QueryOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::Translation(TranslationError::EmptyQuestion)
        ));
        assert!(mock.requests().is_empty());
    }

    #[test]
    fn test_show_sql_and_summary_flags() {
        let (db, registry) = people_db();
        let validator = Validator::read_only();
        let mock = MockTranslator::new();
        mock.queue_response("SQL: SELECT name FROM people ORDER BY id;\nTEMPLATE: Names: {name}");
        let orchestrator = QueryOrchestrator::new(&db, &registry, &validator, &mock);

        let result = orchestrator
            .ask(
                "list names",
                QueryOptions {
                    show_sql: true,
                    show_summary: true,
                },
            )
            .unwrap();
        assert_eq!(result.sql.as_deref(), Some("SELECT name FROM people ORDER BY id"));
        assert_eq!(
            result.natural_language_summary.as_deref(),
            Some("Names: Alice, Bob")
        );

        let result = orchestrator
            .run_sql(
                "SELECT name FROM people WHERE id = 2",
                QueryOptions {
                    show_sql: false,
                    show_summary: false,
                },
            )
            .unwrap();
        assert!(result.sql.is_none());
        assert!(result.natural_language_summary.is_none());
        assert_eq!(result.rows[0].value("name"), Some(&DbValue::Text("Bob".into())));
    }

    #[test]
    fn test_execution_error() {
        let (db, registry) = people_db();
        let validator = Validator::read_only();
        let mock = MockTranslator::new();
        let orchestrator = QueryOrchestrator::new(&db, &registry, &validator, &mock);
        let err = orchestrator
            .run_sql("SELECT CAST(name AS INTEGER) FROM people", QueryOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Execution(_)), "{err}");
    }
}
