//! SQL validation against a schema registry.
//!
//! A statement is accepted only when it is a single statement of an allowed
//! kind, contains no forbidden keyword or file-reading construct, and every
//! table and column it names exists in the registry. The validator never
//! touches a database.

use chatsheet_schema::SchemaRegistry;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::lexer::{tokenize, LexError, Token, TokenKind};
use crate::parser::{
    parse, ColumnRef, OutputColumn, ParseError, References, Statement, StatementKind,
    TableRef, TableSource,
};

/// Keywords rejected wherever they appear as bare words.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "ALTER", "ATTACH", "COPY", "CREATE", "DETACH", "DROP", "EXPORT", "IMPORT", "INSTALL",
    "LOAD", "PRAGMA", "TRUNCATE",
];

const WRITE_KEYWORDS: &[&str] = &["INSERT", "UPDATE", "DELETE"];

/// Scalar and table functions that read files or the environment.
const FILE_FUNCTIONS: &[&str] = &[
    "getenv",
    "glob",
    "parquet_file_metadata",
    "parquet_kv_metadata",
    "parquet_metadata",
    "parquet_schema",
    "query",
    "query_table",
    "sniff_csv",
];

/// DuckDB's implicit row identifier, available on every base table.
const ROWID: &str = "rowid";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Also accept `INSERT`, `UPDATE` and `DELETE`.
    #[serde(default)]
    pub allow_writes: bool,
}

/// Outcome of validating one statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub ok: bool,
    pub reason: Option<String>,
    /// Input trimmed, without its trailing semicolon. Set only when `ok`.
    pub normalized_sql: Option<String>,
    /// Leading statement kind, when the statement got far enough to parse.
    pub kind: Option<StatementKind>,
}

impl ValidationResult {
    fn accepted(normalized_sql: String, kind: StatementKind) -> Self {
        Self {
            ok: true,
            reason: None,
            normalized_sql: Some(normalized_sql),
            kind: Some(kind),
        }
    }

    fn rejected(rejection: &Rejection, kind: Option<StatementKind>) -> Self {
        Self {
            ok: false,
            reason: Some(rejection.to_string()),
            normalized_sql: None,
            kind,
        }
    }

    /// Normalized SQL on success, the rejection reason otherwise.
    pub fn into_result(self) -> Result<String, String> {
        match (self.ok, self.normalized_sql) {
            (true, Some(sql)) => Ok(sql),
            _ => Err(self
                .reason
                .unwrap_or_else(|| "query was rejected".to_string())),
        }
    }
}

/// Why a statement was rejected. The `Display` text becomes
/// [`ValidationResult::reason`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("query is empty")]
    Empty,

    #[error("could not tokenize query: {0}")]
    Lex(#[from] LexError),

    #[error("multiple statements are not allowed")]
    MultipleStatements,

    #[error("query contains forbidden keyword {0}")]
    ForbiddenKeyword(String),

    #[error("{keyword} is not allowed inside a {kind} statement")]
    NestedWrite {
        keyword: String,
        kind: StatementKind,
    },

    #[error("could not parse query: {0}")]
    Parse(#[from] ParseError),

    #[error("{kind} statements are not allowed (allowed: {allowed})")]
    KindNotAllowed {
        kind: String,
        allowed: String,
    },

    #[error("reading files is not allowed: '{0}'")]
    FileAccess(String),

    #[error("function {0} is not allowed")]
    ForbiddenFunction(String),

    #[error("table function {0} is not allowed in FROM")]
    TableFunction(String),

    #[error("schema-qualified table {0} is not allowed")]
    QualifiedTable(String),

    #[error("table '{0}' does not exist")]
    UnknownTable(String),

    #[error("unknown table or alias '{0}'")]
    UnknownQualifier(String),

    #[error("column '{column}' does not exist in table '{table}'")]
    UnknownColumn { column: String, table: String },

    #[error("column '{0}' does not exist in any referenced table")]
    UnresolvedColumn(String),
}

/// Validates statements for one set of allowed statement kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    allowed: Vec<StatementKind>,
}

impl Default for Validator {
    fn default() -> Self {
        Self::read_only()
    }
}

impl Validator {
    /// Accepts `SELECT` (including `WITH`) only.
    pub fn read_only() -> Self {
        Self {
            allowed: vec![StatementKind::Select],
        }
    }

    pub fn new(config: &ValidatorConfig) -> Self {
        let mut validator = Self::read_only();
        if config.allow_writes {
            validator.allowed.extend([
                StatementKind::Insert,
                StatementKind::Update,
                StatementKind::Delete,
            ]);
        }
        validator
    }

    pub fn allows(&self, kind: StatementKind) -> bool {
        self.allowed.contains(&kind)
    }

    pub fn validate(&self, registry: &SchemaRegistry, sql: &str) -> ValidationResult {
        match self.check(registry, sql) {
            Ok((normalized, kind)) => ValidationResult::accepted(normalized, kind),
            Err((rejection, kind)) => {
                debug!(reason = %rejection, "query rejected");
                ValidationResult::rejected(&rejection, kind)
            }
        }
    }

    fn check(
        &self,
        registry: &SchemaRegistry,
        sql: &str,
    ) -> Result<(String, StatementKind), (Rejection, Option<StatementKind>)> {
        let no_kind = |r: Rejection| (r, None);

        if sql.trim().is_empty() {
            return Err(no_kind(Rejection::Empty));
        }
        let tokens = tokenize(sql).map_err(|e| no_kind(e.into()))?;

        let end = tokens
            .iter()
            .position(|t| t.kind == TokenKind::Semicolon)
            .unwrap_or(tokens.len());
        if end + 1 < tokens.len() {
            return Err(no_kind(Rejection::MultipleStatements));
        }
        let statement_tokens = &tokens[..end];
        if statement_tokens.is_empty() {
            return Err(no_kind(Rejection::Empty));
        }

        check_forbidden_keywords(statement_tokens).map_err(no_kind)?;

        let statement = parse(statement_tokens).map_err(|e| no_kind(e.into()))?;
        let kind = statement.kind();
        let with_kind = |r: Rejection| (r, Some(kind));

        check_nested_writes(statement_tokens, kind).map_err(with_kind)?;

        if !self.allows(kind) {
            let shown = match &statement {
                Statement::Other(keyword) => keyword.clone(),
                _ => kind.to_string(),
            };
            return Err(with_kind(Rejection::KindNotAllowed {
                kind: shown,
                allowed: self
                    .allowed
                    .iter()
                    .map(StatementKind::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            }));
        }

        check_statement(registry, &statement).map_err(with_kind)?;

        let normalized = match tokens.get(end) {
            Some(semicolon) => sql[..semicolon.offset].trim(),
            None => sql.trim(),
        };
        Ok((normalized.to_string(), kind))
    }
}

/// Validate with the default read-only validator.
pub fn validate(registry: &SchemaRegistry, sql: &str) -> ValidationResult {
    Validator::read_only().validate(registry, sql)
}

fn check_forbidden_keywords(tokens: &[Token]) -> Result<(), Rejection> {
    for token in tokens {
        if let Some(upper) = token.word_upper() {
            if FORBIDDEN_KEYWORDS.contains(&upper.as_str()) {
                return Err(Rejection::ForbiddenKeyword(upper));
            }
        }
    }
    Ok(())
}

/// A read statement may not contain any write keyword; a write statement
/// may contain only its own.
fn check_nested_writes(tokens: &[Token], kind: StatementKind) -> Result<(), Rejection> {
    if kind == StatementKind::Other {
        return Ok(());
    }
    let mut seen = 0usize;
    for token in tokens {
        let Some(upper) = token.word_upper() else {
            continue;
        };
        if !WRITE_KEYWORDS.contains(&upper.as_str()) {
            continue;
        }
        seen += 1;
        if !kind.is_write() || seen > 1 {
            return Err(Rejection::NestedWrite {
                keyword: upper,
                kind,
            });
        }
    }
    Ok(())
}

fn is_file_function(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    let base = name.rsplit('.').next().unwrap_or(&name);
    base.starts_with("read_") || base.ends_with("_scan") || FILE_FUNCTIONS.contains(&base)
}

fn check_statement(registry: &SchemaRegistry, statement: &Statement) -> Result<(), Rejection> {
    let Some(refs) = statement.references() else {
        return Ok(());
    };

    if let Some(path) = refs.file_references.first() {
        return Err(Rejection::FileAccess(path.clone()));
    }
    if let Some(function) = refs.table_functions.first() {
        return Err(Rejection::TableFunction(function.clone()));
    }
    if let Some(function) = refs.functions.iter().find(|f| is_file_function(f)) {
        return Err(Rejection::ForbiddenFunction(function.clone()));
    }
    if let Some(table) = refs.qualified_tables.first() {
        return Err(Rejection::QualifiedTable(table.clone()));
    }

    for table in refs.tables.iter().filter(|t| t.is_checked()) {
        if !registry.contains(&table.name) {
            return Err(Rejection::UnknownTable(table.name.clone()));
        }
    }

    let scope = Scope { registry, refs };
    for column in &refs.columns {
        match &column.qualifier {
            Some(qualifier) => scope.check_qualified(qualifier, column)?,
            None => scope.check_unqualified(column)?,
        }
    }

    let (target, targets) = match statement {
        Statement::Insert(stmt) => (&stmt.table, &stmt.columns),
        Statement::Update(stmt) => (&stmt.table, &stmt.assignments),
        _ => return Ok(()),
    };
    if let Some(schema) = registry.get(&target.name) {
        for column in targets {
            if !schema.has_column(column) {
                return Err(Rejection::UnknownColumn {
                    column: column.clone(),
                    table: schema.table_name().to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Column resolution over the query scopes of one statement.
///
/// A column sees the tables of its own scope and of every enclosing scope.
/// Subqueries and `WITH` tables expose the names of their select lists;
/// when those cannot be named the table accepts any column.
struct Scope<'a> {
    registry: &'a SchemaRegistry,
    refs: &'a References,
}

impl<'a> Scope<'a> {
    /// Tables visible from `scope`, innermost first.
    fn visible(&self, scope: usize) -> Vec<&'a TableRef> {
        let refs = self.refs;
        refs.scope_chain(scope)
            .into_iter()
            .flat_map(|s| refs.tables.iter().filter(move |t| t.scope == s))
            .collect()
    }

    /// Column names a table exposes, or `None` when they are not known.
    fn exposed(&self, table: &TableRef, depth: usize) -> Option<Vec<String>> {
        let base = match table.source {
            TableSource::Table => self.registry.get(&table.name).map(|schema| {
                schema
                    .column_names()
                    .into_iter()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            }),
            TableSource::Cte | TableSource::Derived => match table.body {
                Some(body) => self.outputs(body, depth + 1),
                None => None,
            },
        };
        if table.columns.is_empty() {
            return base;
        }
        // Renames cover a prefix; remaining columns keep their names.
        let mut columns = table.columns.clone();
        if let Some(base) = base {
            columns.extend(base.into_iter().skip(table.columns.len()));
        }
        Some(columns)
    }

    fn outputs(&self, scope: usize, depth: usize) -> Option<Vec<String>> {
        if depth > self.refs.scopes.len() {
            return None;
        }
        let outputs = self.refs.scopes.get(scope)?.outputs.as_ref()?;
        let mut names = Vec::new();
        for output in outputs {
            match output {
                OutputColumn::Named(name) => names.push(name.clone()),
                OutputColumn::Wildcard(qualifier) => {
                    let tables = self.refs.tables.iter().filter(|t| {
                        t.scope == scope
                            && qualifier
                                .as_deref()
                                .map_or(true, |q| t.qualifier().eq_ignore_ascii_case(q))
                    });
                    for table in tables {
                        names.extend(self.exposed(table, depth)?);
                    }
                }
            }
        }
        Some(names)
    }

    fn exposes(&self, table: &TableRef, name: &str) -> Option<bool> {
        self.exposed(table, 0)
            .map(|columns| columns.iter().any(|c| c.eq_ignore_ascii_case(name)))
    }

    fn check_qualified(&self, qualifier: &str, column: &ColumnRef) -> Result<(), Rejection> {
        let name = column.name.as_str();
        let visible = self.visible(column.scope);
        let by_alias = visible
            .iter()
            .find(|t| t.qualifier().eq_ignore_ascii_case(qualifier));
        let by_name = || {
            visible
                .iter()
                .find(|t| t.name.eq_ignore_ascii_case(qualifier))
        };

        match by_alias.or_else(by_name) {
            Some(table) => {
                if column.is_wildcard() || (table.is_checked() && name.eq_ignore_ascii_case(ROWID))
                {
                    return Ok(());
                }
                if self.exposes(table, name) != Some(false) {
                    return Ok(());
                }
                let shown = match self.registry.get(&table.name) {
                    Some(schema) if table.is_checked() => schema.table_name(),
                    _ => table.qualifier(),
                };
                Err(Rejection::UnknownColumn {
                    column: name.to_string(),
                    table: shown.to_string(),
                })
            }
            // Struct field access (`col.field`) or a lambda parameter.
            None if self.resolves(&visible, qualifier) || self.refs.is_output_alias(qualifier) => {
                Ok(())
            }
            None => Err(Rejection::UnknownQualifier(qualifier.to_string())),
        }
    }

    fn check_unqualified(&self, column: &ColumnRef) -> Result<(), Rejection> {
        let name = column.name.as_str();
        let visible = self.visible(column.scope);
        if self.refs.is_output_alias(name)
            || self.resolves(&visible, name)
            || (name.eq_ignore_ascii_case(ROWID) && visible.iter().any(|t| t.is_checked()))
        {
            return Ok(());
        }
        Err(Rejection::UnresolvedColumn(name.to_string()))
    }

    /// Some visible table has the column, or cannot rule it out.
    fn resolves(&self, visible: &[&TableRef], name: &str) -> bool {
        visible
            .iter()
            .any(|table| self.exposes(table, name) != Some(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsheet_schema::{ColumnProfile, ColumnType, TableSchema};

    fn registry() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry.insert(
            TableSchema::new(
                "people",
                vec![
                    ColumnProfile::new("id", ColumnType::Integer, false),
                    ColumnProfile::new("name", ColumnType::Text, false),
                ],
            )
            .unwrap(),
        );
        registry.insert(
            TableSchema::new(
                "orders",
                vec![
                    ColumnProfile::new("id", ColumnType::Integer, false),
                    ColumnProfile::new("person_id", ColumnType::Integer, false),
                    ColumnProfile::new("total", ColumnType::Float, true),
                ],
            )
            .unwrap(),
        );
        registry
    }

    fn reason(sql: &str) -> String {
        let result = validate(&registry(), sql);
        assert!(!result.ok, "expected rejection for {sql}");
        result.reason.unwrap()
    }

    #[test]
    fn test_accepts_select_and_normalizes() {
        let result = validate(&registry(), "  SELECT name FROM people WHERE id = 1;  ");
        assert!(result.ok, "{:?}", result.reason);
        assert_eq!(
            result.normalized_sql.as_deref(),
            Some("SELECT name FROM people WHERE id = 1")
        );
        assert_eq!(result.kind, Some(StatementKind::Select));
    }

    #[test]
    fn test_rejects_stacking_and_empty() {
        assert_eq!(reason("SELECT 1; DROP TABLE t"), "multiple statements are not allowed");
        assert_eq!(reason("SELECT 1;;"), "multiple statements are not allowed");
        assert_eq!(reason("   "), "query is empty");
        assert_eq!(reason(";"), "query is empty");
    }

    #[test]
    fn test_rejects_unknown_table_and_column() {
        assert_eq!(reason("SELECT * FROM ghosts"), "table 'ghosts' does not exist");
        assert_eq!(
            reason("SELECT p.age FROM people p"),
            "column 'age' does not exist in table 'people'"
        );
        assert_eq!(
            reason("SELECT age FROM people"),
            "column 'age' does not exist in any referenced table"
        );
        assert_eq!(
            reason("SELECT x.name FROM people p"),
            "unknown table or alias 'x'"
        );
    }

    #[test]
    fn test_forbidden_constructs() {
        assert!(reason("DROP TABLE people").contains("DROP"));
        assert!(reason("SELECT * FROM people WHERE name = 'x' OR 1=1 UNION SELECT * FROM read_csv('/etc/passwd')")
            .contains("read_csv"));
        assert!(reason("SELECT * FROM '/etc/passwd'").contains("/etc/passwd"));
        assert!(reason("SELECT getenv('HOME')").contains("getenv"));
        assert!(reason("SELECT * FROM information_schema.tables").contains("information_schema"));
        assert!(reason("SELECT * FROM people WHERE id IN (DELETE FROM people RETURNING id)")
            .contains("DELETE"));
    }

    #[test]
    fn test_writes_need_config() {
        let sql = "UPDATE people SET name = 'Al' WHERE id = 1";
        let read_only = validate(&registry(), sql);
        assert!(!read_only.ok);
        assert_eq!(read_only.kind, Some(StatementKind::Update));

        let validator = Validator::new(&ValidatorConfig { allow_writes: true });
        let result = validator.validate(&registry(), sql);
        assert!(result.ok, "{:?}", result.reason);

        let result = validator.validate(&registry(), "INSERT INTO people (id, nickname) VALUES (1, 'x')");
        assert_eq!(
            result.reason.as_deref(),
            Some("column 'nickname' does not exist in table 'people'")
        );
    }

    #[test]
    fn test_ddl_never_allowed() {
        let validator = Validator::new(&ValidatorConfig { allow_writes: true });
        let result = validator.validate(&registry(), "CREATE TABLE x (a INT)");
        assert!(!result.ok);
    }

    #[test]
    fn test_ctes_and_aliases() {
        let registry = registry();
        for sql in [
            "WITH big AS (SELECT person_id, total FROM orders WHERE total > 10) \
             SELECT p.name, b.total FROM people p JOIN big b ON b.person_id = p.id",
            "SELECT name, COUNT(*) AS n FROM people GROUP BY name ORDER BY n DESC",
            "SELECT sub.total FROM (SELECT total FROM orders) sub",
            "SELECT people.name FROM people",
            "SELECT o.* FROM orders o",
            "SELECT rowid, name FROM people",
        ] {
            let result = validate(&registry, sql);
            assert!(result.ok, "{sql}: {:?}", result.reason);
        }
    }

    #[test]
    fn test_columns_resolve_per_query_block() {
        assert_eq!(
            reason("WITH big AS (SELECT ghost FROM orders) SELECT * FROM big"),
            "column 'ghost' does not exist in any referenced table"
        );
        assert_eq!(
            reason("SELECT ghost FROM people, (SELECT 1 AS x) s"),
            "column 'ghost' does not exist in any referenced table"
        );
        assert_eq!(
            reason("SELECT s.total FROM (SELECT id FROM orders) s"),
            "column 'total' does not exist in table 's'"
        );
        // `total` belongs to orders, which the outer block cannot see.
        assert_eq!(
            reason("SELECT total FROM people WHERE id IN (SELECT person_id FROM orders)"),
            "column 'total' does not exist in any referenced table"
        );

        let registry = registry();
        for sql in [
            "SELECT x, name FROM people, (SELECT 1 AS x) s",
            "SELECT name FROM people p WHERE EXISTS \
             (SELECT 1 FROM orders o WHERE o.person_id = p.id AND total > 5)",
            "SELECT n FROM (SELECT count(*) FROM orders) t(n)",
            "SELECT id FROM people UNION SELECT person_id FROM orders ORDER BY id",
            "WITH t AS (SELECT * FROM orders) SELECT total, person_id FROM t",
            "SELECT anything FROM (SELECT count(*) FROM orders) c",
        ] {
            let result = validate(&registry, sql);
            assert!(result.ok, "{sql}: {:?}", result.reason);
        }
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let depth = 50_000;
        let sql = format!("SELECT {}1{}", "(".repeat(depth), ")".repeat(depth));
        assert!(reason(&sql).contains("nesting"));
    }
}
