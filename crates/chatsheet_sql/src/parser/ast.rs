//! Statement AST.
//!
//! Only what validation needs is kept: which tables a statement touches,
//! which columns it names, and which constructs it contains. Expressions
//! themselves are not represented.

use serde::Serialize;
use std::fmt;

/// Leading statement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Other,
}

impl StatementKind {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            StatementKind::Insert | StatementKind::Update | StatementKind::Delete
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
            StatementKind::Other => "OTHER",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a name in `FROM` (or a DML target) comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableSource {
    /// A table that must exist in the registry.
    Table,
    /// A `WITH` name defined in the same statement.
    Cte,
    /// A parenthesised subquery.
    Derived,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
    pub source: TableSource,
    /// Column renames, `t(a, b)` or `WITH t(a, b)`. Empty when none.
    pub columns: Vec<String>,
    /// Query scope of the subquery or `WITH` body this name reads from.
    pub body: Option<usize>,
    /// Query scope whose `FROM` (or DML target) introduced the table.
    pub scope: usize,
}

impl TableRef {
    /// Name the table is addressed by in qualified column references.
    pub fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Whether column references against this table can be checked.
    pub fn is_checked(&self) -> bool {
        self.source == TableSource::Table
    }
}

/// Column reference, `qualifier.name` or bare `name`. `t.*` has name `*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
    /// Query scope the reference appears in.
    pub scope: usize,
}

impl ColumnRef {
    pub fn is_wildcard(&self) -> bool {
        self.name == "*"
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}.{}", q, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// One select-list item, as far as it can be named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputColumn {
    Named(String),
    /// `*` or `q.*`.
    Wildcard(Option<String>),
}

/// A `SELECT` body. Scope 0 is the statement itself and holds DML targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryScope {
    pub parent: Option<usize>,
    /// Select-list items in order; `None` once an item has no usable name.
    pub outputs: Option<Vec<OutputColumn>>,
}

impl QueryScope {
    pub fn root() -> Self {
        Self {
            parent: None,
            outputs: Some(Vec::new()),
        }
    }
}

/// `WITH name(columns) AS (body)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonTable {
    pub name: String,
    pub columns: Vec<String>,
    /// Unset while the body itself is being parsed.
    pub body: Option<usize>,
}

/// Everything a statement refers to. Tables and columns are tagged with
/// the query scope they belong to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct References {
    pub scopes: Vec<QueryScope>,
    pub tables: Vec<TableRef>,
    pub columns: Vec<ColumnRef>,
    /// `AS name` / implicit aliases in select lists, and lambda parameters.
    pub output_aliases: Vec<String>,
    pub ctes: Vec<CommonTable>,
    /// Every function called anywhere.
    pub functions: Vec<String>,
    /// Functions used as a `FROM` item.
    pub table_functions: Vec<String>,
    /// String literals used as a `FROM` item (DuckDB reads them as files).
    pub file_references: Vec<String>,
    /// Schema-qualified table names such as `information_schema.tables`.
    pub qualified_tables: Vec<String>,
}

impl References {
    pub fn cte(&self, name: &str) -> Option<&CommonTable> {
        self.ctes.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// `scope` followed by each enclosing scope.
    pub fn scope_chain(&self, scope: usize) -> Vec<usize> {
        let mut chain = vec![scope];
        let mut current = scope;
        while let Some(parent) = self.scopes.get(current).and_then(|s| s.parent) {
            if chain.len() > self.scopes.len() {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        chain
    }

    pub fn is_output_alias(&self, name: &str) -> bool {
        self.output_aliases
            .iter()
            .any(|a| a.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    pub table: TableRef,
    /// Explicit target column list; empty means all columns.
    pub columns: Vec<String>,
    pub refs: References,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateStatement {
    pub table: TableRef,
    /// Columns on the left of `SET col = ...`.
    pub assignments: Vec<String>,
    pub refs: References,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteStatement {
    pub table: TableRef,
    pub refs: References,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Select(References),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    /// Anything else, tagged with its upper-cased leading keyword.
    Other(String),
}

impl Statement {
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::Select(_) => StatementKind::Select,
            Statement::Insert(_) => StatementKind::Insert,
            Statement::Update(_) => StatementKind::Update,
            Statement::Delete(_) => StatementKind::Delete,
            Statement::Other(_) => StatementKind::Other,
        }
    }

    pub fn references(&self) -> Option<&References> {
        match self {
            Statement::Select(refs) => Some(refs),
            Statement::Insert(stmt) => Some(&stmt.refs),
            Statement::Update(stmt) => Some(&stmt.refs),
            Statement::Delete(stmt) => Some(&stmt.refs),
            Statement::Other(_) => None,
        }
    }
}
