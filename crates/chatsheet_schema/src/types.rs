//! Column and table layout types.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::SchemaError;

/// Storage type of a column.
///
/// Variants are listed in inference priority order: a column takes the first
/// type (integer, then float, boolean, datetime) that accepts every non-null
/// value, and falls back to `Text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Boolean,
    #[serde(rename = "datetime")]
    DateTime,
    Text,
}

impl ColumnType {
    /// Candidate types in inference priority order, `Text` excluded.
    pub const CANDIDATES: [ColumnType; 4] = [
        ColumnType::Integer,
        ColumnType::Float,
        ColumnType::Boolean,
        ColumnType::DateTime,
    ];

    /// DuckDB storage type used in `CREATE TABLE`.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "BIGINT",
            ColumnType::Float => "DOUBLE",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::DateTime => "TIMESTAMP",
            ColumnType::Text => "VARCHAR",
        }
    }

    /// Map a catalog `data_type` back to a column type.
    ///
    /// Anything unrecognised reads as `Text`, which is what the column would
    /// have been inferred as had it come from a CSV.
    pub fn from_sql_type(sql_type: &str) -> ColumnType {
        let upper = sql_type.trim().to_ascii_uppercase();
        let base = upper.split('(').next().unwrap_or("").trim();
        match base {
            "BIGINT" | "INTEGER" | "INT" | "INT8" | "INT4" | "SMALLINT" | "TINYINT"
            | "HUGEINT" | "UBIGINT" | "UINTEGER" | "USMALLINT" | "UTINYINT" | "LONG" => {
                ColumnType::Integer
            }
            "DOUBLE" | "FLOAT" | "REAL" | "FLOAT8" | "FLOAT4" | "DECIMAL" | "NUMERIC" => {
                ColumnType::Float
            }
            "BOOLEAN" | "BOOL" => ColumnType::Boolean,
            "TIMESTAMP" | "DATETIME" | "TIMESTAMP WITH TIME ZONE" | "TIMESTAMPTZ" | "DATE" => {
                ColumnType::DateTime
            }
            _ => ColumnType::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::DateTime => "datetime",
            ColumnType::Text => "text",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inferred profile of a single column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub name: String,
    pub inferred_type: ColumnType,
    pub nullable: bool,
}

impl ColumnProfile {
    pub fn new(name: impl Into<String>, inferred_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            inferred_type,
            nullable,
        }
    }

    /// Column definition fragment for `CREATE TABLE`, name unquoted.
    pub fn sql_definition(&self) -> String {
        if self.nullable {
            self.inferred_type.sql_type().to_string()
        } else {
            format!("{} NOT NULL", self.inferred_type.sql_type())
        }
    }
}

/// Immutable layout of one loaded table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    table_name: String,
    columns: Vec<ColumnProfile>,
}

impl TableSchema {
    /// Build a schema, rejecting empty, blank or duplicate column names.
    pub fn new(
        table_name: impl Into<String>,
        columns: Vec<ColumnProfile>,
    ) -> Result<Self, SchemaError> {
        if columns.is_empty() {
            return Err(SchemaError::EmptyHeader);
        }
        check_column_names(columns.iter().map(|c| c.name.as_str()))?;
        Ok(Self {
            table_name: table_name.into(),
            columns,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn columns(&self) -> &[ColumnProfile] {
        &self.columns
    }

    /// Case-insensitive column lookup.
    pub fn column(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Column profiles compared without regard to order of discovery.
    pub fn profile_set(&self) -> HashSet<ColumnProfile> {
        self.columns.iter().cloned().collect()
    }
}

/// A column whose type differs between two layouts of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeChange {
    pub column: String,
    pub from: ColumnType,
    pub to: ColumnType,
}

/// What a reload changed about a table's columns. Names compare
/// case-insensitively; nullability is not tracked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaChange {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub retyped: Vec<TypeChange>,
}

impl SchemaChange {
    pub fn between(old: &TableSchema, new: &TableSchema) -> Self {
        let mut change = SchemaChange::default();
        for column in old.columns() {
            match new.column(&column.name) {
                None => change.removed.push(column.name.clone()),
                Some(now) if now.inferred_type != column.inferred_type => {
                    change.retyped.push(TypeChange {
                        column: now.name.clone(),
                        from: column.inferred_type,
                        to: now.inferred_type,
                    })
                }
                Some(_) => {}
            }
        }
        change.added = new
            .columns()
            .iter()
            .filter(|c| !old.has_column(&c.name))
            .map(|c| c.name.clone())
            .collect();
        change
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.retyped.is_empty()
    }

    /// Removed columns or changed types: queries written against the old
    /// layout may now fail or compare differently.
    pub fn is_breaking(&self) -> bool {
        !self.removed.is_empty() || !self.retyped.is_empty()
    }
}

/// `removed: a; retyped: b integer -> text; added: c`, empty parts omitted.
impl fmt::Display for SchemaChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.removed.is_empty() {
            parts.push(format!("removed: {}", self.removed.join(", ")));
        }
        if !self.retyped.is_empty() {
            let retyped: Vec<String> = self
                .retyped
                .iter()
                .map(|c| format!("{} {} -> {}", c.column, c.from, c.to))
                .collect();
            parts.push(format!("retyped: {}", retyped.join(", ")));
        }
        if !self.added.is_empty() {
            parts.push(format!("added: {}", self.added.join(", ")));
        }
        if parts.is_empty() {
            return f.write_str("no column changes");
        }
        f.write_str(&parts.join("; "))
    }
}

/// Reject empty names and case-insensitive duplicates.
pub(crate) fn check_column_names<'a>(
    names: impl IntoIterator<Item = &'a str>,
) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for (index, name) in names.into_iter().enumerate() {
        if name.trim().is_empty() {
            return Err(SchemaError::EmptyColumnName { index });
        }
        if !seen.insert(name.to_lowercase()) {
            return Err(SchemaError::DuplicateColumn {
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_types_roundtrip_through_catalog_names() {
        for ty in ColumnType::CANDIDATES
            .iter()
            .copied()
            .chain(std::iter::once(ColumnType::Text))
        {
            assert_eq!(ColumnType::from_sql_type(ty.sql_type()), ty);
        }
        assert_eq!(ColumnType::from_sql_type("DECIMAL(18,3)"), ColumnType::Float);
        assert_eq!(ColumnType::from_sql_type("BLOB"), ColumnType::Text);
    }

    #[test]
    fn schema_rejects_duplicate_columns_case_insensitively() {
        let err = TableSchema::new(
            "people",
            vec![
                ColumnProfile::new("Name", ColumnType::Text, false),
                ColumnProfile::new("name", ColumnType::Text, false),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateColumn { .. }));
    }

    #[test]
    fn column_lookup_ignores_case() {
        let schema = TableSchema::new(
            "people",
            vec![ColumnProfile::new("Name", ColumnType::Text, true)],
        )
        .unwrap();
        assert!(schema.has_column("NAME"));
        assert_eq!(schema.column("name").unwrap().name, "Name");
    }

    #[test]
    fn schema_change_lists_removed_retyped_and_added() {
        let old = TableSchema::new(
            "people",
            vec![
                ColumnProfile::new("id", ColumnType::Integer, false),
                ColumnProfile::new("age", ColumnType::Integer, true),
                ColumnProfile::new("joined", ColumnType::DateTime, true),
            ],
        )
        .unwrap();
        let new = TableSchema::new(
            "people",
            vec![
                ColumnProfile::new("ID", ColumnType::Integer, true),
                ColumnProfile::new("age", ColumnType::Text, true),
                ColumnProfile::new("email", ColumnType::Text, true),
            ],
        )
        .unwrap();

        let change = SchemaChange::between(&old, &new);
        assert_eq!(change.removed, vec!["joined"]);
        assert_eq!(change.added, vec!["email"]);
        assert_eq!(
            change.retyped,
            vec![TypeChange {
                column: "age".into(),
                from: ColumnType::Integer,
                to: ColumnType::Text,
            }]
        );
        assert!(change.is_breaking());
        assert_eq!(
            change.to_string(),
            "removed: joined; retyped: age integer -> text; added: email"
        );

        let same = SchemaChange::between(&old, &old);
        assert!(same.is_empty());
        assert_eq!(same.to_string(), "no column changes");
    }

    #[test]
    fn not_null_definition() {
        let col = ColumnProfile::new("id", ColumnType::Integer, false);
        assert_eq!(col.sql_definition(), "BIGINT NOT NULL");
        let col = ColumnProfile::new("note", ColumnType::Text, true);
        assert_eq!(col.sql_definition(), "VARCHAR");
    }
}
