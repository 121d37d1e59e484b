//! Registry of loaded table layouts.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::types::TableSchema;

/// Table name to [`TableSchema`], compared case-insensitively.
///
/// Owned context: each session holds its own registry and tests build
/// isolated ones. Cloning yields an independent snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SchemaRegistry {
    tables: BTreeMap<String, TableSchema>,
}

fn key(name: &str) -> String {
    name.to_lowercase()
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a table, returning the previous layout.
    pub fn insert(&mut self, schema: TableSchema) -> Option<TableSchema> {
        self.tables.insert(key(schema.table_name()), schema)
    }

    pub fn get(&self, table_name: &str) -> Option<&TableSchema> {
        self.tables.get(&key(table_name))
    }

    pub fn contains(&self, table_name: &str) -> bool {
        self.tables.contains_key(&key(table_name))
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Tables ordered by lower-cased name.
    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.values().map(TableSchema::table_name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnProfile, ColumnType};

    fn schema(name: &str, column: &str) -> TableSchema {
        TableSchema::new(name, vec![ColumnProfile::new(column, ColumnType::Text, false)]).unwrap()
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let mut registry = SchemaRegistry::new();
        registry.insert(schema("People", "name"));
        assert!(registry.contains("people"));
        assert!(registry.contains("PEOPLE"));
        assert_eq!(registry.get("people").unwrap().table_name(), "People");
    }

    #[test]
    fn insert_replaces_wholesale() {
        let mut registry = SchemaRegistry::new();
        registry.insert(schema("people", "name"));
        let previous = registry.insert(schema("PEOPLE", "email"));
        assert!(previous.unwrap().has_column("name"));
        assert_eq!(registry.len(), 1);
        let current = registry.get("people").unwrap();
        assert!(current.has_column("email"));
        assert!(!current.has_column("name"));
    }

    #[test]
    fn snapshots_are_independent() {
        let mut registry = SchemaRegistry::new();
        registry.insert(schema("people", "name"));
        let snapshot = registry.clone();
        registry.clear();
        assert!(registry.is_empty());
        assert!(snapshot.contains("people"));
    }
}
