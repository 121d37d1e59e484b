//! CSV to table mapping.
//!
//! A load validates the table name, infers the layout, coerces every cell,
//! and only then touches the database: drop, create and insert run in one
//! transaction, and the registry is updated after commit. A failure at any
//! step leaves the previous table and registry entry as they were.

use chatsheet_db::{quote_ident, DbConnection, DbValue};
use chatsheet_schema::{
    coerce_rows, infer, is_reserved_word, validate_table_name, ColumnProfile, ColumnType,
    SchemaChange, SchemaRegistry, TableSchema, MAX_IDENTIFIER_LEN,
};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Header plus data rows as read from a CSV file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvData {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Infer a schema for `header`/`rows` and load it as `table_name`.
pub fn load(
    db: &DbConnection,
    registry: &mut SchemaRegistry,
    table_name: &str,
    header: &[String],
    rows: &[Vec<String>],
) -> Result<TableSchema> {
    validate_table_name(table_name)?;
    let schema = infer(table_name, header, rows)?;
    load_with_schema(db, registry, schema, rows)
}

/// Create (or replace) `schema.table_name()` and fill it with `rows`.
///
/// The last load wins. Replacing a table with a different layout is logged
/// at `warn` with the [`SchemaChange`].
pub fn load_with_schema(
    db: &DbConnection,
    registry: &mut SchemaRegistry,
    schema: TableSchema,
    rows: &[Vec<String>],
) -> Result<TableSchema> {
    validate_table_name(schema.table_name())?;
    let values = coerce_rows(&schema, rows)?;

    let table = quote_ident(schema.table_name());
    let create = create_table_sql(&schema);
    let column_names = schema.column_names();

    let inserted = db.transaction(|tx| {
        tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", table))?;
        tx.execute_batch(&create)?;
        tx.bulk_insert_rows(schema.table_name(), &column_names, &values)
    })?;

    let previous = registry.insert(schema.clone());
    if let Some(old) = &previous {
        let change = SchemaChange::between(old, &schema);
        if !change.is_empty() {
            warn!(
                table = schema.table_name(),
                breaking = change.is_breaking(),
                %change,
                "reload changed table layout"
            );
        }
    }
    info!(
        table = schema.table_name(),
        columns = schema.columns().len(),
        rows = inserted,
        replaced = previous.is_some(),
        "loaded table"
    );
    Ok(schema)
}

/// `CREATE TABLE` statement for `schema`, with `NOT NULL` on non-nullable
/// columns.
pub fn create_table_sql(schema: &TableSchema) -> String {
    let columns: Vec<String> = schema
        .columns()
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.sql_definition()))
        .collect();
    format!(
        "CREATE TABLE {} ({})",
        quote_ident(schema.table_name()),
        columns.join(", ")
    )
}

/// Read a delimited file: header row first, ragged rows allowed (short rows
/// read as nulls, long rows fail inference).
pub fn read_csv(path: &Path, delimiter: u8) -> Result<CsvData> {
    let file = File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let header: Vec<String> = reader
        .headers()
        .map_err(|e| Error::Csv(format!("{}: header: {}", path.display(), e)))?
        .iter()
        .map(|s| s.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record
            .map_err(|e| Error::Csv(format!("{}: line {}: {}", path.display(), index + 2, e)))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    debug!(path = %path.display(), columns = header.len(), rows = rows.len(), "read csv");
    Ok(CsvData { header, rows })
}

/// Read `path` and load it as `table_name`.
pub fn load_csv_file(
    db: &DbConnection,
    registry: &mut SchemaRegistry,
    table_name: &str,
    path: &Path,
    delimiter: u8,
) -> Result<TableSchema> {
    validate_table_name(table_name)?;
    let data = read_csv(path, delimiter)?;
    load(db, registry, table_name, &data.header, &data.rows)
}

/// Re-derive a table's schema from the live catalog.
///
/// Returns `None` when the table does not exist. Column types map back
/// through [`ColumnType::from_sql_type`].
pub fn describe_table(db: &DbConnection, table_name: &str) -> Result<Option<TableSchema>> {
    let rows = db.query_all(
        "SELECT table_name, column_name, data_type, is_nullable \
         FROM information_schema.columns \
         WHERE table_schema = 'main' AND lower(table_name) = lower(?) \
         ORDER BY ordinal_position",
        &[DbValue::from(table_name)],
    )?;
    if rows.is_empty() {
        return Ok(None);
    }

    let catalog_name: String = rows[0].get(0)?;
    let mut columns = Vec::with_capacity(rows.len());
    for row in &rows {
        let name: String = row.get(1)?;
        let data_type: String = row.get(2)?;
        let is_nullable: String = row.get(3)?;
        columns.push(ColumnProfile::new(
            name,
            ColumnType::from_sql_type(&data_type),
            !is_nullable.eq_ignore_ascii_case("NO"),
        ));
    }
    Ok(Some(TableSchema::new(catalog_name, columns)?))
}

/// Base tables in the `main` schema, by name.
pub fn list_tables(db: &DbConnection) -> Result<Vec<String>> {
    let rows = db.query_all(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = 'main' AND table_type = 'BASE TABLE' \
         ORDER BY table_name",
        &[],
    )?;
    rows.iter()
        .map(|row| row.get::<String>(0).map_err(Error::from))
        .collect()
}

/// Registry describing every base table already in `db`.
///
/// Tables whose names are not legal identifiers are skipped; they could not
/// have been created by a load.
pub fn rebuild_registry(db: &DbConnection) -> Result<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    for name in list_tables(db)? {
        if validate_table_name(&name).is_err() {
            debug!(table = %name, "skipping table with non-identifier name");
            continue;
        }
        if let Some(schema) = describe_table(db, &name)? {
            registry.insert(schema);
        }
    }
    Ok(registry)
}

/// Table name derived from a file stem: lower-cased, non-identifier
/// characters replaced by `_`, prefixed with `t_` when it would start with a
/// digit or be a reserved word.
pub fn default_table_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut name: String = stem
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    if name.is_empty() {
        name = "data".to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) || is_reserved_word(&name) {
        name.insert_str(0, "t_");
    }
    name.truncate(MAX_IDENTIFIER_LEN);
    name
}
