//! DuckDB connection, transactions and bulk loads.
//!
//! Synchronous and embedded. A file-backed connection holds a
//! [`WriterLock`] for its lifetime; in-memory connections need none.

use duckdb::types::{TimeUnit, Value, ValueRef};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, debug_span, info, warn};

use crate::lock::{LockError, WriterLock};
use crate::value::{DbRow, DbTimestamp, DbValue, FromDbValue, QueryOutput};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database is locked by another process: {0}")]
    Locked(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Type conversion error: {0}")]
    Conversion(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),
}

impl From<LockError> for BackendError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Held(path) => BackendError::Locked(path.display().to_string()),
            other => BackendError::Database(other.to_string()),
        }
    }
}

/// Placeholders per generated INSERT. Loads wider than this are rejected.
pub const MAX_INSERT_PARAMS: usize = 999;

/// A DuckDB connection, in memory or on disk.
pub struct DbConnection {
    // Declared before the lock: the database closes before the lock is released.
    conn: duckdb::Connection,
    path: Option<PathBuf>,
    _lock: Option<WriterLock>,
}

impl fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "DbConnection({})", path.display()),
            None => f.write_str("DbConnection(:memory:)"),
        }
    }
}

impl DbConnection {
    /// Open (or create) a database file, creating parent directories and
    /// taking the single-writer lock first.
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                std::fs::create_dir_all(dir).map_err(|e| {
                    BackendError::Database(format!("cannot create {}: {e}", dir.display()))
                })?;
            }
            _ => {}
        }

        let lock = WriterLock::acquire(path)?;
        let conn = duckdb::Connection::open(path)?;
        info!(path = %path.display(), "database opened");
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
            _lock: Some(lock),
        })
    }

    pub fn open_in_memory() -> Result<Self, BackendError> {
        let conn = duckdb::Connection::open_in_memory()?;
        debug!("in-memory database opened");
        Ok(Self {
            conn,
            path: None,
            _lock: None,
        })
    }

    /// Database file, `None` in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run one statement; returns the affected row count.
    pub fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64, BackendError> {
        run_statement(&self.conn, sql, params)
    }

    /// Run several `;`-separated statements. Internal SQL only: there is no
    /// validation on this path.
    pub fn execute_batch(&self, sql: &str) -> Result<(), BackendError> {
        run_batch(&self.conn, sql)
    }

    pub fn query(&self, sql: &str, params: &[DbValue]) -> Result<QueryOutput, BackendError> {
        run_query(&self.conn, sql, params)
    }

    pub fn query_all(&self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>, BackendError> {
        Ok(self.query(sql, params)?.rows)
    }

    /// First row; an empty result is a [`BackendError::Query`].
    pub fn query_one(&self, sql: &str, params: &[DbValue]) -> Result<DbRow, BackendError> {
        self.query_all(sql, params)?
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Query("statement returned no rows".to_string()))
    }

    /// First column of the first row.
    pub fn query_scalar<T: FromDbValue>(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> Result<T, BackendError> {
        self.query_one(sql, params)?.get(0)
    }

    pub fn bulk_insert_rows(
        &self,
        table: &str,
        columns: &[&str],
        rows: &[Vec<DbValue>],
    ) -> Result<u64, BackendError> {
        insert_rows(&self.conn, table, columns, rows)
    }

    /// Run `op` between BEGIN and COMMIT. An `Err` from `op` rolls back and is
    /// returned as-is unless the rollback itself fails.
    pub fn transaction<T, F>(&self, op: F) -> Result<T, BackendError>
    where
        F: for<'a> FnOnce(&'a mut DbTransaction<'a>) -> Result<T, BackendError>,
    {
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        let outcome = op(&mut DbTransaction { conn: &self.conn });
        match outcome {
            Ok(value) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    return Err(BackendError::Transaction(format!(
                        "{err}; rollback also failed: {rollback}"
                    )));
                }
                debug!(error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }
}

/// The connection as seen inside [`DbConnection::transaction`].
pub struct DbTransaction<'a> {
    conn: &'a duckdb::Connection,
}

impl DbTransaction<'_> {
    pub fn execute(&mut self, sql: &str, params: &[DbValue]) -> Result<u64, BackendError> {
        run_statement(self.conn, sql, params)
    }

    pub fn execute_batch(&mut self, sql: &str) -> Result<(), BackendError> {
        run_batch(self.conn, sql)
    }

    pub fn query_all(&mut self, sql: &str, params: &[DbValue]) -> Result<Vec<DbRow>, BackendError> {
        Ok(run_query(self.conn, sql, params)?.rows)
    }

    pub fn bulk_insert_rows(
        &mut self,
        table: &str,
        columns: &[&str],
        rows: &[Vec<DbValue>],
    ) -> Result<u64, BackendError> {
        insert_rows(self.conn, table, columns, rows)
    }
}

/// Wrap `f` in a `db` debug span carrying the statement's leading keyword,
/// its hash and the elapsed time.
fn timed<T>(
    span_name: &'static str,
    sql: &str,
    f: impl FnOnce() -> Result<T, BackendError>,
) -> Result<T, BackendError> {
    let op = sql.split_whitespace().next().unwrap_or("?");
    let span = debug_span!(
        "db",
        kind = span_name,
        op,
        sql_hash = %hash_sql(sql),
        duration_ms = tracing::field::Empty
    );
    let _entered = span.enter();
    let started = Instant::now();
    let result = f();
    span.record("duration_ms", started.elapsed().as_millis() as u64);
    result
}

fn bind(params: &[DbValue]) -> Vec<Value> {
    params
        .iter()
        .map(|p| match p {
            DbValue::Null => Value::Null,
            DbValue::Integer(v) => Value::BigInt(*v),
            DbValue::Real(v) => Value::Double(*v),
            DbValue::Text(v) => Value::Text(v.clone()),
            DbValue::Blob(v) => Value::Blob(v.clone()),
            DbValue::Boolean(v) => Value::Boolean(*v),
            DbValue::Timestamp(v) => Value::Timestamp(TimeUnit::Microsecond, v.unix_micros()),
        })
        .collect()
}

fn run_statement(
    conn: &duckdb::Connection,
    sql: &str,
    params: &[DbValue],
) -> Result<u64, BackendError> {
    timed("execute", sql, || {
        let mut stmt = conn.prepare(sql)?;
        let affected = stmt.execute(duckdb::params_from_iter(bind(params)))?;
        Ok(affected as u64)
    })
}

fn run_batch(conn: &duckdb::Connection, sql: &str) -> Result<(), BackendError> {
    timed("batch", sql, || Ok(conn.execute_batch(sql)?))
}

fn run_query(
    conn: &duckdb::Connection,
    sql: &str,
    params: &[DbValue],
) -> Result<QueryOutput, BackendError> {
    timed("query", sql, || {
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(duckdb::params_from_iter(bind(params)))?;

        // Column metadata is only available once the statement has run.
        let Some(described) = rows.as_ref() else {
            return Ok(QueryOutput::default());
        };
        let columns: Vec<String> = (0..described.column_count())
            .map(|i| {
                described
                    .column_name(i)
                    .map_or_else(|_| format!("col{i}"), |name| name.to_string())
            })
            .collect();

        let shared: Arc<[String]> = columns.clone().into();
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let values = (0..shared.len())
                .map(|i| Ok(read_cell(row.get_ref(i)?, i)))
                .collect::<Result<Vec<_>, duckdb::Error>>()?;
            out.push(DbRow::new(Arc::clone(&shared), values));
        }
        Ok(QueryOutput { columns, rows: out })
    })
}

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

/// DuckDB cell to [`DbValue`]. Narrow integers widen to `i64`; dates and
/// times come back as ISO text; anything unmapped falls back to its debug form.
fn read_cell(cell: ValueRef<'_>, index: usize) -> DbValue {
    match cell {
        ValueRef::Null => DbValue::Null,
        ValueRef::Boolean(v) => DbValue::Boolean(v),
        ValueRef::TinyInt(v) => DbValue::Integer(v.into()),
        ValueRef::SmallInt(v) => DbValue::Integer(v.into()),
        ValueRef::Int(v) => DbValue::Integer(v.into()),
        ValueRef::BigInt(v) => DbValue::Integer(v),
        ValueRef::UTinyInt(v) => DbValue::Integer(v.into()),
        ValueRef::USmallInt(v) => DbValue::Integer(v.into()),
        ValueRef::UInt(v) => DbValue::Integer(v.into()),
        ValueRef::UBigInt(v) => match i64::try_from(v) {
            Ok(n) => DbValue::Integer(n),
            Err(_) => DbValue::Text(v.to_string()),
        },
        // SUM over BIGINT yields HUGEINT.
        ValueRef::HugeInt(v) => match i64::try_from(v) {
            Ok(n) => DbValue::Integer(n),
            Err(_) => DbValue::Text(v.to_string()),
        },
        ValueRef::Float(v) => DbValue::Real(v.into()),
        ValueRef::Double(v) => DbValue::Real(v),
        ValueRef::Decimal(v) => {
            let text = v.to_string();
            text.parse().map_or(DbValue::Text(text), DbValue::Real)
        }
        ValueRef::Text(bytes) => DbValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => DbValue::Blob(bytes.to_vec()),
        ValueRef::Timestamp(unit, v) => {
            let micros = to_micros(unit, v);
            DbTimestamp::from_unix_micros(micros).map_or(DbValue::Integer(micros), DbValue::from)
        }
        ValueRef::Date32(days) => chrono::NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(days.into())))
            .map_or(DbValue::Integer(days.into()), |d| {
                DbValue::Text(d.format("%Y-%m-%d").to_string())
            }),
        ValueRef::Time64(unit, v) => {
            let micros = to_micros(unit, v);
            let secs = u32::try_from(micros.div_euclid(1_000_000)).unwrap_or(u32::MAX);
            let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
            chrono::NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
                .map_or(DbValue::Integer(micros), |t| {
                    DbValue::Text(t.format("%H:%M:%S%.6f").to_string())
                })
        }
        other => {
            warn!(column = index, "unmapped DuckDB value rendered as text");
            DbValue::Text(format!("{other:?}"))
        }
    }
}

/// Multi-row `INSERT ... VALUES (?, ...), (?, ...)` in chunks of at most
/// [`MAX_INSERT_PARAMS`] placeholders.
fn insert_rows(
    conn: &duckdb::Connection,
    table: &str,
    columns: &[&str],
    rows: &[Vec<DbValue>],
) -> Result<u64, BackendError> {
    if rows.is_empty() {
        return Ok(0);
    }
    let width = columns.len();
    if width == 0 || width > MAX_INSERT_PARAMS {
        return Err(BackendError::InvalidInput(format!(
            "cannot insert into {table}: {width} columns (allowed 1..={MAX_INSERT_PARAMS})"
        )));
    }
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(BackendError::InvalidInput(format!(
            "row {i} has {} values for {width} columns",
            row.len()
        )));
    }

    let head = format!(
        "INSERT INTO {} ({}) VALUES ",
        quote_ident(table),
        columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
    );
    let tuple = format!("({})", vec!["?"; width].join(", "));

    let mut inserted = 0u64;
    for chunk in rows.chunks(MAX_INSERT_PARAMS / width) {
        let sql = format!("{head}{}", vec![tuple.as_str(); chunk.len()].join(", "));
        let params: Vec<DbValue> = chunk.iter().flatten().cloned().collect();
        inserted += run_statement(conn, &sql, &params)?;
    }
    debug!(table, rows = inserted, "rows inserted");
    Ok(inserted)
}

/// `"name"`, with embedded quotes doubled.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// FNV-1a of the statement text, for correlating log lines without logging SQL.
pub fn hash_sql(sql: &str) -> String {
    let hash = sql.bytes().fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
        (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    });
    format!("{hash:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> DbConnection {
        let db = DbConnection::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE people (id BIGINT, name VARCHAR, joined TIMESTAMP)")
            .unwrap();
        db
    }

    #[test]
    fn insert_then_read_back() {
        let db = people();
        let joined = DbTimestamp::from_rfc3339("2024-05-31T12:30:00Z").unwrap();
        let rows = vec![
            vec![1_i64.into(), "Alice".into(), joined.into()],
            vec![2_i64.into(), DbValue::Null, DbValue::Null],
        ];
        assert_eq!(
            db.bulk_insert_rows("people", &["id", "name", "joined"], &rows)
                .unwrap(),
            2
        );

        let out = db
            .query("SELECT name, joined FROM people ORDER BY id", &[])
            .unwrap();
        assert_eq!(out.columns, vec!["name", "joined"]);
        assert_eq!(out.rows[0].get::<String>(0).unwrap(), "Alice");
        assert_eq!(out.rows[0].get::<DbTimestamp>(1).unwrap(), joined);
        assert_eq!(out.rows[1].get::<Option<String>>(0).unwrap(), None);
    }

    #[test]
    fn wide_loads_are_chunked() {
        let db = DbConnection::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE t (a BIGINT, b BIGINT, c BIGINT)")
            .unwrap();
        let rows: Vec<Vec<DbValue>> = (0..1_000_i64)
            .map(|i| vec![i.into(), (i * 2).into(), (i * 3).into()])
            .collect();

        assert_eq!(db.bulk_insert_rows("t", &["a", "b", "c"], &rows).unwrap(), 1_000);
        let sum: i64 = db.query_scalar("SELECT SUM(a) FROM t", &[]).unwrap();
        assert_eq!(sum, 499_500);
    }

    #[test]
    fn ragged_or_empty_input() {
        let db = people();
        assert_eq!(db.bulk_insert_rows("people", &["id"], &[]).unwrap(), 0);
        let err = db
            .bulk_insert_rows("people", &["id", "name"], &[vec![1_i64.into()]])
            .unwrap_err();
        assert!(matches!(err, BackendError::InvalidInput(_)));
    }

    #[test]
    fn empty_result_still_has_columns() {
        let out = people().query("SELECT id, name FROM people", &[]).unwrap();
        assert_eq!(out.columns, vec!["id", "name"]);
        assert!(out.rows.is_empty());
    }

    #[test]
    fn failed_transaction_leaves_no_trace() {
        let db = people();
        let result: Result<(), _> = db.transaction(|tx| {
            tx.execute("INSERT INTO people (id) VALUES (?)", &[7_i64.into()])?;
            Err(BackendError::InvalidInput("abort".into()))
        });
        assert!(matches!(result, Err(BackendError::InvalidInput(_))));
        let n: i64 = db.query_scalar("SELECT COUNT(*) FROM people", &[]).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn identifiers_and_hashes() {
        assert_eq!(quote_ident("Sales Q1"), "\"Sales Q1\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(hash_sql(""), "cbf29ce484222325");
        assert_ne!(hash_sql("SELECT 1"), hash_sql("SELECT 2"));
    }
}
