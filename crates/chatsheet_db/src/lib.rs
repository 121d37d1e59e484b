//! Embedded DuckDB access layer for ChatSheet.
//!
//! All SQL issued by the workspace goes through [`DbConnection`]: statements
//! built internally (DDL for loads, catalog lookups) and user or model SQL
//! that has already passed validation.
//!
//! ```rust,ignore
//! use chatsheet_db::{DbConnection, DbValue};
//!
//! let conn = DbConnection::open_in_memory()?;
//! conn.execute_batch("CREATE TABLE people (id BIGINT, name VARCHAR)")?;
//! conn.bulk_insert_rows("people", &["id", "name"], &[vec![1.into(), "Alice".into()]])?;
//! let total: i64 = conn.query_scalar("SELECT COUNT(*) FROM people", &[])?;
//! ```

pub mod backend;
pub mod lock;
pub mod value;

pub use backend::{
    hash_sql, quote_ident, BackendError, DbConnection, DbTransaction, MAX_INSERT_PARAMS,
};
pub use lock::{lock_file_for, LockError, WriterLock};
pub use value::{DbRow, DbTimestamp, DbValue, FromDbValue, QueryOutput};
