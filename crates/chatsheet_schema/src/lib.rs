//! Schema inference and registry for ChatSheet.
//!
//! # Modules
//!
//! - [`types`]: `ColumnType`, `ColumnProfile`, `TableSchema`, `SchemaChange`
//! - [`infer`]: column type inference over raw CSV rows
//! - [`coerce`]: per-type parsers turning raw text into typed values
//! - [`registry`]: case-insensitive table registry owned by a session
//! - [`ident`]: table identifier rules and reserved words

pub mod coerce;
pub mod error;
pub mod ident;
pub mod infer;
pub mod registry;
pub mod types;

pub use coerce::{coerce_rows, coerce_value, is_null};
pub use error::SchemaError;
pub use ident::{is_reserved_word, validate_table_name, MAX_IDENTIFIER_LEN, RESERVED_WORDS};
pub use infer::{infer, infer_columns};
pub use registry::SchemaRegistry;
pub use types::{ColumnProfile, ColumnType, SchemaChange, TableSchema, TypeChange};
