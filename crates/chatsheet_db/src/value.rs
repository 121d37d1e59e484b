//! Cell values, rows and result sets.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::backend::BackendError;

/// A UTC instant. DuckDB `TIMESTAMP` has no zone, so naive CSV datetimes are
/// read as UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DbTimestamp(chrono::DateTime<chrono::Utc>);

impl DbTimestamp {
    pub fn from_rfc3339(value: &str) -> Result<Self, BackendError> {
        chrono::DateTime::parse_from_rfc3339(value)
            .map(|dt| Self(dt.with_timezone(&chrono::Utc)))
            .map_err(|e| BackendError::Conversion(format!("'{value}' is not RFC 3339: {e}")))
    }

    pub fn from_naive_utc(value: chrono::NaiveDateTime) -> Self {
        Self(value.and_utc())
    }

    pub fn from_unix_micros(micros: i64) -> Option<Self> {
        chrono::DateTime::from_timestamp_micros(micros).map(Self)
    }

    pub fn unix_micros(&self) -> i64 {
        self.0.timestamp_micros()
    }

    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }
}

impl fmt::Display for DbTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.format("%Y-%m-%d %H:%M:%S").fmt(f)
    }
}

impl Serialize for DbTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0.to_rfc3339())
    }
}

/// One cell, either bound as a parameter or read back from a result.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Boolean(bool),
    Timestamp(DbTimestamp),
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    fn kind(&self) -> &'static str {
        match self {
            DbValue::Null => "NULL",
            DbValue::Integer(_) => "integer",
            DbValue::Real(_) => "real",
            DbValue::Text(_) => "text",
            DbValue::Blob(_) => "blob",
            DbValue::Boolean(_) => "boolean",
            DbValue::Timestamp(_) => "timestamp",
        }
    }
}

/// Renders the way results are shown to users and in summaries; `NULL` for nulls.
impl fmt::Display for DbValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbValue::Null => f.write_str("NULL"),
            DbValue::Integer(v) => v.fmt(f),
            DbValue::Real(v) => v.fmt(f),
            DbValue::Text(v) => f.write_str(v),
            DbValue::Blob(v) => write!(f, "<{} bytes>", v.len()),
            DbValue::Boolean(v) => v.fmt(f),
            DbValue::Timestamp(v) => v.fmt(f),
        }
    }
}

impl Serialize for DbValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DbValue::Null => serializer.serialize_unit(),
            DbValue::Integer(v) => serializer.serialize_i64(*v),
            DbValue::Real(v) => serializer.serialize_f64(*v),
            DbValue::Text(v) => serializer.serialize_str(v),
            DbValue::Blob(v) => serializer.serialize_bytes(v),
            DbValue::Boolean(v) => serializer.serialize_bool(*v),
            DbValue::Timestamp(v) => v.serialize(serializer),
        }
    }
}

macro_rules! into_db_value {
    ($($ty:ty => |$v:ident| $body:expr),* $(,)?) => {
        $(impl From<$ty> for DbValue {
            fn from($v: $ty) -> Self {
                $body
            }
        })*
    };
}

into_db_value! {
    i32 => |v| DbValue::Integer(i64::from(v)),
    i64 => |v| DbValue::Integer(v),
    f64 => |v| DbValue::Real(v),
    bool => |v| DbValue::Boolean(v),
    String => |v| DbValue::Text(v),
    &str => |v| DbValue::Text(v.to_owned()),
    DbTimestamp => |v| DbValue::Timestamp(v),
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(DbValue::Null, Into::into)
    }
}

/// Typed read of a cell. Non-`Option` targets reject NULL.
pub trait FromDbValue: Sized {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError>;
}

fn mismatch<T>(wanted: &str, got: &DbValue) -> Result<T, BackendError> {
    let hint = if got.is_null() {
        " (read nullable columns as Option)"
    } else {
        ""
    };
    Err(BackendError::Conversion(format!(
        "expected {wanted}, found {}{hint}",
        got.kind()
    )))
}

impl FromDbValue for DbValue {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        Ok(value.clone())
    }
}

impl FromDbValue for i64 {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Integer(v) => Ok(*v),
            other => mismatch("integer", other),
        }
    }
}

impl FromDbValue for f64 {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Real(v) => Ok(*v),
            DbValue::Integer(v) => Ok(*v as f64),
            other => mismatch("real", other),
        }
    }
}

impl FromDbValue for bool {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Boolean(v) => Ok(*v),
            other => mismatch("boolean", other),
        }
    }
}

impl FromDbValue for String {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Text(v) => Ok(v.clone()),
            other => mismatch("text", other),
        }
    }
}

impl FromDbValue for DbTimestamp {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        match value {
            DbValue::Timestamp(v) => Ok(*v),
            DbValue::Text(v) => DbTimestamp::from_rfc3339(v),
            other => mismatch("timestamp", other),
        }
    }
}

impl<T: FromDbValue> FromDbValue for Option<T> {
    fn from_db_value(value: &DbValue) -> Result<Self, BackendError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_db_value(value).map(Some)
        }
    }
}

/// A result row. Rows of one result share their column list.
#[derive(Debug, Clone, PartialEq)]
pub struct DbRow {
    columns: Arc<[String]>,
    values: Vec<DbValue>,
}

impl DbRow {
    pub fn new(columns: impl Into<Arc<[String]>>, values: Vec<DbValue>) -> Self {
        Self {
            columns: columns.into(),
            values,
        }
    }

    pub fn get<T: FromDbValue>(&self, index: usize) -> Result<T, BackendError> {
        match self.values.get(index) {
            Some(value) => T::from_db_value(value),
            None => Err(BackendError::Conversion(format!(
                "row has {} columns, no index {index}",
                self.values.len()
            ))),
        }
    }

    pub fn get_raw(&self, index: usize) -> Option<&DbValue> {
        self.values.get(index)
    }

    /// Cell for `column`, matched exactly.
    pub fn value(&self, column: &str) -> Option<&DbValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DbValue)> {
        self.columns.iter().map(String::as_str).zip(&self.values)
    }
}

/// Serialized as a JSON object in column order.
impl Serialize for DbRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Columns and rows of one statement. Columns are known even for an empty result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<DbRow>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_serializes_in_column_order() {
        let row = DbRow::new(
            vec!["name".to_string(), "id".to_string(), "note".to_string()],
            vec![DbValue::from("Alice"), DbValue::from(1_i64), DbValue::Null],
        );
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"name":"Alice","id":1,"note":null}"#
        );
    }

    #[test]
    fn null_needs_option() {
        let row = DbRow::new(vec!["age".to_string()], vec![DbValue::Null]);
        let err = row.get::<i64>(0).unwrap_err();
        assert!(err.to_string().contains("Option"), "{err}");
        assert_eq!(row.get::<Option<i64>>(0).unwrap(), None);
        assert!(row.get::<i64>(3).is_err());
    }

    #[test]
    fn display_matches_result_rendering() {
        let ts = DbTimestamp::from_rfc3339("2024-05-31T12:30:00Z").unwrap();
        assert_eq!(DbValue::from(ts).to_string(), "2024-05-31 12:30:00");
        assert_eq!(DbValue::Null.to_string(), "NULL");
        assert_eq!(DbValue::from(2.5).to_string(), "2.5");
        assert_eq!(DbValue::from(None::<i64>), DbValue::Null);
    }
}
