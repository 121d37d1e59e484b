//! Raw CSV text to typed values.
//!
//! One parser per [`ColumnType`]. Inference and loading share these parsers,
//! so a value that made a column `integer` during inference always coerces to
//! an integer during load.

use chatsheet_db::{DbTimestamp, DbValue};
use chrono::{NaiveDate, NaiveDateTime};

use crate::error::SchemaError;
use crate::types::{ColumnType, TableSchema};

/// Naive datetime layouts accepted besides RFC 3339. `%.f` makes the
/// fractional seconds optional.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Date-only layouts; the value becomes midnight UTC.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// A cell is null when it is missing, empty or whitespace-only.
pub fn is_null(raw: Option<&str>) -> bool {
    raw.map_or(true, |v| v.trim().is_empty())
}

/// Optional sign followed by ASCII digits, within `i64`.
pub fn parse_integer(raw: &str) -> Option<i64> {
    let value = raw.trim();
    let digits = value
        .strip_prefix('-')
        .or_else(|| value.strip_prefix('+'))
        .unwrap_or(value);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse::<i64>().ok()
}

/// Any finite `f64`.
pub fn parse_float(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_boolean(raw: &str) -> Option<bool> {
    let value = raw.trim();
    const TRUE: [&str; 4] = ["true", "t", "yes", "y"];
    const FALSE: [&str; 4] = ["false", "f", "no", "n"];
    if TRUE.iter().any(|t| value.eq_ignore_ascii_case(t)) {
        Some(true)
    } else if FALSE.iter().any(|f| value.eq_ignore_ascii_case(f)) {
        Some(false)
    } else {
        None
    }
}

pub fn parse_datetime(raw: &str) -> Option<DbTimestamp> {
    let value = raw.trim();
    if let Ok(ts) = DbTimestamp::from_rfc3339(value) {
        return Some(ts);
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(DbTimestamp::from_naive_utc(dt));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0).map(DbTimestamp::from_naive_utc);
        }
    }
    None
}

/// Whether `raw` (non-null) is acceptable for `ty`.
pub fn accepts(ty: ColumnType, raw: &str) -> bool {
    coerce_value(ty, raw).is_some()
}

/// Convert one non-null raw value. `None` means the value does not fit `ty`.
pub fn coerce_value(ty: ColumnType, raw: &str) -> Option<DbValue> {
    match ty {
        ColumnType::Integer => parse_integer(raw).map(DbValue::Integer),
        ColumnType::Float => parse_float(raw).map(DbValue::Real),
        ColumnType::Boolean => parse_boolean(raw).map(DbValue::Boolean),
        ColumnType::DateTime => parse_datetime(raw).map(DbValue::Timestamp),
        ColumnType::Text => Some(DbValue::Text(raw.to_string())),
    }
}

/// Coerce every row against `schema`.
///
/// Rows are matched to columns by position; short rows are padded with nulls.
/// Row numbers in errors are 1-based data rows (the header is not counted).
pub fn coerce_rows(
    schema: &TableSchema,
    rows: &[Vec<String>],
) -> Result<Vec<Vec<DbValue>>, SchemaError> {
    let columns = schema.columns();
    let mut out = Vec::with_capacity(rows.len());

    for (index, row) in rows.iter().enumerate() {
        let row_number = index + 1;
        if row.len() > columns.len() {
            return Err(SchemaError::RaggedRow {
                row: row_number,
                cells: row.len(),
                expected: columns.len(),
            });
        }

        let mut values = Vec::with_capacity(columns.len());
        for (col_index, column) in columns.iter().enumerate() {
            let raw = row.get(col_index).map(String::as_str);
            if is_null(raw) {
                if !column.nullable {
                    return Err(SchemaError::NullInNotNull {
                        row: row_number,
                        column: column.name.clone(),
                    });
                }
                values.push(DbValue::Null);
                continue;
            }
            let raw = raw.unwrap_or_default();
            let value = coerce_value(column.inferred_type, raw).ok_or_else(|| {
                SchemaError::Coercion {
                    row: row_number,
                    column: column.name.clone(),
                    value: raw.to_string(),
                    target: column.inferred_type,
                }
            })?;
            values.push(value);
        }
        out.push(values);
    }

    Ok(out)
}
