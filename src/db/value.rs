//! Result-set value coercion.
//!
//! The `Any` driver surfaces a small closed set of wire types; everything a
//! backend returns is folded into [`DbValue`] here so callers never see
//! driver-specific types. Declared type names drive the mapping, with a
//! best-effort fallback chain for types the driver reports loosely.

use crate::error::{DbError, DbResult};
use crate::models::{DbRow, DbValue};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::any::AnyRow;
use sqlx::{Column, Row, TypeInfo};

/// Broad category of a declared column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Boolean,
    Integer,
    Decimal,
    Text,
    Binary,
    Instant,
    Other,
}

/// Categorize a declared type name (case-insensitive).
pub fn categorize(type_name: &str) -> TypeCategory {
    let name = type_name.to_uppercase();
    if name.contains("BOOL") {
        TypeCategory::Boolean
    } else if name.contains("INT") {
        TypeCategory::Integer
    } else if name.contains("CHAR") || name.contains("TEXT") || name.contains("CLOB") {
        TypeCategory::Text
    } else if name.contains("BLOB") || name.contains("BINARY") || name.contains("BYTEA") {
        TypeCategory::Binary
    } else if name.contains("DATE") || name.contains("TIME") {
        TypeCategory::Instant
    } else if name.contains("REAL")
        || name.contains("FLOAT")
        || name.contains("DOUBLE")
        || name.contains("DEC")
        || name.contains("NUM")
    {
        TypeCategory::Decimal
    } else {
        TypeCategory::Other
    }
}

/// Per-dialect value coercion knobs.
///
/// Backends without a native boolean type model flags as single-digit
/// numeric columns; a dialect that knows this opts in to mapping such
/// columns' 0/1 values to booleans.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoercionPolicy {
    /// Map 0/1 values of precision-1 numeric columns to booleans.
    pub bool_from_numeric: bool,
}

impl CoercionPolicy {
    fn wants_bool(&self, type_name: &str, category: TypeCategory) -> bool {
        self.bool_from_numeric
            && matches!(category, TypeCategory::Integer | TypeCategory::Decimal)
            && (type_name.contains("(1)") || type_name.contains("(1,0)"))
    }
}

/// Decode a full row into named (column, value) pairs in result-set order.
pub fn decode_row(row: &AnyRow, policy: &CoercionPolicy) -> DbResult<DbRow> {
    (0..row.len())
        .map(|i| {
            let name = row.column(i).name().to_string();
            decode_column(row, i, policy).map(|v| (name, v))
        })
        .collect()
}

/// Decode a full row positionally, aligned to the result-set column order.
pub fn decode_positional(row: &AnyRow, policy: &CoercionPolicy) -> DbResult<Vec<DbValue>> {
    (0..row.len())
        .map(|i| decode_column(row, i, policy))
        .collect()
}

/// Decode a single column into a normalized value.
pub fn decode_column(row: &AnyRow, idx: usize, policy: &CoercionPolicy) -> DbResult<DbValue> {
    let column = row.column(idx);
    let name = column.name().to_string();
    let type_name = column.type_info().name().to_string();
    let category = categorize(&type_name);

    let value = match category {
        TypeCategory::Boolean => row
            .try_get::<Option<bool>, _>(idx)
            .map(|v| v.map_or(DbValue::Null, DbValue::Bool)),
        TypeCategory::Integer => row
            .try_get::<Option<i64>, _>(idx)
            .map(|v| coerce_int(v, &type_name, category, policy)),
        TypeCategory::Decimal => row
            .try_get::<Option<f64>, _>(idx)
            .map(|v| coerce_decimal(v, &type_name, category, policy)),
        TypeCategory::Text => row
            .try_get::<Option<String>, _>(idx)
            .map(|v| v.map_or(DbValue::Null, DbValue::Text)),
        TypeCategory::Binary => row
            .try_get::<Option<Vec<u8>>, _>(idx)
            .map(|v| v.map_or(DbValue::Null, |b| decode_binary_value(&b))),
        TypeCategory::Instant => row
            .try_get::<Option<String>, _>(idx)
            .map(|v| v.map_or(DbValue::Null, |s| parse_instant(&s))),
        TypeCategory::Other => return Ok(decode_fallback(row, idx)),
    };

    value.map_err(|e| DbError::decode(name, e.to_string()))
}

fn coerce_int(
    value: Option<i64>,
    type_name: &str,
    category: TypeCategory,
    policy: &CoercionPolicy,
) -> DbValue {
    match value {
        None => DbValue::Null,
        Some(v @ (0 | 1)) if policy.wants_bool(type_name, category) => DbValue::Bool(v == 1),
        Some(v) => DbValue::Int(v),
    }
}

/// Precision-1 numeric flags land here too: NUMBER(1) categorizes as
/// decimal, so the boolean policy has to apply on this path as well.
fn coerce_decimal(
    value: Option<f64>,
    type_name: &str,
    category: TypeCategory,
    policy: &CoercionPolicy,
) -> DbValue {
    match value {
        None => DbValue::Null,
        Some(v)
            if (v == 0.0 || v == 1.0) && policy.wants_bool(type_name, category) =>
        {
            DbValue::Bool(v == 1.0)
        }
        Some(v) => DbValue::Decimal(v),
    }
}

/// Binary payloads become text: UTF-8 when valid, base64 otherwise.
fn decode_binary_value(bytes: &[u8]) -> DbValue {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    match std::str::from_utf8(bytes) {
        Ok(s) => DbValue::Text(s.to_string()),
        Err(_) => DbValue::Text(STANDARD.encode(bytes)),
    }
}

/// Parse a temporal column delivered as text.
///
/// RFC 3339 first, then the common space-separated form taken as UTC. Text
/// that parses as neither is passed through unchanged.
fn parse_instant(s: &str) -> DbValue {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return DbValue::Instant(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return DbValue::Instant(naive.and_utc());
    }
    DbValue::Text(s.to_string())
}

/// Last-resort decode for loosely typed columns.
fn decode_fallback(row: &AnyRow, idx: usize) -> DbValue {
    if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
        return DbValue::Int(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
        return DbValue::Decimal(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
        return DbValue::Text(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return decode_binary_value(&v);
    }
    DbValue::Null
}
