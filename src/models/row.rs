//! Normalized row results.
//!
//! Every value read from a result set is coerced into one of a closed set of
//! kinds before it reaches the caller, so callers never see driver-specific
//! types. A row is either a [`DbRow`] (ordered name/value pairs) or a
//! positional `Vec<DbValue>` aligned to the requested column list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A normalized column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DbValue {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(f64),
    Text(String),
    Instant(DateTime<Utc>),
}

impl DbValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the integer value, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the text value, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Get the boolean value, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the decimal value, if this is a decimal.
    pub fn as_decimal(&self) -> Option<f64> {
        match self {
            Self::Decimal(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the instant value, if this is an instant.
    pub fn as_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Instant(v) => Some(*v),
            _ => None,
        }
    }
}

/// One fetched row as an ordered association list of (column, value).
///
/// Order follows the result set, so it matches the requested column list
/// when one was given. Lookup by name is linear; rows are small.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DbRow(Vec<(String, DbValue)>);

impl DbRow {
    /// Create an empty row.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a column value.
    pub fn push(&mut self, name: impl Into<String>, value: DbValue) {
        self.0.push((name.into(), value));
    }

    /// Look up a value by column name (first match).
    pub fn get(&self, name: &str) -> Option<&DbValue> {
        self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over (name, value) pairs in result-set order.
    pub fn iter(&self) -> impl Iterator<Item = &(String, DbValue)> {
        self.0.iter()
    }

    /// Consume the row into its pairs.
    pub fn into_pairs(self) -> Vec<(String, DbValue)> {
        self.0
    }

    /// Column names in result-set order.
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|(n, _)| n.as_str()).collect()
    }
}

impl FromIterator<(String, DbValue)> for DbRow {
    fn from_iter<T: IntoIterator<Item = (String, DbValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        assert!(DbValue::Null.is_null());
        assert_eq!(DbValue::Int(7).as_int(), Some(7));
        assert_eq!(DbValue::Text("a".into()).as_text(), Some("a"));
        assert_eq!(DbValue::Bool(true).as_bool(), Some(true));
        assert_eq!(DbValue::Int(7).as_text(), None);
    }

    #[test]
    fn test_value_json_is_untagged() {
        assert_eq!(serde_json::to_string(&DbValue::Int(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&DbValue::Null).unwrap(), "null");
        assert_eq!(
            serde_json::to_string(&DbValue::Text("a".into())).unwrap(),
            "\"a\""
        );
    }

    #[test]
    fn test_row_preserves_order() {
        let mut row = DbRow::new();
        row.push("id", DbValue::Int(1));
        row.push("name", DbValue::Text("a".into()));

        assert_eq!(row.names(), vec!["id", "name"]);
        assert_eq!(row.get("name"), Some(&DbValue::Text("a".into())));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.len(), 2);
    }
}
