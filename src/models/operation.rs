//! Operation descriptors: the structured form of a pending statement.
//!
//! A descriptor carries everything needed to generate SQL - table, ordered
//! column data, an optional free-text condition fragment with `?`
//! placeholders, the positional bind values for that fragment, ordering and
//! grouping fragments, and pagination bounds. Bind-value count and order
//! matching the placeholders is a caller contract; mismatches surface as
//! driver errors, not as validation here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default maximum row count for searches that do not specify one.
pub const DEFAULT_MAX_ROWS: u32 = 1000;

/// A literal value bound to a `?` placeholder or written to a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BindValue {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    Text(String),
    /// Binary data (base64 encoded in JSON)
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
    /// Point in time; bound in RFC 3339 text form
    Instant(DateTime<Utc>),
}

impl BindValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the kind name of this value for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Instant(_) => "instant",
        }
    }
}

impl From<&str> for BindValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for BindValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for BindValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for BindValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<bool> for BindValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<DateTime<Utc>> for BindValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Instant(v)
    }
}

/// Custom serialization for binary data as base64.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(bytes).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Pagination bounds: skip `start` rows, return at most `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub start: u32,
    pub max: u32,
}

impl Page {
    /// Create pagination bounds.
    pub fn new(start: u32, max: u32) -> Self {
        Self { start, max }
    }

    /// First `max` rows.
    pub fn first(max: u32) -> Self {
        Self { start: 0, max }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            start: 0,
            max: DEFAULT_MAX_ROWS,
        }
    }
}

/// How an insert reports its generated key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyReturn {
    /// No key requested; insert returns 0.
    None,
    /// Read the driver-reported auto-generated key.
    Generated,
    /// Append a RETURNING clause for these columns and read the first one.
    Columns(Vec<String>),
}

/// Descriptor for a paginated search.
#[derive(Debug, Clone)]
pub struct SearchOp {
    pub table: String,
    /// Columns to select; `None` selects `*`.
    pub cols: Option<Vec<String>>,
    /// Free-text condition fragment with `?` placeholders.
    pub condition: Option<String>,
    /// Positional values for the condition placeholders, in order.
    pub cond_values: Vec<BindValue>,
    pub order_by: Option<String>,
    pub group_by: Option<String>,
    /// Ascending order when true.
    pub ascending: bool,
    pub page: Page,
}

impl SearchOp {
    /// Create a full-table search descriptor with default pagination.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            cols: None,
            condition: None,
            cond_values: Vec::new(),
            order_by: None,
            group_by: None,
            ascending: true,
            page: Page::default(),
        }
    }

    /// Select only the given columns.
    pub fn with_cols<I, S>(mut self, cols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cols = Some(cols.into_iter().map(Into::into).collect());
        self
    }

    /// Set the condition fragment and its positional bind values.
    pub fn with_condition(
        mut self,
        condition: impl Into<String>,
        values: Vec<BindValue>,
    ) -> Self {
        self.condition = Some(condition.into());
        self.cond_values = values;
        self
    }

    /// Set the ordering fragment.
    pub fn with_order_by(mut self, order_by: impl Into<String>, ascending: bool) -> Self {
        self.order_by = Some(order_by.into());
        self.ascending = ascending;
        self
    }

    /// Set the grouping fragment.
    pub fn with_group_by(mut self, group_by: impl Into<String>) -> Self {
        self.group_by = Some(group_by.into());
        self
    }

    /// Set the pagination bounds.
    pub fn with_page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }
}
