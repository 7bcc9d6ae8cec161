//! Error types for the data-access layer.
//!
//! All errors use `thiserror` for ergonomic handling. Expected business
//! conditions (row not found, row not unique, record already exists) are
//! explicit variants so callers can match on them instead of parsing
//! messages; programmer errors (`InvalidArgument`) are meant to fail fast.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("Connection pool '{pool}' is not configured")]
    PoolNotConfigured { pool: String },

    #[error("Connection pool '{pool}' exhausted: no connection free within {wait_secs}s")]
    PoolExhausted { pool: String, wait_secs: u64 },

    #[error("Connection failed: {message}")]
    Connection { message: String },

    #[error("No matching row found in '{table}' [{sql}]")]
    RowNotFound { table: String, sql: String },

    #[error("More than one matching row in '{table}' [{sql}]")]
    RowNotUnique { table: String, sql: String },

    #[error("A matching record already exists in '{table}'")]
    AlreadyExists { table: String },

    #[error("Statement execution failed: {message} [sql: {sql}; elapsed: {elapsed_ms}ms]")]
    Execution {
        message: String,
        sql: String,
        elapsed_ms: u64,
    },

    #[error("Failed to decode column '{column}': {message}")]
    Decode { column: String, message: String },
}

impl DbError {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a pool-not-configured error.
    pub fn pool_not_configured(pool: impl Into<String>) -> Self {
        Self::PoolNotConfigured { pool: pool.into() }
    }

    /// Create a pool-exhausted error.
    pub fn pool_exhausted(pool: impl Into<String>, wait_secs: u64) -> Self {
        Self::PoolExhausted {
            pool: pool.into(),
            wait_secs,
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a row-not-found error.
    pub fn row_not_found(table: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::RowNotFound {
            table: table.into(),
            sql: sql.into(),
        }
    }

    /// Create a row-not-unique error.
    pub fn row_not_unique(table: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::RowNotUnique {
            table: table.into(),
            sql: sql.into(),
        }
    }

    /// Create an already-exists error.
    pub fn already_exists(table: impl Into<String>) -> Self {
        Self::AlreadyExists {
            table: table.into(),
        }
    }

    /// Create an execution error carrying the generated SQL and elapsed time.
    pub fn execution(message: impl Into<String>, sql: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Execution {
            message: message.into(),
            sql: sql.into(),
            elapsed_ms,
        }
    }

    /// Create a decode error for a result-set column.
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Check whether this error is an expected business condition rather
    /// than a failure (callers are expected to handle these).
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::RowNotFound { .. } | Self::RowNotUnique { .. } | Self::AlreadyExists { .. }
        )
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::pool_not_configured("p1");
        assert!(err.to_string().contains("p1"));
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn test_execution_error_carries_sql_and_elapsed() {
        let err = DbError::execution("syntax error", "select * from t", 12);
        let msg = err.to_string();
        assert!(msg.contains("select * from t"));
        assert!(msg.contains("12ms"));
    }

    #[test]
    fn test_expected_conditions() {
        assert!(DbError::row_not_found("t", "select").is_expected());
        assert!(DbError::row_not_unique("t", "select").is_expected());
        assert!(DbError::already_exists("t").is_expected());
        assert!(!DbError::invalid_argument("bad").is_expected());
        assert!(!DbError::pool_exhausted("p", 10).is_expected());
    }
}
