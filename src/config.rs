//! Configuration for pools and backends.
//!
//! `DbSettings` is the external configuration surface: a database type tag
//! plus connection attributes. The URL/driver resolver in [`crate::db::url`]
//! derives the driver identifier and connection URL from it; callers must
//! supply host/port/path explicitly, there is no discovery.

use crate::db::url::DbKind;
use std::collections::HashMap;
use std::path::PathBuf;

// Pool configuration defaults. The acquire wait and idle eviction thresholds
// are part of the pool contract: a borrow blocks at most 10 seconds before
// failing, idle connections older than 5 minutes are evicted.
pub const DEFAULT_MAX_ACTIVE: u32 = 10;
pub const DEFAULT_MAX_ACTIVE_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

/// Connection pool configuration options.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    /// Maximum active connections (default: 10, 1 for SQLite)
    pub max_active: Option<u32>,
    /// Minimum idle connections kept open (default: 0)
    pub min_connections: Option<u32>,
    /// Bounded wait for a free slot in seconds (default: 10)
    pub acquire_timeout_secs: Option<u64>,
    /// Idle eviction threshold in seconds (default: 300)
    pub idle_timeout_secs: Option<u64>,
    /// Whether to validate liveness before handing a connection out (default: true)
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    /// Get max_active with default value based on database type.
    pub fn max_active_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_active.unwrap_or(if is_sqlite {
            DEFAULT_MAX_ACTIVE_SQLITE
        } else {
            DEFAULT_MAX_ACTIVE
        })
    }

    /// Get min_connections with default value.
    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    /// Get acquire_timeout with default value.
    pub fn acquire_timeout_or_default(&self) -> u64 {
        self.acquire_timeout_secs
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS)
    }

    /// Get idle_timeout with default value.
    pub fn idle_timeout_or_default(&self) -> u64 {
        self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS)
    }

    /// Get test_before_acquire with default value.
    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_active {
            if max == 0 {
                return Err("max_active must be greater than 0".to_string());
            }
            if let Some(min) = self.min_connections {
                if min > max {
                    return Err(format!(
                        "min_connections ({}) cannot exceed max_active ({})",
                        min, max
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Reserved extended-parameter key for the secondary host of a clustered backend.
pub const EXT_RAC_HOST: &str = "RAC_IP";
/// Reserved extended-parameter key for the secondary port of a clustered backend.
pub const EXT_RAC_PORT: &str = "RAC_PORT";

/// Backend configuration supplied by an external configuration loader.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DbSettings {
    /// Database product tag.
    pub kind: DbKind,
    /// Logical pool name this backend registers under.
    pub pool_name: String,
    pub host: String,
    pub port: u16,
    /// Database name, service name, or file path depending on the backend.
    pub db_path: String,
    pub user: String,
    /// Sensitive - never log
    #[serde(skip_serializing)]
    pub password: String,
    pub charset: Option<String>,
    /// Major server version used for dialect resolution (0 when unknown).
    #[serde(default)]
    pub major_version: Option<u32>,
    /// Extended parameters for clustered variants (reserved keys
    /// [`EXT_RAC_HOST`] / [`EXT_RAC_PORT`]).
    #[serde(default)]
    pub ext: HashMap<String, String>,
    /// Base directory for resolving relative file paths of embedded backends.
    #[serde(default)]
    pub base_dir: Option<PathBuf>,
    #[serde(default)]
    pub pool_options: PoolOptions,
}

impl DbSettings {
    /// Create settings with defaults for the optional fields.
    pub fn new(
        kind: DbKind,
        pool_name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        db_path: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            pool_name: pool_name.into(),
            host: host.into(),
            port,
            db_path: db_path.into(),
            user: user.into(),
            password: password.into(),
            charset: None,
            major_version: None,
            ext: HashMap::new(),
            base_dir: None,
            pool_options: PoolOptions::default(),
        }
    }

    /// Set the character set.
    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Set the major server version for dialect resolution.
    pub fn with_major_version(mut self, version: u32) -> Self {
        self.major_version = Some(version);
        self
    }

    /// Add an extended parameter.
    pub fn with_ext(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ext.insert(key.into(), value.into());
        self
    }

    /// Set the base directory for relative file paths.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Set the pool options.
    pub fn with_pool_options(mut self, options: PoolOptions) -> Self {
        self.pool_options = options;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_options_defaults() {
        let opts = PoolOptions::default();
        assert_eq!(opts.max_active_or_default(false), DEFAULT_MAX_ACTIVE);
        assert_eq!(opts.max_active_or_default(true), DEFAULT_MAX_ACTIVE_SQLITE);
        assert_eq!(opts.acquire_timeout_or_default(), 10);
        assert_eq!(opts.idle_timeout_or_default(), 300);
        assert!(opts.test_before_acquire_or_default());
    }

    #[test]
    fn test_pool_options_validate() {
        let opts = PoolOptions {
            max_active: Some(0),
            ..Default::default()
        };
        assert!(opts.validate().is_err());

        let opts = PoolOptions {
            max_active: Some(2),
            min_connections: Some(5),
            ..Default::default()
        };
        assert!(opts.validate().is_err());

        assert!(PoolOptions::default().validate().is_ok());
    }

    #[test]
    fn test_settings_builder() {
        let settings = DbSettings::new(
            DbKind::MySql,
            "biz",
            "127.0.0.1",
            3306,
            "app",
            "root",
            "secret",
        )
        .with_charset("utf8")
        .with_ext(EXT_RAC_HOST, "10.0.0.2");

        assert_eq!(settings.pool_name, "biz");
        assert_eq!(settings.charset.as_deref(), Some("utf8"));
        assert_eq!(settings.ext.get(EXT_RAC_HOST).map(String::as_str), Some("10.0.0.2"));
    }
}
