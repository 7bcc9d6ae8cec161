//! Driver dialects and their registry.
//!
//! A dialect is an [`SqlExecutor`] that overrides the parts of the baseline
//! its backend does differently; everything it does not override is
//! inherited. The registry resolves (driver, major version) to a dialect by
//! exact key match, falling back to the baseline, so an unknown backend or
//! version still works through portable SQL.

use crate::db::executor::{BaselineExecutor, SearchPlan, SqlExecutor};
use crate::db::value::CoercionPolicy;
use crate::models::Page;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Registry of dialect bindings keyed by driver identifier and major version.
pub struct DialectRegistry {
    bindings: RwLock<HashMap<(String, u32), Arc<dyn SqlExecutor>>>,
    baseline: Arc<dyn SqlExecutor>,
}

impl DialectRegistry {
    /// Create a registry preloaded with the built-in dialects.
    pub fn new() -> Self {
        let registry = Self::empty();
        let oracle: Arc<dyn SqlExecutor> = Arc::new(OracleExecutor);
        for version in [0, 8, 9, 10] {
            registry.register("oracle", version, Arc::clone(&oracle));
        }
        registry.register("mysql", 0, Arc::new(MySqlExecutor));
        registry
    }

    /// Create a registry with no bindings (resolution always hits the
    /// baseline).
    pub fn empty() -> Self {
        Self {
            bindings: RwLock::new(HashMap::new()),
            baseline: Arc::new(BaselineExecutor),
        }
    }

    /// Bind a dialect for a driver and major version, replacing any
    /// existing binding for that pair.
    pub fn register(&self, driver: &str, version: u32, executor: Arc<dyn SqlExecutor>) {
        let mut bindings = self
            .bindings
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        bindings.insert((driver.to_string(), version), executor);
    }

    /// Resolve the dialect for a driver and major version.
    ///
    /// Only an exact (driver, version) match returns a dialect; anything
    /// else is the baseline.
    pub fn resolve(&self, driver: &str, version: u32) -> Arc<dyn SqlExecutor> {
        let bindings = self
            .bindings
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(executor) = bindings.get(&(driver.to_string(), version)) {
            return Arc::clone(executor);
        }
        debug!(driver, version, "no dialect binding, using baseline");
        Arc::clone(&self.baseline)
    }
}

impl Default for DialectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Oracle dialect: rownum-based server-side pagination.
pub struct OracleExecutor;

impl SqlExecutor for OracleExecutor {
    fn coercion_policy(&self) -> CoercionPolicy {
        // flags are modeled as NUMBER(1) columns
        CoercionPolicy {
            bool_from_numeric: true,
        }
    }

    /// Wrap the select in a rownum window.
    ///
    /// A non-zero start needs the double wrapper because rownum is assigned
    /// before ordering is visible to the outer filter; the alias column it
    /// introduces rides along in the result set.
    fn search_plan(&self, base_sql: &str, page: Page) -> SearchPlan {
        let sql = if page.start == 0 {
            format!(
                "select * from ( {} ) where rownum <= {}",
                base_sql, page.max
            )
        } else {
            format!(
                "select * from ( select row_.*, rownum rownum_ from ( {} ) row_ \
                 where rownum <= {} ) where rownum_ > {}",
                base_sql,
                page.start as u64 + page.max as u64,
                page.start
            )
        };
        SearchPlan {
            sql,
            server_paged: true,
        }
    }
}

/// MySQL dialect: limit/offset pagination.
pub struct MySqlExecutor;

impl SqlExecutor for MySqlExecutor {
    fn search_plan(&self, base_sql: &str, page: Page) -> SearchPlan {
        let sql = if page.start == 0 {
            format!("{} limit {}", base_sql, page.max)
        } else {
            format!("{} limit {}, {}", base_sql, page.start, page.max)
        };
        SearchPlan {
            sql,
            server_paged: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_exact_version() {
        let registry = DialectRegistry::new();
        let executor = registry.resolve("oracle", 9);
        let plan = executor.search_plan("select * from t", Page::new(0, 5));
        assert!(plan.server_paged);
        assert!(plan.sql.contains("rownum"));
    }

    #[test]
    fn test_resolve_unregistered_version_is_baseline() {
        let registry = DialectRegistry::new();
        // only exact (driver, version) keys bind a dialect
        let plan = registry
            .resolve("oracle", 99)
            .search_plan("select * from t", Page::new(0, 5));
        assert!(!plan.server_paged);
        assert_eq!(plan.sql, "select * from t");
    }

    #[test]
    fn test_resolve_unknown_driver_is_baseline() {
        let registry = DialectRegistry::new();
        let executor = registry.resolve("gbase", 99);
        let plan = executor.search_plan("select * from t", Page::new(3, 5));
        assert_eq!(plan.sql, "select * from t");
        assert!(!plan.server_paged);
    }

    #[test]
    fn test_oracle_plan_first_page() {
        let plan = OracleExecutor.search_plan("select * from t order by id asc", Page::first(10));
        assert_eq!(
            plan.sql,
            "select * from ( select * from t order by id asc ) where rownum <= 10"
        );
    }

    #[test]
    fn test_oracle_plan_offset_page() {
        let plan = OracleExecutor.search_plan("select * from t", Page::new(20, 10));
        assert_eq!(
            plan.sql,
            "select * from ( select row_.*, rownum rownum_ from ( select * from t ) row_ \
             where rownum <= 30 ) where rownum_ > 20"
        );
    }

    #[test]
    fn test_oracle_coerces_numeric_flags() {
        assert!(OracleExecutor.coercion_policy().bool_from_numeric);
        assert!(!MySqlExecutor.coercion_policy().bool_from_numeric);
    }

    #[test]
    fn test_mysql_plan_shapes() {
        assert_eq!(
            MySqlExecutor
                .search_plan("select * from t", Page::first(10))
                .sql,
            "select * from t limit 10"
        );
        assert_eq!(
            MySqlExecutor
                .search_plan("select * from t", Page::new(20, 10))
                .sql,
            "select * from t limit 20, 10"
        );
    }

    #[test]
    fn test_register_overrides_binding() {
        let registry = DialectRegistry::empty();
        assert!(!registry
            .resolve("mysql", 0)
            .search_plan("select * from t", Page::first(1))
            .server_paged);
        registry.register("mysql", 0, Arc::new(MySqlExecutor));
        assert!(registry
            .resolve("mysql", 0)
            .search_plan("select * from t", Page::first(1))
            .server_paged);
        // a binding covers only its own version
        assert!(!registry
            .resolve("mysql", 5)
            .search_plan("select * from t", Page::first(1))
            .server_paged);
    }
}
