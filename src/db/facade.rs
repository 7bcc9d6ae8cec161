//! High-level data source facade.
//!
//! [`DataSource`] hides the connection lifecycle: each call borrows a
//! connection from its pool, runs, and returns it. Reads run on a plain
//! connection; writes run inside a transaction that commits on success and
//! rolls back when the statement fails. Shared infrastructure (the pool
//! registry and dialect registry) lives in [`DbContext`] and is injected,
//! not global.

use crate::config::DbSettings;
use crate::db::dialect::DialectRegistry;
use crate::db::executor::SqlExecutor;
use crate::db::pool::PoolManager;
use crate::db::url::{build_url, DbKind};
use crate::error::{DbError, DbResult};
use crate::models::{BindValue, DbRow, DbValue, KeyReturn, SearchOp};
use sqlx::pool::PoolConnection;
use sqlx::{Acquire, Any, Transaction};
use std::sync::{Arc, RwLock};
use tracing::{error, info};

/// Shared infrastructure for all data sources of a process.
pub struct DbContext {
    pub pools: Arc<PoolManager>,
    pub dialects: Arc<DialectRegistry>,
}

impl DbContext {
    /// Create a context with an empty pool registry and the built-in
    /// dialects.
    pub fn new() -> Self {
        Self {
            pools: Arc::new(PoolManager::new()),
            dialects: Arc::new(DialectRegistry::new()),
        }
    }
}

impl Default for DbContext {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle to one configured backend.
///
/// Cheap to use from many tasks: it holds no connection, only the pool name
/// and the resolved execution strategy.
pub struct DataSource {
    pool_name: String,
    pools: Arc<PoolManager>,
    executor: RwLock<Arc<dyn SqlExecutor>>,
}

impl DataSource {
    /// Register the backend's pool (first-wins) and resolve its dialect.
    ///
    /// The pool is lazy, so this succeeds even when the backend is down;
    /// the first statement surfaces the failure.
    pub async fn connect(ctx: &DbContext, settings: &DbSettings) -> DbResult<Self> {
        let url = build_url(settings);
        let is_sqlite = settings.kind == DbKind::Sqlite;
        ctx.pools
            .configure(&settings.pool_name, &url, &settings.pool_options, is_sqlite)
            .await?;
        let executor = ctx.dialects.resolve(
            settings.kind.driver_id(),
            settings.major_version.unwrap_or(0),
        );
        info!(
            pool = %settings.pool_name,
            driver = %settings.kind.driver_id(),
            "data source ready"
        );
        Ok(Self {
            pool_name: settings.pool_name.clone(),
            pools: Arc::clone(&ctx.pools),
            executor: RwLock::new(executor),
        })
    }

    /// Logical pool name this data source borrows from.
    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }

    /// Replace the execution strategy, e.g. after learning the exact
    /// server version.
    pub fn set_dialect(&self, executor: Arc<dyn SqlExecutor>) {
        let mut guard = self
            .executor
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = executor;
    }

    fn executor(&self) -> Arc<dyn SqlExecutor> {
        Arc::clone(
            &self
                .executor
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }

    async fn acquire(&self) -> DbResult<PoolConnection<Any>> {
        self.pools.acquire(&self.pool_name).await
    }

    async fn begin<'c>(
        conn: &'c mut PoolConnection<Any>,
    ) -> DbResult<Transaction<'c, Any>> {
        conn.begin()
            .await
            .map_err(|e| DbError::connection(e.to_string()))
    }

    // -- writes ----------------------------------------------------------

    /// Insert one row, returning the generated key per `key`.
    pub async fn insert(
        &self,
        table: &str,
        row: &[(String, BindValue)],
        key: &KeyReturn,
    ) -> DbResult<i64> {
        let mut conn = self.acquire().await?;
        let mut tx = Self::begin(&mut conn).await?;
        let result = self.executor().insert(&mut tx, table, row, key).await;
        commit_or_rollback(tx, result).await
    }

    /// Update columns on all rows matching `condition`; returns the number
    /// of affected rows.
    pub async fn update(
        &self,
        table: &str,
        row: &[(String, BindValue)],
        condition: Option<&str>,
        cond_values: &[BindValue],
    ) -> DbResult<u64> {
        let mut conn = self.acquire().await?;
        let mut tx = Self::begin(&mut conn).await?;
        let result = self
            .executor()
            .update(&mut tx, table, row, condition, cond_values)
            .await;
        commit_or_rollback(tx, result).await
    }

    /// Update a single column on all rows matching `condition`.
    pub async fn update_field(
        &self,
        table: &str,
        col: &str,
        value: BindValue,
        condition: Option<&str>,
        cond_values: &[BindValue],
    ) -> DbResult<u64> {
        let mut conn = self.acquire().await?;
        let mut tx = Self::begin(&mut conn).await?;
        let result = self
            .executor()
            .update_field(&mut tx, table, col, value, condition, cond_values)
            .await;
        commit_or_rollback(tx, result).await
    }

    /// Delete all rows matching `condition` (all rows when absent).
    pub async fn delete(
        &self,
        table: &str,
        condition: Option<&str>,
        cond_values: &[BindValue],
    ) -> DbResult<u64> {
        let mut conn = self.acquire().await?;
        let mut tx = Self::begin(&mut conn).await?;
        let result = self
            .executor()
            .delete(&mut tx, table, condition, cond_values)
            .await;
        commit_or_rollback(tx, result).await
    }

    /// Insert `row` unless a row matching `condition` already exists.
    pub async fn insert_if_not_exists(
        &self,
        table: &str,
        row: &[(String, BindValue)],
        condition: &str,
        cond_values: &[BindValue],
    ) -> DbResult<()> {
        let mut conn = self.acquire().await?;
        let mut tx = Self::begin(&mut conn).await?;
        let result = self
            .executor()
            .insert_if_not_exists(&mut tx, table, row, condition, cond_values)
            .await;
        commit_or_rollback(tx, result).await
    }

    /// Run one raw statement with positional bind values.
    pub async fn exec(&self, sql: &str, values: &[BindValue]) -> DbResult<u64> {
        let mut conn = self.acquire().await?;
        let mut tx = Self::begin(&mut conn).await?;
        let result = self.executor().exec(&mut tx, sql, values).await;
        commit_or_rollback(tx, result).await
    }

    /// Run raw statements in batches inside one transaction.
    pub async fn exec_batch(&self, statements: &[String]) -> DbResult<u64> {
        let mut conn = self.acquire().await?;
        let mut tx = Self::begin(&mut conn).await?;
        let result = self.executor().exec_batch(&mut tx, statements).await;
        commit_or_rollback(tx, result).await
    }

    // -- reads -----------------------------------------------------------

    /// Run a paginated search returning named rows.
    pub async fn search(&self, op: &SearchOp) -> DbResult<Vec<DbRow>> {
        let mut conn = self.acquire().await?;
        self.executor().search(&mut conn, op).await
    }

    /// Run a paginated search returning positional rows.
    pub async fn search_positional(&self, op: &SearchOp) -> DbResult<Vec<Vec<DbValue>>> {
        let mut conn = self.acquire().await?;
        self.executor().search_positional(&mut conn, op).await
    }

    /// Fetch exactly one row: zero matches is row-not-found, two or more
    /// is row-not-unique.
    pub async fn get_one_row(
        &self,
        table: &str,
        cols: Option<&[&str]>,
        condition: Option<&str>,
        cond_values: &[BindValue],
    ) -> DbResult<DbRow> {
        let mut conn = self.acquire().await?;
        let row = self
            .executor()
            .get_one_row(&mut conn, table, cols, condition, cond_values, true)
            .await?;
        // must_unique reports absence as an error, so this is always Some
        row.ok_or_else(|| DbError::row_not_found(table, condition.unwrap_or_default()))
    }

    /// Like [`DataSource::get_one_row`] but absence is soft: `Ok(None)`
    /// when no row matches. A second match is still an error.
    pub async fn find_one_row(
        &self,
        table: &str,
        cols: Option<&[&str]>,
        condition: Option<&str>,
        cond_values: &[BindValue],
    ) -> DbResult<Option<DbRow>> {
        match self.get_one_row(table, cols, condition, cond_values).await {
            Ok(row) => Ok(Some(row)),
            Err(DbError::RowNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Fetch a single column of a single row; `Ok(None)` when no row
    /// matches, an error when more than one does.
    pub async fn lookup_field(
        &self,
        table: &str,
        col: &str,
        condition: Option<&str>,
        cond_values: &[BindValue],
    ) -> DbResult<Option<DbValue>> {
        let mut conn = self.acquire().await?;
        let result = self
            .executor()
            .get_one(&mut conn, table, Some(&[col]), condition, cond_values, true)
            .await;
        match result {
            Ok(row) => Ok(row.and_then(|mut values| {
                if values.is_empty() {
                    None
                } else {
                    Some(values.swap_remove(0))
                }
            })),
            Err(DbError::RowNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether any row matches `condition`.
    pub async fn value_exists(
        &self,
        table: &str,
        condition: &str,
        cond_values: &[BindValue],
    ) -> DbResult<bool> {
        Ok(self
            .get_count(table, None, false, Some(condition), cond_values)
            .await?
            > 0)
    }

    /// Count rows matching `condition`, optionally of a distinct column.
    pub async fn get_count(
        &self,
        table: &str,
        col: Option<&str>,
        distinct: bool,
        condition: Option<&str>,
        cond_values: &[BindValue],
    ) -> DbResult<i64> {
        let mut conn = self.acquire().await?;
        self.executor()
            .get_count(&mut conn, table, col, distinct, condition, cond_values)
            .await
    }

    /// Largest value of `col` among matching rows (null when none match).
    pub async fn get_max(
        &self,
        table: &str,
        col: &str,
        condition: Option<&str>,
        cond_values: &[BindValue],
    ) -> DbResult<DbValue> {
        let mut conn = self.acquire().await?;
        self.executor()
            .get_max(&mut conn, table, col, condition, cond_values)
            .await
    }

    /// Smallest value of `col` among matching rows (null when none match).
    pub async fn get_min(
        &self,
        table: &str,
        col: &str,
        condition: Option<&str>,
        cond_values: &[BindValue],
    ) -> DbResult<DbValue> {
        let mut conn = self.acquire().await?;
        self.executor()
            .get_min(&mut conn, table, col, condition, cond_values)
            .await
    }

    // -- lifecycle -------------------------------------------------------

    /// Evict the pool's idle connections; the pool stays configured.
    pub async fn clear_pool(&self) -> DbResult<()> {
        self.pools.clear(&self.pool_name).await
    }

    /// Close and deregister the pool.
    pub async fn close(&self) {
        self.pools.close(&self.pool_name).await;
    }
}

/// Commit when the operation succeeded, roll back otherwise.
///
/// A failed commit is logged but does not override the operation's result;
/// a failed operation rolls back implicitly when the transaction drops.
async fn commit_or_rollback<T>(tx: Transaction<'_, Any>, result: DbResult<T>) -> DbResult<T> {
    match result {
        Ok(value) => {
            if let Err(e) = tx.commit().await {
                error!(error = %e, "transaction commit failed");
            }
            Ok(value)
        }
        Err(e) => {
            drop(tx);
            Err(e)
        }
    }
}
