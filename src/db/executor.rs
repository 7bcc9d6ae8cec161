//! SQL generation and statement execution.
//!
//! [`SqlExecutor`] is the per-driver execution strategy. The default method
//! bodies are the portable baseline: SQL that every supported backend
//! accepts, with pagination done by skipping rows client-side while
//! streaming. Dialects override [`SqlExecutor::search_plan`] (and the
//! coercion policy) to push pagination into the statement; everything else
//! is inherited.

use crate::db::value::{self, CoercionPolicy};
use crate::error::{DbError, DbResult};
use crate::models::{BindValue, DbRow, DbValue, KeyReturn, Page, SearchOp, DEFAULT_MAX_ROWS};
use async_trait::async_trait;
use sqlx::any::{AnyArguments, AnyQueryResult, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyConnection};
use std::time::Instant;
use tracing::debug;

/// Statements per round of a batch execution.
const BATCH_SIZE: usize = 30;

/// A search statement plus how its pagination is handled.
pub struct SearchPlan {
    pub sql: String,
    /// When true the statement itself bounds the window and no rows are
    /// skipped client-side.
    pub server_paged: bool,
}

/// Per-driver execution strategy.
///
/// Implementations hold no connection; every method borrows one for the
/// duration of the call, so a single executor serves all pools of its
/// driver.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Value coercion knobs for this driver.
    fn coercion_policy(&self) -> CoercionPolicy {
        CoercionPolicy::default()
    }

    /// Turn a base select into a paginated statement.
    ///
    /// The baseline runs the select unchanged and skips `start` rows while
    /// streaming, stopping after `max` are collected.
    fn search_plan(&self, base_sql: &str, _page: Page) -> SearchPlan {
        SearchPlan {
            sql: base_sql.to_string(),
            server_paged: false,
        }
    }

    /// Insert one row, returning the generated key per `key` (0 when none
    /// was requested or the driver reported none).
    async fn insert(
        &self,
        conn: &mut AnyConnection,
        table: &str,
        row: &[(String, BindValue)],
        key: &KeyReturn,
    ) -> DbResult<i64> {
        let cols: Vec<&str> = row.iter().map(|(n, _)| n.as_str()).collect();
        let values: Vec<BindValue> = row.iter().map(|(_, v)| v.clone()).collect();
        let sql = build_insert(table, &cols, key)?;

        match key {
            KeyReturn::Columns(_) => {
                let rows = fetch_page(
                    conn,
                    &sql,
                    &values,
                    Page::first(1),
                    true,
                    &self.coercion_policy(),
                    value::decode_positional,
                )
                .await?;
                let key = rows
                    .first()
                    .and_then(|r| r.first())
                    .and_then(DbValue::as_int)
                    .unwrap_or(0);
                Ok(key)
            }
            KeyReturn::Generated => {
                let result = run_execute(conn, &sql, &values).await?;
                if let Some(id) = result.last_insert_id() {
                    return Ok(id);
                }
                generated_key_fallback(conn, &self.coercion_policy()).await
            }
            KeyReturn::None => {
                run_execute(conn, &sql, &values).await?;
                Ok(0)
            }
        }
    }

    /// Update the given columns on all rows matching `condition`.
    async fn update(
        &self,
        conn: &mut AnyConnection,
        table: &str,
        row: &[(String, BindValue)],
        condition: Option<&str>,
        cond_values: &[BindValue],
    ) -> DbResult<u64> {
        let cols: Vec<&str> = row.iter().map(|(n, _)| n.as_str()).collect();
        let sql = build_update(table, &cols, condition)?;
        // write values bind first, condition values after
        let mut values: Vec<BindValue> = row.iter().map(|(_, v)| v.clone()).collect();
        values.extend_from_slice(cond_values);
        let result = run_execute(conn, &sql, &values).await?;
        Ok(result.rows_affected())
    }

    /// Update a single column on all rows matching `condition`.
    async fn update_field(
        &self,
        conn: &mut AnyConnection,
        table: &str,
        col: &str,
        value: BindValue,
        condition: Option<&str>,
        cond_values: &[BindValue],
    ) -> DbResult<u64> {
        self.update(conn, table, &[(col.to_string(), value)], condition, cond_values)
            .await
    }

    /// Delete all rows matching `condition` (all rows when absent).
    async fn delete(
        &self,
        conn: &mut AnyConnection,
        table: &str,
        condition: Option<&str>,
        cond_values: &[BindValue],
    ) -> DbResult<u64> {
        let sql = build_delete(table, condition)?;
        let result = run_execute(conn, &sql, cond_values).await?;
        Ok(result.rows_affected())
    }

    /// Run a paginated search returning named rows.
    async fn search(&self, conn: &mut AnyConnection, op: &SearchOp) -> DbResult<Vec<DbRow>> {
        let sql = build_select_op(op)?;
        let page = normalize_page(op.page);
        let plan = self.search_plan(&sql, page);
        fetch_page(
            conn,
            &plan.sql,
            &op.cond_values,
            page,
            plan.server_paged,
            &self.coercion_policy(),
            value::decode_row,
        )
        .await
    }

    /// Run a paginated search returning positional rows aligned to the
    /// requested column list.
    async fn search_positional(
        &self,
        conn: &mut AnyConnection,
        op: &SearchOp,
    ) -> DbResult<Vec<Vec<DbValue>>> {
        let sql = build_select_op(op)?;
        let page = normalize_page(op.page);
        let plan = self.search_plan(&sql, page);
        fetch_page(
            conn,
            &plan.sql,
            &op.cond_values,
            page,
            plan.server_paged,
            &self.coercion_policy(),
            value::decode_positional,
        )
        .await
    }

    /// Fetch at most one row matching `condition`.
    ///
    /// With `must_unique` the condition must match exactly one row: zero is
    /// row-not-found, two or more is row-not-unique. Without it the first
    /// row wins and no match returns `None`.
    async fn get_one_row(
        &self,
        conn: &mut AnyConnection,
        table: &str,
        cols: Option<&[&str]>,
        condition: Option<&str>,
        cond_values: &[BindValue],
        must_unique: bool,
    ) -> DbResult<Option<DbRow>> {
        let op = one_row_op(table, cols, condition, cond_values, must_unique);
        let mut rows = self.search(conn, &op).await?;
        if must_unique {
            check_exactly_one(table, &op, rows.len())?;
        }
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Positional form of [`SqlExecutor::get_one_row`].
    async fn get_one(
        &self,
        conn: &mut AnyConnection,
        table: &str,
        cols: Option<&[&str]>,
        condition: Option<&str>,
        cond_values: &[BindValue],
        must_unique: bool,
    ) -> DbResult<Option<Vec<DbValue>>> {
        let op = one_row_op(table, cols, condition, cond_values, must_unique);
        let mut rows = self.search_positional(conn, &op).await?;
        if must_unique {
            check_exactly_one(table, &op, rows.len())?;
        }
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Count rows matching `condition`, optionally of a single (possibly
    /// distinct) column.
    async fn get_count(
        &self,
        conn: &mut AnyConnection,
        table: &str,
        col: Option<&str>,
        distinct: bool,
        condition: Option<&str>,
        cond_values: &[BindValue],
    ) -> DbResult<i64> {
        let sql = build_count(table, col, distinct, condition)?;
        let rows = fetch_page(
            conn,
            &sql,
            cond_values,
            Page::first(1),
            true,
            &self.coercion_policy(),
            value::decode_positional,
        )
        .await?;
        Ok(rows
            .first()
            .and_then(|r| r.first())
            .and_then(DbValue::as_int)
            .unwrap_or(0))
    }

    /// Largest value of `col` among rows matching `condition`.
    async fn get_max(
        &self,
        conn: &mut AnyConnection,
        table: &str,
        col: &str,
        condition: Option<&str>,
        cond_values: &[BindValue],
    ) -> DbResult<DbValue> {
        self.aggregate(conn, "max", table, col, condition, cond_values)
            .await
    }

    /// Smallest value of `col` among rows matching `condition`.
    async fn get_min(
        &self,
        conn: &mut AnyConnection,
        table: &str,
        col: &str,
        condition: Option<&str>,
        cond_values: &[BindValue],
    ) -> DbResult<DbValue> {
        self.aggregate(conn, "min", table, col, condition, cond_values)
            .await
    }

    #[doc(hidden)]
    async fn aggregate(
        &self,
        conn: &mut AnyConnection,
        func: &str,
        table: &str,
        col: &str,
        condition: Option<&str>,
        cond_values: &[BindValue],
    ) -> DbResult<DbValue> {
        let sql = build_aggregate(func, table, col, condition)?;
        let mut rows = fetch_page(
            conn,
            &sql,
            cond_values,
            Page::first(1),
            true,
            &self.coercion_policy(),
            value::decode_positional,
        )
        .await?;
        Ok(rows
            .first_mut()
            .and_then(|r| {
                if r.is_empty() {
                    None
                } else {
                    Some(r.swap_remove(0))
                }
            })
            .unwrap_or(DbValue::Null))
    }

    /// Insert `row` unless a row matching `condition` already exists.
    async fn insert_if_not_exists(
        &self,
        conn: &mut AnyConnection,
        table: &str,
        row: &[(String, BindValue)],
        condition: &str,
        cond_values: &[BindValue],
    ) -> DbResult<()> {
        let existing = self
            .get_count(conn, table, None, false, Some(condition), cond_values)
            .await?;
        if existing > 0 {
            return Err(DbError::already_exists(table));
        }
        self.insert(conn, table, row, &KeyReturn::None).await?;
        Ok(())
    }

    /// Run one raw statement with positional bind values.
    async fn exec(
        &self,
        conn: &mut AnyConnection,
        sql: &str,
        values: &[BindValue],
    ) -> DbResult<u64> {
        let result = run_execute(conn, sql, values).await?;
        Ok(result.rows_affected())
    }

    /// Run a list of raw statements in batches, returning the total number
    /// of affected rows. Fails on the first statement that errors.
    async fn exec_batch(&self, conn: &mut AnyConnection, statements: &[String]) -> DbResult<u64> {
        let mut affected = 0u64;
        for (i, chunk) in statements.chunks(BATCH_SIZE).enumerate() {
            for sql in chunk {
                let result = run_execute(conn, sql, &[]).await?;
                affected += result.rows_affected();
            }
            debug!(batch = i, statements = chunk.len(), "batch executed");
        }
        Ok(affected)
    }
}

/// The portable execution strategy; every trait default applies.
pub struct BaselineExecutor;

impl SqlExecutor for BaselineExecutor {}

fn normalize_page(page: Page) -> Page {
    if page.max == 0 {
        Page::new(page.start, DEFAULT_MAX_ROWS)
    } else {
        page
    }
}

fn check_exactly_one(table: &str, op: &SearchOp, matched: usize) -> DbResult<()> {
    match matched {
        1 => Ok(()),
        0 => Err(DbError::row_not_found(table, build_select_op(op)?)),
        _ => Err(DbError::row_not_unique(table, build_select_op(op)?)),
    }
}

fn one_row_op(
    table: &str,
    cols: Option<&[&str]>,
    condition: Option<&str>,
    cond_values: &[BindValue],
    must_unique: bool,
) -> SearchOp {
    let mut op = SearchOp::new(table);
    if let Some(cols) = cols {
        op = op.with_cols(cols.iter().copied());
    }
    if let Some(cond) = condition {
        op = op.with_condition(cond, cond_values.to_vec());
    }
    // fetch a second row only when uniqueness must be checked
    op.with_page(Page::first(if must_unique { 2 } else { 1 }))
}

/// Bind one value onto a query in its wire representation.
pub(crate) fn bind_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: &'q BindValue,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        BindValue::Null => query.bind(Option::<String>::None),
        BindValue::Bool(v) => query.bind(*v),
        BindValue::Int(v) => query.bind(*v),
        BindValue::Float(v) => query.bind(*v),
        BindValue::Text(v) => query.bind(v.as_str()),
        BindValue::Bytes(v) => query.bind(v.as_slice()),
        BindValue::Instant(v) => query.bind(v.to_rfc3339()),
    }
}

/// Execute a statement, logging the SQL and elapsed time.
pub(crate) async fn run_execute(
    conn: &mut AnyConnection,
    sql: &str,
    values: &[BindValue],
) -> DbResult<AnyQueryResult> {
    let started = Instant::now();
    let mut query = sqlx::query(sql);
    for v in values {
        query = bind_value(query, v);
    }
    let result = query.execute(&mut *conn).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(r) => {
            debug!(sql, elapsed_ms, rows = r.rows_affected(), "statement executed");
            Ok(r)
        }
        Err(e) => Err(DbError::execution(e.to_string(), sql, elapsed_ms)),
    }
}

/// Stream a result set into at most `page.max` decoded rows.
///
/// When `server_paged` is false the first `page.start` rows are discarded
/// without decoding; the stream is dropped as soon as the window is full,
/// so over-fetch stops at the wire.
pub(crate) async fn fetch_page<T>(
    conn: &mut AnyConnection,
    sql: &str,
    values: &[BindValue],
    page: Page,
    server_paged: bool,
    policy: &CoercionPolicy,
    decode: fn(&AnyRow, &CoercionPolicy) -> DbResult<T>,
) -> DbResult<Vec<T>> {
    use futures_util::TryStreamExt;

    let started = Instant::now();
    let mut query = sqlx::query(sql);
    for v in values {
        query = bind_value(query, v);
    }

    let mut rows: Vec<T> = Vec::new();
    let mut skipped = 0u32;
    {
        let mut stream = query.fetch(&mut *conn);
        loop {
            let row = stream.try_next().await.map_err(|e| {
                DbError::execution(e.to_string(), sql, started.elapsed().as_millis() as u64)
            })?;
            let Some(row) = row else { break };
            if !server_paged && skipped < page.start {
                skipped += 1;
                continue;
            }
            rows.push(decode(&row, policy)?);
            if rows.len() as u32 >= page.max {
                break;
            }
        }
    }
    debug!(
        sql,
        elapsed_ms = started.elapsed().as_millis() as u64,
        rows = rows.len(),
        skipped,
        "search executed"
    );
    Ok(rows)
}

/// Recover the generated key when the driver result carries none.
///
/// The Any bridge for SQLite never reports a last-insert id, so the rowid
/// has to be read back from the session. Runs on the same connection as the
/// insert, so it sees the right value inside a transaction too.
async fn generated_key_fallback(
    conn: &mut AnyConnection,
    policy: &CoercionPolicy,
) -> DbResult<i64> {
    if !conn.backend_name().eq_ignore_ascii_case("sqlite") {
        return Ok(0);
    }
    let rows = fetch_page(
        conn,
        "select last_insert_rowid()",
        &[],
        Page::first(1),
        true,
        policy,
        value::decode_positional,
    )
    .await?;
    Ok(rows
        .first()
        .and_then(|r| r.first())
        .and_then(DbValue::as_int)
        .unwrap_or(0))
}

fn require_table(table: &str) -> DbResult<()> {
    if table.trim().is_empty() {
        return Err(DbError::invalid_argument("table name must not be empty"));
    }
    Ok(())
}

/// Build an insert statement with one `?` placeholder per column.
pub fn build_insert(table: &str, cols: &[&str], key: &KeyReturn) -> DbResult<String> {
    require_table(table)?;
    if cols.is_empty() {
        return Err(DbError::invalid_argument("insert requires at least one column"));
    }
    let placeholders = vec!["?"; cols.len()].join(", ");
    let mut sql = format!(
        "insert into {} ({}) values ({})",
        table,
        cols.join(", "),
        placeholders
    );
    if let KeyReturn::Columns(key_cols) = key {
        if key_cols.is_empty() {
            return Err(DbError::invalid_argument("key column list must not be empty"));
        }
        sql.push_str(" returning ");
        sql.push_str(&key_cols.join(", "));
    }
    Ok(sql)
}

/// Build an update statement; write placeholders precede condition ones.
pub fn build_update(table: &str, cols: &[&str], condition: Option<&str>) -> DbResult<String> {
    require_table(table)?;
    if cols.is_empty() {
        return Err(DbError::invalid_argument("update requires at least one column"));
    }
    let assignments: Vec<String> = cols.iter().map(|c| format!("{} = ?", c)).collect();
    let mut sql = format!("update {} set {}", table, assignments.join(", "));
    if let Some(cond) = non_blank(condition) {
        sql.push_str(" where ");
        sql.push_str(cond);
    }
    Ok(sql)
}

pub fn build_delete(table: &str, condition: Option<&str>) -> DbResult<String> {
    require_table(table)?;
    let mut sql = format!("delete from {}", table);
    if let Some(cond) = non_blank(condition) {
        sql.push_str(" where ");
        sql.push_str(cond);
    }
    Ok(sql)
}

/// Build the base (unpaginated) select for a search descriptor.
pub fn build_select_op(op: &SearchOp) -> DbResult<String> {
    require_table(&op.table)?;
    let cols = match &op.cols {
        Some(cols) if !cols.is_empty() => cols.join(", "),
        _ => "*".to_string(),
    };
    let mut sql = format!("select {} from {}", cols, op.table);
    if let Some(cond) = non_blank(op.condition.as_deref()) {
        sql.push_str(" where ");
        sql.push_str(cond);
    }
    if let Some(group) = non_blank(op.group_by.as_deref()) {
        sql.push_str(" group by ");
        sql.push_str(group);
    }
    if let Some(order) = non_blank(op.order_by.as_deref()) {
        sql.push_str(" order by ");
        sql.push_str(order);
        sql.push_str(if op.ascending { " asc" } else { " desc" });
    }
    Ok(sql)
}

pub fn build_count(
    table: &str,
    col: Option<&str>,
    distinct: bool,
    condition: Option<&str>,
) -> DbResult<String> {
    require_table(table)?;
    let target = match (col, distinct) {
        (Some(c), true) => format!("distinct {}", c),
        (Some(c), false) => c.to_string(),
        (None, _) => "*".to_string(),
    };
    let mut sql = format!("select count({}) from {}", target, table);
    if let Some(cond) = non_blank(condition) {
        sql.push_str(" where ");
        sql.push_str(cond);
    }
    Ok(sql)
}

pub fn build_aggregate(
    func: &str,
    table: &str,
    col: &str,
    condition: Option<&str>,
) -> DbResult<String> {
    require_table(table)?;
    if col.trim().is_empty() {
        return Err(DbError::invalid_argument("aggregate column must not be empty"));
    }
    let mut sql = format!("select {}({}) from {}", func, col, table);
    if let Some(cond) = non_blank(condition) {
        sql.push_str(" where ");
        sql.push_str(cond);
    }
    Ok(sql)
}

fn non_blank(fragment: Option<&str>) -> Option<&str> {
    fragment.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_insert() {
        let sql = build_insert("tb_user", &["id", "name"], &KeyReturn::None).unwrap();
        assert_eq!(sql, "insert into tb_user (id, name) values (?, ?)");
    }

    #[test]
    fn test_build_insert_returning() {
        let sql = build_insert(
            "tb_user",
            &["name"],
            &KeyReturn::Columns(vec!["id".to_string()]),
        )
        .unwrap();
        assert_eq!(sql, "insert into tb_user (name) values (?) returning id");
    }

    #[test]
    fn test_build_insert_rejects_empty() {
        assert!(build_insert("", &["a"], &KeyReturn::None).is_err());
        assert!(build_insert("t", &[], &KeyReturn::None).is_err());
        assert!(build_insert("t", &["a"], &KeyReturn::Columns(vec![])).is_err());
    }

    #[test]
    fn test_build_update() {
        let sql = build_update("tb_user", &["name", "age"], Some("id = ?")).unwrap();
        assert_eq!(sql, "update tb_user set name = ?, age = ? where id = ?");

        let sql = build_update("tb_user", &["name"], None).unwrap();
        assert_eq!(sql, "update tb_user set name = ?");
    }

    #[test]
    fn test_build_delete() {
        assert_eq!(
            build_delete("tb_user", Some("id = ?")).unwrap(),
            "delete from tb_user where id = ?"
        );
        assert_eq!(build_delete("tb_user", None).unwrap(), "delete from tb_user");
        // blank conditions are treated as absent
        assert_eq!(
            build_delete("tb_user", Some("  ")).unwrap(),
            "delete from tb_user"
        );
    }

    #[test]
    fn test_build_select_full_shape() {
        let op = SearchOp::new("tb_user")
            .with_cols(["id", "name"])
            .with_condition("age > ?", vec![BindValue::Int(18)])
            .with_group_by("dept")
            .with_order_by("id", false);
        assert_eq!(
            build_select_op(&op).unwrap(),
            "select id, name from tb_user where age > ? group by dept order by id desc"
        );
    }

    #[test]
    fn test_build_select_defaults_to_star_asc() {
        let op = SearchOp::new("tb_user").with_order_by("id", true);
        assert_eq!(
            build_select_op(&op).unwrap(),
            "select * from tb_user order by id asc"
        );
    }

    #[test]
    fn test_build_count() {
        assert_eq!(
            build_count("t", None, false, None).unwrap(),
            "select count(*) from t"
        );
        assert_eq!(
            build_count("t", Some("dept"), true, Some("age > ?")).unwrap(),
            "select count(distinct dept) from t where age > ?"
        );
    }

    #[test]
    fn test_build_aggregate() {
        assert_eq!(
            build_aggregate("max", "t", "id", None).unwrap(),
            "select max(id) from t"
        );
        assert!(build_aggregate("min", "t", " ", None).is_err());
    }

    #[test]
    fn test_normalize_page_zero_max() {
        let page = normalize_page(Page::new(5, 0));
        assert_eq!(page.start, 5);
        assert_eq!(page.max, DEFAULT_MAX_ROWS);
        assert_eq!(normalize_page(Page::new(0, 7)).max, 7);
    }

    #[test]
    fn test_baseline_plan_is_client_paged() {
        let plan = BaselineExecutor.search_plan("select * from t", Page::new(10, 20));
        assert_eq!(plan.sql, "select * from t");
        assert!(!plan.server_paged);
    }
}
