//! Database-agnostic data access over pooled connections.
//!
//! One API for heterogeneous relational backends: named connection pools,
//! per-driver SQL dialects resolved through a registry, and a facade that
//! hides the connection lifecycle behind CRUD, search, and aggregate
//! operations. SQL generation is dialect-aware where it pays (pagination)
//! and portable everywhere else; result values are coerced into a closed
//! set of kinds so callers never deal with driver-specific types.
//!
//! ```no_run
//! use sqlbridge::config::DbSettings;
//! use sqlbridge::db::{DataSource, DbContext, DbKind};
//! use sqlbridge::models::{BindValue, SearchOp};
//!
//! # async fn demo() -> sqlbridge::error::DbResult<()> {
//! let ctx = DbContext::new();
//! let settings = DbSettings::new(
//!     DbKind::MySql, "app", "db.local", 3306, "appdb", "svc", "secret",
//! );
//! let db = DataSource::connect(&ctx, &settings).await?;
//!
//! let op = SearchOp::new("tb_user")
//!     .with_condition("age > ?", vec![BindValue::Int(18)]);
//! let rows = db.search(&op).await?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{DbSettings, PoolOptions};
pub use db::{BaselineExecutor, DataSource, DbContext, DbKind, DialectRegistry, SqlExecutor};
pub use error::{DbError, DbResult};
pub use models::{BindValue, DbRow, DbValue, KeyReturn, Page, SearchOp};
