//! Database access layer: pools, dialects, executors, and the facade.

pub mod dialect;
pub mod executor;
pub mod facade;
pub mod pool;
pub mod url;
pub mod value;

pub use dialect::{DialectRegistry, MySqlExecutor, OracleExecutor};
pub use executor::{BaselineExecutor, SearchPlan, SqlExecutor};
pub use facade::{DataSource, DbContext};
pub use pool::PoolManager;
pub use url::{build_url, DbKind};
pub use value::CoercionPolicy;
