//! Data models shared across the access layer.

pub mod operation;
pub mod row;

pub use operation::{BindValue, KeyReturn, Page, SearchOp, DEFAULT_MAX_ROWS};
pub use row::{DbRow, DbValue};
