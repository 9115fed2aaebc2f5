//! `SQLite` backend used for embedded deployments and tests.
//!
//! Statements are the same backtick-quoted `?`-placeholder SQL the compiler emits for MySQL;
//! [`crate::types::Dialect::Sqlite`] covers the few spots where the engines differ.

mod connection;
mod params;
mod query;

pub use connection::SqliteConnection;
pub use params::{Params, row_value_to_sqlite_value};
pub use query::{build_result_set, sqlite_extract_value_sync};
