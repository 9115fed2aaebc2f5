//! Typed query-condition compiler and repository layer over async MySQL.
//!
//! A [`Repository`] binds a table, its camelCase key list and named relations, and hands out
//! fluent select builders plus batch insert/update/delete. Conditions are plain
//! [`CompareQuery`] values that compile to parameterized SQL; values cross the storage boundary
//! through the [`transcode`] layer (booleans, JSON, UTC datetimes). Every call runs through the
//! [`executor`] handler on a shared [`ConnectionPool`].
//!
//! The `mysql` feature enables the MySQL backend; the default `sqlite` feature provides a local
//! backend with the same semantics, used by the test suite.

#[cfg(not(any(feature = "sqlite", feature = "mysql")))]
compile_error!("enable at least one backend feature: `sqlite` or `mysql`");

pub mod condition;
pub mod config;
pub mod error;
pub mod executor;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod pool;
pub mod prelude;
pub mod query_builder;
pub mod repository;
pub mod results;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod transcode;
pub mod types;

pub use condition::{CompareOperator, CompareQuery, CompareValue, LikePattern, Operand};
pub use config::DbConfig;
pub use error::{DbError, QueryFailure};
pub use executor::{HandlerOptions, autocommit, run, transaction};
pub use pool::{ConnectionPool, DbConnection, PoolStatus};
pub use query_builder::{
    Aggregate, AggregateFn, InsertOptions, JoinType, OrderBy, Relation, RelationType,
    SelectBuilder, SelectOneBuilder, SortDirection, Statement,
};
pub use repository::{Repository, RepositoryConfig};
pub use results::{CustomDbRow, ExtendedResultSetHeader, ResultSet, ResultSetHeader};
pub use transcode::ColumnKind;
pub use types::{Dialect, RowValues};
