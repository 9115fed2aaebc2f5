//! Common imports: `use mysql_wizard::prelude::*;`

pub use crate::condition::{CompareOperator, CompareQuery, CompareValue, LikePattern, Operand};
pub use crate::config::DbConfig;
pub use crate::error::DbError;
pub use crate::executor::{HandlerOptions, autocommit, run, transaction};
pub use crate::pool::{ConnectionPool, DbConnection};
pub use crate::query_builder::{
    Aggregate, InsertOptions, JoinType, OrderBy, Relation, SortDirection,
};
pub use crate::repository::{Repository, RepositoryConfig};
pub use crate::results::{ExtendedResultSetHeader, ResultSetHeader};
pub use crate::transcode::ColumnKind;
pub use crate::types::RowValues;
