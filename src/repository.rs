//! Table-bound facade: the typed entry point application code uses.
//!
//! ```rust,no_run
//! use mysql_wizard::prelude::*;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct User {
//!     #[serde(skip_serializing_if = "Option::is_none")]
//!     id: Option<i64>,
//!     name: String,
//!     is_active: bool,
//! }
//!
//! # async fn demo(pool: ConnectionPool) -> Result<(), DbError> {
//! let users: Repository<User> = Repository::new(
//!     &pool,
//!     RepositoryConfig::new("users")
//!         .keys(["id", "name", "isActive"])
//!         .auto_set_columns(["id"]),
//! );
//! users
//!     .insert(&[User { id: None, name: "Ann".into(), is_active: true }], None)
//!     .await?;
//! let active = users
//!     .select(CompareQuery::new().eq("isActive", true))
//!     .limit(10)
//!     .execute(None)
//!     .await?;
//! # let _ = active;
//! # Ok(()) }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::condition::CompareQuery;
use crate::error::DbError;
use crate::executor::transaction;
use crate::pool::{ConnectionPool, DbConnection};
use crate::query_builder::{
    InsertOptions, Relation, SelectBuilder, SelectOneBuilder, Statement, TableContext,
    delete_statement, insert_statement, update_statement,
};
use crate::results::{ExecOutcome, ExtendedResultSetHeader, ResultSetHeader};
use crate::transcode::{ColumnKind, Transcoder};

/// Table name, key vocabulary and relations for one [`Repository`].
#[derive(Debug, Clone, Default)]
pub struct RepositoryConfig {
    table: String,
    keys: Vec<String>,
    auto_set_columns: Vec<String>,
    relations: BTreeMap<String, Relation>,
    column_kinds: HashMap<String, ColumnKind>,
    print_query: bool,
}

impl RepositoryConfig {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// camelCase object keys; each maps to the snake_case column of the same name.
    #[must_use]
    pub fn keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Server-managed columns (auto-increment ids, `DEFAULT CURRENT_TIMESTAMP`) that inserts leave
    /// to the database.
    #[must_use]
    pub fn auto_set_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auto_set_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn relation(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.relations.insert(name.into(), relation);
        self
    }

    /// Declare how a key is stored. Declared kinds win over the naming and shape heuristics.
    #[must_use]
    pub fn column_kind(mut self, key: impl Into<String>, kind: ColumnKind) -> Self {
        self.column_kinds.insert(key.into(), kind);
        self
    }

    #[must_use]
    pub fn print_query(mut self, print_query: bool) -> Self {
        self.print_query = print_query;
        self
    }
}

/// Typed select/insert/update/delete for one table.
///
/// Every method takes an optional `&mut DbConnection`. Passing the connection a
/// [`transaction`](crate::executor::transaction) callback received makes the call part of that
/// transaction; passing `None` inside such a callback runs the call on a different connection,
/// outside the transaction.
pub struct Repository<T> {
    ctx: Arc<TableContext>,
    pool: ConnectionPool,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
            pool: self.pool.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Repository<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("table", &self.ctx.table)
            .field("dialect", &self.ctx.dialect)
            .finish_non_exhaustive()
    }
}

impl<T> Repository<T> {
    #[must_use]
    pub fn new(pool: &ConnectionPool, config: RepositoryConfig) -> Self {
        let transcoder = Transcoder::new(
            &config.keys,
            &config.auto_set_columns,
            &config.column_kinds,
        );
        let ctx = TableContext {
            table: config.table,
            transcoder,
            relations: config.relations,
            dialect: pool.dialect(),
            print_query: config.print_query || pool.config().print_query,
        };
        Self {
            ctx: Arc::new(ctx),
            pool: pool.clone(),
            _entity: PhantomData,
        }
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.ctx.table
    }

    #[must_use]
    pub fn context(&self) -> &TableContext {
        &self.ctx
    }

    #[must_use]
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Start a multi-row select. `None` or an empty condition selects every row.
    #[must_use]
    pub fn select(&self, condition: impl Into<Option<CompareQuery>>) -> SelectBuilder<T> {
        SelectBuilder::new(Arc::clone(&self.ctx), self.pool.clone(), condition.into())
    }

    /// Start a single-row select.
    ///
    /// The statement carries `LIMIT 1` unless a has-many relation is requested with
    /// [`with`](SelectOneBuilder::with). In that case the limit is dropped so the first parent
    /// comes back with all of its children.
    #[must_use]
    pub fn select_one(&self, condition: CompareQuery) -> SelectOneBuilder<T> {
        SelectOneBuilder::new(Arc::clone(&self.ctx), self.pool.clone(), condition)
    }

    /// Insert `rows` in one statement, leaving auto-set columns to the database.
    ///
    /// An empty slice is a no-op. Fields serialized as absent (`skip_serializing_if`) are left out;
    /// `None` serialized as `null` is written as NULL.
    ///
    /// # Errors
    /// Returns [`DbError::Serialization`] if a row does not serialize to an object, or the
    /// statement's error.
    pub async fn insert<C: Serialize>(
        &self,
        rows: &[C],
        conn: Option<&mut DbConnection>,
    ) -> Result<ExtendedResultSetHeader, DbError> {
        self.insert_with(rows, InsertOptions::default(), conn).await
    }

    /// # Errors
    /// As [`insert`](Self::insert).
    pub async fn insert_with<C: Serialize>(
        &self,
        rows: &[C],
        options: InsertOptions,
        conn: Option<&mut DbConnection>,
    ) -> Result<ExtendedResultSetHeader, DbError> {
        let objects = rows.iter().map(to_object).collect::<Result<Vec<_>, _>>()?;
        let Some(statement) = insert_statement(&self.ctx, &objects, options)? else {
            return Ok(ExtendedResultSetHeader::default());
        };
        let outcomes = self.run_writes(vec![statement], conn).await?;
        Ok(ExtendedResultSetHeader::from_outcome(
            outcomes.first().copied().unwrap_or_default(),
        ))
    }

    /// Apply each `(condition, patch)` pair in order and sum the affected rows.
    ///
    /// Only fields present in a patch are written. A pair whose patch has no declared field is
    /// skipped.
    ///
    /// # Errors
    /// Returns [`DbError::Execution`] for a pair whose condition compiles to nothing, or the first
    /// failing statement's error. Without an external connection the whole batch rolls back.
    pub async fn update<P: Serialize>(
        &self,
        pairs: &[(CompareQuery, P)],
        conn: Option<&mut DbConnection>,
    ) -> Result<ResultSetHeader, DbError> {
        let mut statements = Vec::with_capacity(pairs.len());
        for (condition, patch) in pairs {
            if let Some(statement) = update_statement(&self.ctx, condition, &to_object(patch)?)? {
                statements.push(statement);
            }
        }
        Ok(sum_affected(&self.run_writes(statements, conn).await?))
    }

    /// Delete the rows matching each condition in order and sum the affected rows.
    ///
    /// # Errors
    /// Returns [`DbError::Execution`] for a condition that compiles to nothing, or the first
    /// failing statement's error.
    pub async fn delete(
        &self,
        conditions: &[CompareQuery],
        conn: Option<&mut DbConnection>,
    ) -> Result<ResultSetHeader, DbError> {
        let statements = conditions
            .iter()
            .map(|condition| delete_statement(&self.ctx, condition))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sum_affected(&self.run_writes(statements, conn).await?))
    }

    async fn run_writes(
        &self,
        statements: Vec<Statement>,
        conn: Option<&mut DbConnection>,
    ) -> Result<Vec<ExecOutcome>, DbError> {
        if statements.is_empty() {
            return Ok(Vec::new());
        }
        for statement in &statements {
            statement.log(&self.ctx);
        }
        match conn {
            Some(conn) => execute_all(conn, &statements).await,
            None => {
                transaction(&self.pool, move |conn| {
                    Box::pin(async move { execute_all(conn, &statements).await })
                })
                .await
            }
        }
    }
}

async fn execute_all(
    conn: &mut DbConnection,
    statements: &[Statement],
) -> Result<Vec<ExecOutcome>, DbError> {
    let mut outcomes = Vec::with_capacity(statements.len());
    for statement in statements {
        outcomes.push(conn.execute(&statement.sql, &statement.params).await?);
    }
    Ok(outcomes)
}

fn sum_affected(outcomes: &[ExecOutcome]) -> ResultSetHeader {
    ResultSetHeader {
        affected_rows: outcomes.iter().map(|o| o.affected_rows).sum(),
    }
}

fn to_object<S: Serialize>(value: &S) -> Result<Map<String, Value>, DbError> {
    match serde_json::to_value(value)? {
        Value::Object(object) => Ok(object),
        other => Err(DbError::Execution(format!(
            "expected an object to write, got {other}"
        ))),
    }
}
