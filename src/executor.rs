//! Connection and transaction handler.
//!
//! Every database call runs inside [`run`]: acquire, optionally begin, run the callback, then
//! commit or roll back. The connection goes back to the pool on every path. Callbacks receive
//! `&mut DbConnection` and return a boxed future borrowing it. Anything else the callback uses
//! must be owned, so clone repositories into a `move` closure:
//! ```rust,no_run
//! use mysql_wizard::prelude::*;
//!
//! # async fn demo(pool: &ConnectionPool) -> Result<(), DbError> {
//! let moved = transaction(pool, |conn| {
//!     Box::pin(async move {
//!         let out = conn
//!             .execute("UPDATE accounts SET balance = balance - ? WHERE id = ?", &[RowValues::Int(5), RowValues::Int(1)])
//!             .await?;
//!         conn.execute("UPDATE accounts SET balance = balance + ? WHERE id = ?", &[RowValues::Int(5), RowValues::Int(2)])
//!             .await?;
//!         Ok(out.affected_rows)
//!     })
//! })
//! .await?;
//! # let _ = moved;
//! # Ok(()) }
//! ```

use deadpool::managed::Object;
use futures_util::future::BoxFuture;
use tracing::{debug, error, warn};

use crate::error::DbError;
use crate::pool::{ConnectionPool, DbConnection};
use crate::query_builder::Statement;
use crate::results::ResultSet;

/// Handler switches. The defaults are the strict ones: transactional, errors returned,
/// SQL diagnostics logged, rollback on error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerOptions {
    pub use_transaction: bool,
    /// When false, failures are logged and [`run`] returns `Ok(None)`.
    pub throw_error: bool,
    pub print_sql_error: bool,
    pub rollback_if_error: bool,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self {
            use_transaction: true,
            throw_error: true,
            print_sql_error: true,
            rollback_if_error: true,
        }
    }
}

impl HandlerOptions {
    /// No BEGIN/COMMIT; each statement commits on its own.
    #[must_use]
    pub fn autocommit() -> Self {
        Self {
            use_transaction: false,
            ..Self::default()
        }
    }

    /// Defaults with SQL error printing taken from the pool configuration.
    #[must_use]
    pub fn for_pool(pool: &ConnectionPool) -> Self {
        Self {
            print_sql_error: pool.config().print_sql_error,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn use_transaction(mut self, use_transaction: bool) -> Self {
        self.use_transaction = use_transaction;
        self
    }

    #[must_use]
    pub fn throw_error(mut self, throw_error: bool) -> Self {
        self.throw_error = throw_error;
        self
    }

    #[must_use]
    pub fn print_sql_error(mut self, print_sql_error: bool) -> Self {
        self.print_sql_error = print_sql_error;
        self
    }

    #[must_use]
    pub fn rollback_if_error(mut self, rollback_if_error: bool) -> Self {
        self.rollback_if_error = rollback_if_error;
        self
    }
}

/// Run `callback` on a pooled connection under `options`.
///
/// Returns `Ok(None)` instead of an error when `throw_error` is off.
///
/// # Errors
/// Returns the acquisition, callback, or commit error when `throw_error` is on. A failed callback
/// is rolled back first when `rollback_if_error` is on.
pub async fn run<T, F>(
    pool: &ConnectionPool,
    options: HandlerOptions,
    callback: F,
) -> Result<Option<T>, DbError>
where
    F: for<'c> FnOnce(&'c mut DbConnection) -> BoxFuture<'c, Result<T, DbError>> + Send,
    T: Send,
{
    match run_strict(pool, options, callback).await {
        Ok(value) => Ok(Some(value)),
        Err(_) if !options.throw_error => Ok(None),
        Err(err) => Err(err),
    }
}

/// [`run`] with the default, transactional options.
///
/// # Errors
/// Returns the acquisition, callback, or commit error after rolling back.
pub async fn transaction<T, F>(pool: &ConnectionPool, callback: F) -> Result<T, DbError>
where
    F: for<'c> FnOnce(&'c mut DbConnection) -> BoxFuture<'c, Result<T, DbError>> + Send,
    T: Send,
{
    run_strict(pool, HandlerOptions::for_pool(pool), callback).await
}

/// [`run`] without a transaction.
///
/// # Errors
/// Returns the acquisition or callback error.
pub async fn autocommit<T, F>(pool: &ConnectionPool, callback: F) -> Result<T, DbError>
where
    F: for<'c> FnOnce(&'c mut DbConnection) -> BoxFuture<'c, Result<T, DbError>> + Send,
    T: Send,
{
    run_strict(
        pool,
        HandlerOptions::for_pool(pool).use_transaction(false),
        callback,
    )
    .await
}

/// Run a row-returning statement on the caller's connection, or on a pooled one in autocommit.
pub(crate) async fn fetch(
    pool: &ConnectionPool,
    conn: Option<&mut DbConnection>,
    statement: Statement,
) -> Result<ResultSet, DbError> {
    match conn {
        Some(conn) => conn.query(&statement.sql, &statement.params).await,
        None => {
            autocommit(pool, move |conn| {
                Box::pin(async move { conn.query(&statement.sql, &statement.params).await })
            })
            .await
        }
    }
}

async fn run_strict<T, F>(
    pool: &ConnectionPool,
    options: HandlerOptions,
    callback: F,
) -> Result<T, DbError>
where
    F: for<'c> FnOnce(&'c mut DbConnection) -> BoxFuture<'c, Result<T, DbError>> + Send,
    T: Send,
{
    let mut conn = pool.acquire().await?;
    let result = run_on_connection(&mut conn, options, callback).await;
    if conn.is_broken() {
        drop(Object::take(conn));
        debug!("destroyed broken connection");
    }
    result
}

async fn run_on_connection<T, F>(
    conn: &mut DbConnection,
    options: HandlerOptions,
    callback: F,
) -> Result<T, DbError>
where
    F: for<'c> FnOnce(&'c mut DbConnection) -> BoxFuture<'c, Result<T, DbError>> + Send,
    T: Send,
{
    if options.use_transaction {
        if let Err(err) = conn.begin_transaction().await {
            report(&err, options, false);
            return Err(err);
        }
    }

    match callback(&mut *conn).await {
        Ok(value) => {
            if options.use_transaction {
                if let Err(err) = conn.commit().await {
                    let rolled_back = rollback_quietly(conn).await;
                    report(&err, options, rolled_back);
                    return Err(err);
                }
            }
            Ok(value)
        }
        Err(err) => {
            let rolled_back = options.use_transaction
                && options.rollback_if_error
                && rollback_quietly(conn).await;
            report(&err, options, rolled_back);
            Err(err)
        }
    }
}

async fn rollback_quietly(conn: &mut DbConnection) -> bool {
    if !conn.in_transaction() {
        return false;
    }
    match conn.rollback().await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "rollback failed");
            false
        }
    }
}

fn report(err: &DbError, options: HandlerOptions, rolled_back: bool) {
    match err.query_failure() {
        Some(failure) if failure.is_lock_contention() => warn!(
            sql = %failure.sql,
            message = %failure.message,
            code = ?failure.code,
            state = ?failure.state,
            rolled_back,
            "lock contention"
        ),
        Some(failure) if options.print_sql_error => error!(
            sql = %failure.sql,
            message = %failure.message,
            state = ?failure.state,
            code = ?failure.code,
            rolled_back,
            "query failed"
        ),
        _ => error!(error = %err, rolled_back, "database operation failed"),
    }
}
