use std::fmt;
use std::sync::Arc;

use rusqlite::ErrorCode;
use tokio::sync::Mutex;
use tracing::debug;

use super::params::Params;
use super::query::build_result_set;
use crate::config::DbConfig;
use crate::error::{DbError, QueryFailure};
use crate::results::{ExecOutcome, ResultSet};
use crate::types::{Dialect, RowValues};

pub(crate) type SharedSqliteConnection = Arc<Mutex<rusqlite::Connection>>;

/// One pooled `SQLite` connection. Blocking driver calls run on tokio's blocking pool.
pub struct SqliteConnection {
    conn: SharedSqliteConnection,
    in_transaction: bool,
    broken: bool,
}

impl SqliteConnection {
    /// Open the database file named by `config.sqlite_path` and switch it to WAL.
    ///
    /// # Errors
    /// Returns [`DbError::Connection`] if the file cannot be opened or configured.
    pub async fn open(config: &DbConfig) -> Result<Self, DbError> {
        let path = config.sqlite_path.clone();
        let busy_timeout = config.acquire_timeout();
        let opened = tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&path)?;
            conn.busy_timeout(busy_timeout)?;
            if path != ":memory:" {
                conn.execute_batch("PRAGMA journal_mode = WAL;")?;
            }
            Ok::<_, rusqlite::Error>(conn)
        })
        .await
        .map_err(|e| DbError::Connection(format!("sqlite spawn_blocking join error: {e}")))?
        .map_err(|e| {
            DbError::Connection(format!(
                "failed to open sqlite database {}: {e}",
                config.sqlite_path
            ))
        })?;
        debug!(path = %config.sqlite_path, "opened sqlite connection");
        Ok(Self {
            conn: Arc::new(Mutex::new(opened)),
            in_transaction: false,
            broken: false,
        })
    }

    /// # Errors
    /// Returns [`DbError::Query`] with the driver diagnostics if the statement fails.
    pub async fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, DbError> {
        let owned_sql = sql.to_string();
        let params = Params::convert(params);
        self.run(move |conn| {
            let mut stmt = conn
                .prepare(&owned_sql)
                .map_err(|e| query_error(&owned_sql, e))?;
            build_result_set(&mut stmt, params.as_values()).map_err(|e| query_error(&owned_sql, e))
        })
        .await
    }

    /// Run a write statement. `insert_id` is the first rowid of a (multi-row) `INSERT`.
    ///
    /// # Errors
    /// Returns [`DbError::Query`] with the driver diagnostics if the statement fails.
    pub async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<ExecOutcome, DbError> {
        let owned_sql = sql.to_string();
        let params = Params::convert(params);
        self.run(move |conn| {
            let affected = conn
                .execute(&owned_sql, rusqlite::params_from_iter(params.as_values()))
                .map_err(|e| query_error(&owned_sql, e))?;
            let affected_rows = u64::try_from(affected).unwrap_or(u64::MAX);
            let insert_id = if is_insert(&owned_sql) && affected_rows > 0 {
                u64::try_from(conn.last_insert_rowid())
                    .unwrap_or(0)
                    .saturating_sub(affected_rows - 1)
            } else {
                0
            };
            Ok(ExecOutcome {
                affected_rows,
                insert_id,
            })
        })
        .await
    }

    /// Run one or more statements without parameters or results (schema setup, pragmas).
    ///
    /// # Errors
    /// Returns [`DbError::Query`] if any statement fails.
    pub async fn execute_batch(&mut self, sql: &str) -> Result<(), DbError> {
        let owned_sql = sql.to_string();
        self.run(move |conn| {
            conn.execute_batch(&owned_sql)
                .map_err(|e| query_error(&owned_sql, e))
        })
        .await
    }

    /// # Errors
    /// Returns [`DbError::Execution`] if a transaction is already open, or the driver error.
    pub async fn begin_transaction(&mut self) -> Result<(), DbError> {
        if self.in_transaction {
            return Err(DbError::Execution(
                "SQLite transaction already in progress".into(),
            ));
        }
        self.execute_batch(Dialect::Sqlite.begin_statement()).await?;
        self.in_transaction = true;
        Ok(())
    }

    /// # Errors
    /// Returns [`DbError::Execution`] if no transaction is open, or the driver error.
    pub async fn commit(&mut self) -> Result<(), DbError> {
        if !self.in_transaction {
            return Err(DbError::Execution("SQLite transaction not active".into()));
        }
        self.execute_batch("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    /// # Errors
    /// Returns [`DbError::Execution`] if no transaction is open, or the driver error.
    pub async fn rollback(&mut self) -> Result<(), DbError> {
        if !self.in_transaction {
            return Err(DbError::Execution("SQLite transaction not active".into()));
        }
        // The flag clears even if ROLLBACK fails; SQLite ends the transaction on most errors.
        self.in_transaction = false;
        self.execute_batch("ROLLBACK").await
    }

    /// # Errors
    /// Returns an error if the connection cannot run `SELECT 1`.
    pub async fn ping(&mut self) -> Result<(), DbError> {
        self.query("SELECT 1", &[]).await.map(|_| ())
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    async fn run<F, R>(&mut self, func: F) -> Result<R, DbError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, DbError> + Send + 'static,
        R: Send + 'static,
    {
        let result = run_blocking(Arc::clone(&self.conn), func).await;
        if matches!(result, Err(DbError::ConnectionLost(_))) {
            self.broken = true;
        }
        result
    }
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("in_transaction", &self.in_transaction)
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

pub(crate) async fn run_blocking<F, R>(conn: SharedSqliteConnection, func: F) -> Result<R, DbError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, DbError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.blocking_lock();
        func(&mut guard)
    })
    .await
    .map_err(|e| DbError::ConnectionLost(format!("sqlite spawn_blocking join error: {e}")))?
}

fn is_insert(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("insert"))
}

fn query_error(sql: &str, err: rusqlite::Error) -> DbError {
    match &err {
        rusqlite::Error::SqliteFailure(failure, message) => {
            let contended = matches!(
                failure.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            );
            let message = message.clone().unwrap_or_else(|| err.to_string());
            let mut diagnostic =
                QueryFailure::new(sql, message).with_lock_contention(contended);
            if let Ok(code) = u16::try_from(failure.extended_code) {
                diagnostic = diagnostic.with_code(code);
            }
            diagnostic.into()
        }
        _ => QueryFailure::new(sql, err.to_string()).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_detection_ignores_case_and_whitespace() {
        assert!(is_insert("  insert into t values (1)"));
        assert!(is_insert("INSERT INTO t DEFAULT VALUES"));
        assert!(!is_insert("UPDATE t SET a = 1"));
        assert!(!is_insert("ins"));
    }

    #[test]
    fn constraint_failures_carry_extended_code() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT NOT NULL);")
            .unwrap();
        let err = conn
            .execute("INSERT INTO t (name) VALUES (NULL)", [])
            .unwrap_err();
        let err = query_error("INSERT INTO t (name) VALUES (NULL)", err);
        let failure = err.query_failure().unwrap();
        assert_eq!(failure.sql, "INSERT INTO t (name) VALUES (NULL)");
        assert!(failure.code.is_some());
        assert!(!failure.is_lock_contention());
    }
}
