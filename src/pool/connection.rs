use crate::config::DbConfig;
use crate::error::DbError;
#[cfg(feature = "mysql")]
use crate::mysql::MysqlConnection;
use crate::results::{ExecOutcome, ResultSet};
#[cfg(feature = "sqlite")]
use crate::sqlite::SqliteConnection;
use crate::types::{Dialect, RowValues};

/// A checked-out driver connection.
///
/// Pass `&mut DbConnection` to repository calls to make them part of the caller's transaction.
pub enum DbConnection {
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteConnection),
    #[cfg(feature = "mysql")]
    Mysql(MysqlConnection),
}

impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(conn) => f.debug_tuple("Sqlite").field(conn).finish(),
            #[cfg(feature = "mysql")]
            Self::Mysql(conn) => f.debug_tuple("Mysql").field(conn).finish(),
        }
    }
}

impl DbConnection {
    /// Open a new connection for the configured backend.
    ///
    /// # Errors
    /// Returns [`DbError::Connection`] if the backend is not compiled in or refuses the connection.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        match config.backend {
            #[cfg(feature = "sqlite")]
            Dialect::Sqlite => Ok(Self::Sqlite(SqliteConnection::open(config).await?)),
            #[cfg(feature = "mysql")]
            Dialect::MySql => Ok(Self::Mysql(MysqlConnection::connect(config).await?)),
            #[allow(unreachable_patterns)]
            other => Err(DbError::Connection(format!(
                "backend {other:?} is not enabled in the current build"
            ))),
        }
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => Dialect::Sqlite,
            #[cfg(feature = "mysql")]
            Self::Mysql(_) => Dialect::MySql,
        }
    }

    /// Run a statement that returns rows.
    ///
    /// # Errors
    /// Returns [`DbError::Query`] for driver-reported failures or [`DbError::ConnectionLost`]
    /// when the connection died.
    pub async fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, DbError> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(conn) => conn.query(sql, params).await,
            #[cfg(feature = "mysql")]
            Self::Mysql(conn) => conn.query(sql, params).await,
        }
    }

    /// Run a write statement and report affected rows and the first generated id.
    ///
    /// # Errors
    /// Returns [`DbError::Query`] for driver-reported failures or [`DbError::ConnectionLost`]
    /// when the connection died.
    pub async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<ExecOutcome, DbError> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(conn) => conn.execute(sql, params).await,
            #[cfg(feature = "mysql")]
            Self::Mysql(conn) => conn.execute(sql, params).await,
        }
    }

    /// # Errors
    /// Returns [`DbError::Execution`] if a transaction is already open, or the driver error.
    pub async fn begin_transaction(&mut self) -> Result<(), DbError> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(conn) => conn.begin_transaction().await,
            #[cfg(feature = "mysql")]
            Self::Mysql(conn) => conn.begin_transaction().await,
        }
    }

    /// # Errors
    /// Returns [`DbError::Execution`] if no transaction is open, or the driver error.
    pub async fn commit(&mut self) -> Result<(), DbError> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(conn) => conn.commit().await,
            #[cfg(feature = "mysql")]
            Self::Mysql(conn) => conn.commit().await,
        }
    }

    /// # Errors
    /// Returns [`DbError::Execution`] if no transaction is open, or the driver error.
    pub async fn rollback(&mut self) -> Result<(), DbError> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(conn) => conn.rollback().await,
            #[cfg(feature = "mysql")]
            Self::Mysql(conn) => conn.rollback().await,
        }
    }

    /// Liveness probe run before a pooled connection is handed out again.
    ///
    /// # Errors
    /// Returns an error if the connection no longer answers.
    pub async fn ping(&mut self) -> Result<(), DbError> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(conn) => conn.ping().await,
            #[cfg(feature = "mysql")]
            Self::Mysql(conn) => conn.ping().await,
        }
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(conn) => conn.in_transaction(),
            #[cfg(feature = "mysql")]
            Self::Mysql(conn) => conn.in_transaction(),
        }
    }

    /// True once the driver reported a lost socket or a failed worker; the pool discards it.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(conn) => conn.is_broken(),
            #[cfg(feature = "mysql")]
            Self::Mysql(conn) => conn.is_broken(),
        }
    }

    /// Run parameterless statements such as schema setup. MySQL accepts a single statement.
    ///
    /// # Errors
    /// Returns [`DbError::Query`] if a statement fails.
    pub async fn execute_batch(&mut self, sql: &str) -> Result<(), DbError> {
        match self {
            #[cfg(feature = "sqlite")]
            Self::Sqlite(conn) => conn.execute_batch(sql).await,
            #[cfg(feature = "mysql")]
            Self::Mysql(conn) => conn.execute(sql, &[]).await.map(|_| ()),
        }
    }
}
