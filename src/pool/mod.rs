//! Shared connection pool with acquisition retry and idle sweeping.

mod connection;
mod manager;
mod retry;

use std::sync::Arc;
use std::time::Duration;

use deadpool::managed::{Object, Pool, PoolError, TimeoutType};
use serde::Serialize;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error};

pub use connection::DbConnection;
pub use manager::ConnectionManager;
pub use retry::{RetryPolicy, retry_transient};

use crate::config::DbConfig;
use crate::error::DbError;
use crate::types::Dialect;

/// A connection checked out of the pool; returned to it on drop.
pub type PooledConnection = Object<ConnectionManager>;

/// Occupancy snapshot, logged with acquisition failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub max_size: usize,
    pub size: usize,
    pub available: usize,
    pub waiting: usize,
}

/// The process-wide pool, built once at startup and passed to repositories.
///
/// Cloning is cheap; every clone shares the same connections. The idle sweeper stops when the
/// last clone is dropped or [`close`](Self::close) is called.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    pool: Pool<ConnectionManager>,
    config: DbConfig,
    retry: RetryPolicy,
    shutdown: CancellationToken,
    _sweeper: DropGuard,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish()
    }
}

impl ConnectionPool {
    /// Build the pool and start the idle sweeper. Connections are opened lazily.
    ///
    /// # Errors
    /// Returns [`DbError::Connection`] if called outside a Tokio runtime or the pool cannot be
    /// built.
    pub fn new(config: DbConfig) -> Result<Self, DbError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            DbError::Connection("ConnectionPool must be created inside a Tokio runtime".into())
        })?;

        // Not waiting means a zero wait timeout: a busy pool fails the attempt at once.
        let wait_timeout = if config.wait_for_connections {
            config.acquire_timeout()
        } else {
            Duration::ZERO
        };
        let pool = Pool::builder(ConnectionManager::new(config.clone()))
            .max_size(config.connection_limit.max(1))
            .wait_timeout(Some(wait_timeout))
            .create_timeout(Some(config.acquire_timeout()))
            .recycle_timeout(Some(config.acquire_timeout()))
            .runtime(deadpool::Runtime::Tokio1)
            .build()
            .map_err(|e| DbError::Connection(format!("failed to build connection pool: {e}")))?;

        let shutdown = CancellationToken::new();
        spawn_sweeper(
            &runtime,
            pool.clone(),
            shutdown.clone(),
            config.sweep_interval(),
            config.idle_timeout(),
        );
        debug!(config = ?config, "connection pool ready");

        Ok(Self {
            inner: Arc::new(PoolInner {
                pool,
                retry: config.retry_policy(),
                config,
                _sweeper: shutdown.clone().drop_guard(),
                shutdown,
            }),
        })
    }

    /// Check out a live connection, retrying pool exhaustion and lost connections with
    /// exponential backoff.
    ///
    /// # Errors
    /// Returns the last transient error once retries run out, or the first other error. Both are
    /// logged with the configuration and pool occupancy.
    pub async fn acquire(&self) -> Result<PooledConnection, DbError> {
        retry_transient(&self.inner.retry, || self.try_acquire())
            .await
            .inspect_err(|err| {
                let status = self.status();
                error!(
                    config = ?self.inner.config,
                    max_size = status.max_size,
                    size = status.size,
                    available = status.available,
                    waiting = status.waiting,
                    error = %err,
                    "failed to acquire database connection"
                );
            })
    }

    async fn try_acquire(&self) -> Result<PooledConnection, DbError> {
        let queue_limit = self.inner.config.queue_limit;
        if queue_limit > 0 {
            let status = self.status();
            if status.available == 0 && status.waiting >= queue_limit {
                return Err(DbError::PoolExhausted(format!(
                    "{} callers already waiting (queue limit {queue_limit})",
                    status.waiting
                )));
            }
        }
        self.inner.pool.get().await.map_err(pool_error)
    }

    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let status = self.inner.pool.status();
        PoolStatus {
            max_size: status.max_size,
            size: status.size,
            available: status.available,
            waiting: status.waiting,
        }
    }

    #[must_use]
    pub fn config(&self) -> &DbConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.inner.config.backend
    }

    /// Stop the sweeper and refuse further checkouts. Connections in use close when returned.
    pub fn close(&self) {
        self.inner.shutdown.cancel();
        self.inner.pool.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.pool.is_closed()
    }
}

fn pool_error(err: PoolError<DbError>) -> DbError {
    match err {
        PoolError::Timeout(TimeoutType::Wait) => {
            DbError::PoolExhausted("timed out waiting for a free connection".into())
        }
        PoolError::Timeout(kind) => {
            DbError::ConnectionLost(format!("timed out opening a connection ({kind:?})"))
        }
        PoolError::Backend(e) => e,
        PoolError::Closed => DbError::Connection("connection pool is closed".into()),
        other => DbError::Other(other.to_string()),
    }
}

/// Periodically destroy pooled connections that are broken or idle longer than `idle_timeout`.
fn spawn_sweeper(
    runtime: &tokio::runtime::Handle,
    pool: Pool<ConnectionManager>,
    shutdown: CancellationToken,
    interval: Duration,
    idle_timeout: Duration,
) {
    runtime.spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let before = pool.status().size;
                    pool.retain(|conn, metrics| {
                        !conn.is_broken() && metrics.last_used() < idle_timeout
                    });
                    let removed = before.saturating_sub(pool.status().size);
                    if removed > 0 {
                        debug!(removed, "swept idle connections");
                    }
                }
            }
        }
        debug!("connection sweeper stopped");
    });
}
