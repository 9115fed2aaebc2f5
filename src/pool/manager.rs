use std::fmt;

use deadpool::managed::{Manager, Metrics, RecycleError, RecycleResult};

use super::connection::DbConnection;
use crate::config::DbConfig;
use crate::error::DbError;

/// deadpool manager that opens backend connections and vets them before reuse.
pub struct ConnectionManager {
    config: DbConfig,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(config: DbConfig) -> Self {
        Self { config }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .finish()
    }
}

impl Manager for ConnectionManager {
    type Type = DbConnection;
    type Error = DbError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        DbConnection::connect(&self.config).await
    }

    /// Broken connections are dropped, a dangling transaction is rolled back, and the connection
    /// must answer a ping before it is handed out again.
    async fn recycle(&self, conn: &mut Self::Type, _metrics: &Metrics) -> RecycleResult<Self::Error> {
        if conn.is_broken() {
            return Err(RecycleError::Message("connection marked broken".into()));
        }
        if conn.in_transaction() {
            conn.rollback().await.map_err(RecycleError::Backend)?;
        }
        conn.ping().await.map_err(RecycleError::Backend)
    }
}
