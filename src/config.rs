use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};

use crate::error::DbError;
use crate::types::Dialect;

/// Connection and pool settings.
///
/// Loaded from `DB_*` environment variables layered over [`DbConfig::default`]:
/// ```rust,no_run
/// use mysql_wizard::prelude::*;
///
/// # fn demo() -> Result<(), DbError> {
/// // DB_HOST, DB_USER, DB_PASSWORD, DB_NAME, DB_PORT, DB_CONNECTION_LIMIT, ...
/// let config = DbConfig::from_env()?;
/// # let _ = config;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DbConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    /// Database (schema) name.
    pub name: String,
    pub port: u16,
    /// Maximum number of pooled connections.
    pub connection_limit: usize,
    /// Maximum number of callers waiting for a connection; `0` means unbounded.
    pub queue_limit: usize,
    /// When false, acquisition fails immediately instead of waiting for a free connection.
    pub wait_for_connections: bool,
    pub acquire_timeout_ms: u64,
    pub retry_count: u32,
    /// Base delay of the exponential acquisition backoff.
    pub retry_delay_ms: u64,
    pub idle_timeout_ms: u64,
    pub sweep_interval_ms: u64,
    /// Read `TINYINT(1)` columns as booleans.
    pub cast_boolean: bool,
    /// Read `DECIMAL` columns as numbers instead of strings.
    pub cast_decimal: bool,
    /// Pin the session time zone to UTC.
    pub utc_dates: bool,
    pub print_query: bool,
    pub print_sql_error: bool,
    pub backend: Dialect,
    pub sqlite_path: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            user: "root".into(),
            password: String::new(),
            name: String::new(),
            port: 3306,
            connection_limit: 10,
            queue_limit: 0,
            wait_for_connections: true,
            acquire_timeout_ms: 10_000,
            retry_count: 3,
            retry_delay_ms: 100,
            idle_timeout_ms: 60_000,
            sweep_interval_ms: 30_000,
            cast_boolean: true,
            cast_decimal: true,
            utc_dates: true,
            print_query: false,
            print_sql_error: true,
            backend: Dialect::MySql,
            sqlite_path: ":memory:".into(),
        }
    }
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("name", &self.name)
            .field("port", &self.port)
            .field("connection_limit", &self.connection_limit)
            .field("queue_limit", &self.queue_limit)
            .field("wait_for_connections", &self.wait_for_connections)
            .field("retry_count", &self.retry_count)
            .field("backend", &self.backend)
            .field("sqlite_path", &self.sqlite_path)
            .finish_non_exhaustive()
    }
}

impl DbConfig {
    /// Defaults overlaid with `DB_*` environment variables.
    #[must_use]
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(DbConfig::default()))
            .merge(Env::prefixed("DB_"))
    }

    /// # Errors
    ///
    /// Returns [`DbError::Config`] when a variable cannot be parsed into its field type.
    pub fn from_env() -> Result<Self, DbError> {
        Self::from_figment(&Self::figment())
    }

    /// # Errors
    ///
    /// Returns [`DbError::Config`] when extraction fails.
    pub fn from_figment(figment: &Figment) -> Result<Self, DbError> {
        Ok(figment.extract()?)
    }

    /// Settings for a file-backed (or `:memory:`) SQLite database.
    #[must_use]
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            backend: Dialect::Sqlite,
            sqlite_path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn mysql(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_connection_limit(mut self, limit: usize) -> Self {
        self.connection_limit = limit;
        self
    }

    #[must_use]
    pub fn with_queue_limit(mut self, limit: usize) -> Self {
        self.queue_limit = limit;
        self
    }

    #[must_use]
    pub fn with_wait_for_connections(mut self, wait: bool) -> Self {
        self.wait_for_connections = wait;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, count: u32, delay_ms: u64) -> Self {
        self.retry_count = count;
        self.retry_delay_ms = delay_ms;
        self
    }

    #[must_use]
    pub fn with_idle_timeout_ms(mut self, idle_timeout_ms: u64) -> Self {
        self.idle_timeout_ms = idle_timeout_ms;
        self
    }

    #[must_use]
    pub fn with_print_query(mut self, print_query: bool) -> Self {
        self.print_query = print_query;
        self
    }

    #[must_use]
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    #[must_use]
    pub fn retry_policy(&self) -> crate::pool::RetryPolicy {
        crate::pool::RetryPolicy::new(self.retry_count, Duration::from_millis(self.retry_delay_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_mirror_documented_values() {
        let cfg = DbConfig::from_figment(&Figment::from(Serialized::defaults(DbConfig::default())))
            .unwrap();
        assert_eq!(cfg.host, "localhost");
        assert_eq!(cfg.user, "root");
        assert_eq!(cfg.port, 3306);
        assert_eq!(cfg.connection_limit, 10);
        assert_eq!(cfg.queue_limit, 0);
        assert!(cfg.wait_for_connections);
        assert_eq!(cfg.backend, Dialect::MySql);
    }

    #[test]
    fn later_providers_override_defaults() {
        let figment = Figment::from(Serialized::defaults(DbConfig::default()))
            .merge(("port", 3307))
            .merge(("name", "shop"))
            .merge(("backend", "sqlite"));
        let cfg = DbConfig::from_figment(&figment).unwrap();
        assert_eq!(cfg.port, 3307);
        assert_eq!(cfg.name, "shop");
        assert_eq!(cfg.backend, Dialect::Sqlite);
        assert_eq!(cfg.user, "root");
    }

    #[test]
    fn bad_value_is_a_config_error() {
        let figment = Figment::from(Serialized::defaults(DbConfig::default()))
            .merge(("port", "not-a-port"));
        assert!(matches!(
            DbConfig::from_figment(&figment),
            Err(DbError::Config(_))
        ));
    }

    #[test]
    fn debug_output_hides_password() {
        let cfg = DbConfig::mysql("db", "app", "hunter2", "shop");
        assert!(!format!("{cfg:?}").contains("hunter2"));
    }
}
