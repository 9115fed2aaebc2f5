use std::fmt;
use std::sync::Arc;

use mysql_async::prelude::Queryable;
use mysql_async::{Conn, DriverError, OptsBuilder, Params, Row};
use tracing::debug;

use super::params::{CastOptions, ColumnShape, mysql_value_to_row_value, row_value_to_mysql_value};
use crate::config::DbConfig;
use crate::error::{DbError, QueryFailure};
use crate::results::{ExecOutcome, ResultSet};
use crate::types::{Dialect, RowValues};

/// One pooled MySQL/MariaDB connection.
pub struct MysqlConnection {
    conn: Conn,
    cast: CastOptions,
    in_transaction: bool,
    broken: bool,
}

impl MysqlConnection {
    /// Connect with the host, credentials and database from `config`.
    ///
    /// When `utc_dates` is set the session time zone is pinned to UTC so `DATETIME` values are
    /// read and written as UTC.
    ///
    /// # Errors
    /// Returns [`DbError::ConnectionLost`] for network failures and [`DbError::Connection`]
    /// for anything else the server rejects.
    pub async fn connect(config: &DbConfig) -> Result<Self, DbError> {
        let mut init: Vec<String> = Vec::new();
        if config.utc_dates {
            init.push("SET time_zone = '+00:00'".to_string());
        }
        let opts = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .db_name((!config.name.is_empty()).then(|| config.name.clone()))
            .init(init);
        let conn = Conn::new(opts).await.map_err(|e| match e {
            mysql_async::Error::Io(io) => DbError::ConnectionLost(format!(
                "cannot reach {}:{}: {io}",
                config.host, config.port
            )),
            other => DbError::Connection(format!(
                "cannot connect to {}:{}: {other}",
                config.host, config.port
            )),
        })?;
        debug!(host = %config.host, port = config.port, "opened mysql connection");
        Ok(Self {
            conn,
            cast: CastOptions {
                cast_boolean: config.cast_boolean,
                cast_decimal: config.cast_decimal,
            },
            in_transaction: false,
            broken: false,
        })
    }

    /// # Errors
    /// Returns [`DbError::Query`] with the server diagnostics if the statement fails.
    pub async fn query(&mut self, sql: &str, params: &[RowValues]) -> Result<ResultSet, DbError> {
        let rows: Vec<Row> = match self.conn.exec(sql, bind(params)).await {
            Ok(rows) => rows,
            Err(e) => return Err(self.fail(sql, e)),
        };

        let Some(first) = rows.first() else {
            return Ok(ResultSet::with_capacity(0));
        };
        let shapes: Vec<ColumnShape> = first.columns_ref().iter().map(ColumnShape::from).collect();
        let names: Arc<Vec<String>> = Arc::new(
            first
                .columns_ref()
                .iter()
                .map(|column| column.name_str().into_owned())
                .collect(),
        );

        let mut result_set = ResultSet::with_capacity(rows.len());
        result_set.set_column_names(names);
        for mut row in rows {
            let values = shapes
                .iter()
                .enumerate()
                .map(|(i, shape)| {
                    row.take::<mysql_async::Value, _>(i)
                        .map_or(RowValues::Null, |value| {
                            mysql_value_to_row_value(value, *shape, self.cast)
                        })
                })
                .collect();
            result_set.add_row_values(values);
        }
        Ok(result_set)
    }

    /// # Errors
    /// Returns [`DbError::Query`] with the server diagnostics if the statement fails.
    pub async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<ExecOutcome, DbError> {
        if let Err(e) = self.conn.exec_drop(sql, bind(params)).await {
            return Err(self.fail(sql, e));
        }
        Ok(ExecOutcome {
            affected_rows: self.conn.affected_rows(),
            insert_id: self.conn.last_insert_id().unwrap_or(0),
        })
    }

    /// # Errors
    /// Returns [`DbError::Execution`] if a transaction is already open, or the server error.
    pub async fn begin_transaction(&mut self) -> Result<(), DbError> {
        if self.in_transaction {
            return Err(DbError::Execution(
                "MySQL transaction already in progress".into(),
            ));
        }
        self.simple(Dialect::MySql.begin_statement()).await?;
        self.in_transaction = true;
        Ok(())
    }

    /// # Errors
    /// Returns [`DbError::Execution`] if no transaction is open, or the server error.
    pub async fn commit(&mut self) -> Result<(), DbError> {
        if !self.in_transaction {
            return Err(DbError::Execution("MySQL transaction not active".into()));
        }
        self.simple("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    /// # Errors
    /// Returns [`DbError::Execution`] if no transaction is open, or the server error.
    pub async fn rollback(&mut self) -> Result<(), DbError> {
        if !self.in_transaction {
            return Err(DbError::Execution("MySQL transaction not active".into()));
        }
        self.in_transaction = false;
        self.simple("ROLLBACK").await
    }

    /// # Errors
    /// Returns [`DbError::ConnectionLost`] if the server does not answer.
    pub async fn ping(&mut self) -> Result<(), DbError> {
        match self.conn.ping().await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail("PING", e)),
        }
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    async fn simple(&mut self, sql: &str) -> Result<(), DbError> {
        match self.conn.query_drop(sql).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(sql, e)),
        }
    }

    /// Map a driver error, marking the connection broken when the socket is gone.
    fn fail(&mut self, sql: &str, err: mysql_async::Error) -> DbError {
        match err {
            mysql_async::Error::Server(server) => QueryFailure::new(sql, server.message)
                .with_code(server.code)
                .with_state(server.state)
                .into(),
            mysql_async::Error::Io(io) => {
                self.broken = true;
                DbError::ConnectionLost(io.to_string())
            }
            mysql_async::Error::Driver(driver) if breaks_connection(&driver) => {
                self.broken = true;
                DbError::ConnectionLost(driver.to_string())
            }
            mysql_async::Error::Driver(driver) => QueryFailure::new(sql, driver.to_string()).into(),
            other => DbError::Other(other.to_string()),
        }
    }
}

impl fmt::Debug for MysqlConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MysqlConnection")
            .field("id", &self.conn.id())
            .field("in_transaction", &self.in_transaction)
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

fn bind(params: &[RowValues]) -> Params {
    if params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(params.iter().map(row_value_to_mysql_value).collect())
    }
}

/// Driver errors after which the protocol stream can no longer be trusted.
fn breaks_connection(err: &DriverError) -> bool {
    matches!(
        err,
        DriverError::ConnectionClosed
            | DriverError::PoolDisconnected
            | DriverError::PacketOutOfOrder
            | DriverError::UnexpectedPacket { .. }
            | DriverError::PacketTooLarge { .. }
    )
}
