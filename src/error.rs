use thiserror::Error;

/// MySQL deadlock (`ER_LOCK_DEADLOCK`).
pub const ER_LOCK_DEADLOCK: u16 = 1213;
/// MySQL lock wait timeout (`ER_LOCK_WAIT_TIMEOUT`).
pub const ER_LOCK_WAIT_TIMEOUT: u16 = 1205;

/// Driver-reported failure of a single statement.
///
/// Carries the diagnostic fields the handler logs before rethrowing: the SQL text, the driver
/// message, the numeric error code and the SQLSTATE when the driver exposes one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFailure {
    pub sql: String,
    pub message: String,
    pub code: Option<u16>,
    pub state: Option<String>,
    pub lock_contention: bool,
}

impl QueryFailure {
    #[must_use]
    pub fn new(sql: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            message: message.into(),
            code: None,
            state: None,
            lock_contention: false,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    #[must_use]
    pub fn with_lock_contention(mut self, contended: bool) -> Self {
        self.lock_contention = contended;
        self
    }

    /// Deadlocks and lock wait timeouts are expected under contention and log at lower severity.
    #[must_use]
    pub fn is_lock_contention(&self) -> bool {
        self.lock_contention
            || matches!(self.code, Some(ER_LOCK_DEADLOCK | ER_LOCK_WAIT_TIMEOUT))
    }
}

impl std::fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(code) = self.code {
            write!(f, " (code {code}")?;
            if let Some(state) = &self.state {
                write!(f, ", state {state}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection pool exhausted: {0}")]
    PoolExhausted(String),

    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(Box<QueryFailure>),

    #[error("Not found")]
    NotFound { table: String },

    #[error("Relation '{0}' not found in repository configuration")]
    UnknownRelation(String),

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQL execution error: {0}")]
    Execution(String),

    #[error("Other database error: {0}")]
    Other(String),
}

impl DbError {
    /// Errors the pool acquisition path retries with backoff.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::PoolExhausted(_) | Self::ConnectionLost(_))
    }

    #[must_use]
    pub fn query_failure(&self) -> Option<&QueryFailure> {
        if let Self::Query(failure) = self {
            Some(failure)
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_lock_contention(&self) -> bool {
        self.query_failure()
            .is_some_and(QueryFailure::is_lock_contention)
    }
}

impl From<QueryFailure> for DbError {
    fn from(failure: QueryFailure) -> Self {
        DbError::Query(Box::new(failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadlock_and_lock_wait_are_contention() {
        let deadlock = QueryFailure::new("UPDATE t SET a = 1", "Deadlock found").with_code(1213);
        let wait = QueryFailure::new("UPDATE t SET a = 1", "Lock wait timeout").with_code(1205);
        let syntax = QueryFailure::new("SELEC 1", "syntax").with_code(1064);
        assert!(DbError::from(deadlock).is_lock_contention());
        assert!(DbError::from(wait).is_lock_contention());
        assert!(!DbError::from(syntax).is_lock_contention());
    }

    #[test]
    fn only_pool_and_connection_loss_are_transient() {
        assert!(DbError::PoolExhausted("timeout".into()).is_transient());
        assert!(DbError::ConnectionLost("reset".into()).is_transient());
        assert!(!DbError::Connection("access denied".into()).is_transient());
        assert!(!DbError::from(QueryFailure::new("x", "y")).is_transient());
    }

    #[test]
    fn messages_match_caller_expectations() {
        assert_eq!(
            DbError::UnknownRelation("posts".into()).to_string(),
            "Relation 'posts' not found in repository configuration"
        );
        assert_eq!(
            DbError::NotFound { table: "users".into() }.to_string(),
            "Not found"
        );
    }
}
