//! Error types for PostgreSQL operations.

use pgshift_migrate::MigrationError;
use thiserror::Error;

/// Result type for PostgreSQL operations.
pub type PgResult<T> = Result<T, PgError>;

/// Errors that can occur during PostgreSQL operations.
#[derive(Error, Debug)]
pub enum PgError {
    /// Connection pool error.
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// PostgreSQL error.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// A statement failed.
    #[error("statement failed: {message}\n{statement}")]
    Statement {
        /// The statement.
        statement: String,
        /// Server message, with SQLSTATE when available.
        message: String,
    },

    /// The catalog returned something unexpected.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// The migration lock was lost while running.
    #[error("lock lost: {0}")]
    LockLost(String),
}

impl PgError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a catalog error.
    pub fn catalog(message: impl Into<String>) -> Self {
        Self::Catalog(message.into())
    }

    /// Wrap a driver error raised by `statement`.
    pub fn statement(statement: &str, error: tokio_postgres::Error) -> Self {
        let message = match error.as_db_error() {
            Some(db) => format!("{} ({})", db.message(), db.code().code()),
            None => error.to_string(),
        };
        Self::Statement {
            statement: statement.to_string(),
            message,
        }
    }

    /// SQLSTATE of the underlying server error, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Postgres(e) => e.code().map(|c| c.code()),
            _ => None,
        }
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Pool(_) | Self::Connection(_))
    }
}

impl From<PgError> for MigrationError {
    fn from(err: PgError) -> Self {
        match err {
            PgError::Config(msg) => MigrationError::config(msg),
            PgError::LockLost(msg) => MigrationError::lock_failed(msg),
            other => MigrationError::database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PgError::config("invalid URL");
        assert!(matches!(err, PgError::Config(_)));

        let err = PgError::connection("connection refused");
        assert!(err.is_connection_error());
        assert!(err.code().is_none());
    }

    #[test]
    fn test_into_migration_error() {
        let err: MigrationError = PgError::config("missing database").into();
        assert!(matches!(err, MigrationError::Config(_)));

        let err: MigrationError = PgError::LockLost("expand".to_string()).into();
        assert!(err.is_recoverable());

        let err: MigrationError = PgError::Statement {
            statement: "DROP TABLE x".to_string(),
            message: "table does not exist (42P01)".to_string(),
        }
        .into();
        assert!(matches!(err, MigrationError::Database(msg) if msg.contains("42P01")));
    }
}
