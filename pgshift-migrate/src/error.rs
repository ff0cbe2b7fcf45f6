//! Error types for the migration engine.

use std::fmt;

use pgshift_schema::SchemaError;
use thiserror::Error;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrationError>;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database operation error.
    #[error("Database error: {0}")]
    Database(String),

    /// Schema definition or information model error.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Invalid migration file or format.
    #[error("Invalid migration: {0}")]
    InvalidMigration(String),

    /// Migration not found.
    #[error("Migration '{0}' not found")]
    NotFound(String),

    /// Lock acquisition failed.
    #[error("Failed to acquire migration lock: {0}")]
    LockFailed(String),

    /// No changes to migrate.
    #[error("No schema changes detected")]
    NoChanges,

    /// The differ produced an entry no generator understands.
    #[error("Unrecognized schema difference at '{path}'")]
    UnrecognizedDiff {
        /// Slash-joined diff path.
        path: String,
    },

    /// A migration depends on one that does not exist.
    #[error("Migration '{migration}' depends on unknown migration '{dependency}'")]
    MissingDependency {
        /// Dependent migration.
        migration: String,
        /// Missing dependency.
        dependency: String,
    },

    /// Migration dependencies form a cycle.
    #[error("Migration dependency cycle involving '{0}'")]
    DependencyCycle(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Migration execution failed.
    #[error(transparent)]
    Execution(#[from] AggregateError),

    /// General migration error.
    #[error("Migration error: {0}")]
    Other(String),
}

impl MigrationError {
    /// Create a database error.
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a lock failed error.
    pub fn lock_failed(msg: impl Into<String>) -> Self {
        Self::LockFailed(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an unrecognized diff error.
    pub fn unrecognized(path: &[String]) -> Self {
        Self::UnrecognizedDiff {
            path: path.join("/"),
        }
    }

    /// Create a migration file error.
    pub fn migration_file(msg: impl Into<String>) -> Self {
        Self::InvalidMigration(msg.into())
    }

    /// Create an other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Check if this is a recoverable error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::LockFailed(_) | Self::NoChanges)
    }

    /// Whether this error is raised before any DDL runs.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::MissingDependency { .. }
                | Self::DependencyCycle(_)
                | Self::Schema(SchemaError::DuplicateSchema { .. })
        )
    }
}

/// A failed migration run, with whatever went wrong while cleaning up.
#[derive(Debug)]
pub struct AggregateError {
    /// Migration whose `up` failed.
    pub migration: String,
    /// The original failure.
    pub error: Box<MigrationError>,
    /// Failures while reverting applied migrations, by migration name.
    pub rollback_errors: Vec<(String, MigrationError)>,
    /// Failures while releasing locks.
    pub release_errors: Vec<MigrationError>,
}

impl AggregateError {
    /// Wrap the failure of one migration.
    pub fn new(migration: impl Into<String>, error: MigrationError) -> Self {
        Self {
            migration: migration.into(),
            error: Box::new(error),
            rollback_errors: Vec::new(),
            release_errors: Vec::new(),
        }
    }

    /// Whether the database may be left half migrated.
    pub fn requires_manual_intervention(&self) -> bool {
        !self.rollback_errors.is_empty()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "migration '{}' failed: {}", self.migration, self.error)?;

        if !self.rollback_errors.is_empty() {
            let failed: Vec<String> = self
                .rollback_errors
                .iter()
                .map(|(name, e)| format!("{} ({})", name, e))
                .collect();
            write!(
                f,
                "; rollback failed for {}; manual intervention is required",
                failed.join(", ")
            )?;
        }

        if !self.release_errors.is_empty() {
            let failed: Vec<String> = self.release_errors.iter().map(|e| e.to_string()).collect();
            write!(f, "; lock release failed: {}", failed.join(", "))?;
        }

        Ok(())
    }
}

impl std::error::Error for AggregateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MigrationError::NotFound("20231215120000_test".to_string());
        assert!(err.to_string().contains("20231215120000_test"));
    }

    #[test]
    fn test_unrecognized_diff_path() {
        let path = vec!["schema".to_string(), "app".to_string(), "views".to_string()];
        let err = MigrationError::unrecognized(&path);
        assert!(err.to_string().contains("schema/app/views"));
    }

    #[test]
    fn test_is_recoverable() {
        assert!(MigrationError::NoChanges.is_recoverable());
        assert!(MigrationError::LockFailed("timeout".to_string()).is_recoverable());
        assert!(!MigrationError::Database("connection".to_string()).is_recoverable());
    }

    #[test]
    fn test_aggregate_error_display() {
        let mut err = AggregateError::new(
            "20240101000000_expand",
            MigrationError::database("relation does not exist"),
        );
        assert!(!err.requires_manual_intervention());
        assert!(!err.to_string().contains("manual intervention"));

        err.rollback_errors.push((
            "20231231000000_expand".to_string(),
            MigrationError::database("cannot drop"),
        ));
        assert!(err.requires_manual_intervention());
        let msg = err.to_string();
        assert!(msg.contains("20240101000000_expand"));
        assert!(msg.contains("20231231000000_expand"));
        assert!(msg.contains("manual intervention"));
    }
}
