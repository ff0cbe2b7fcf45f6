//! # pgshift-postgres
//!
//! PostgreSQL backend for pgshift.
//!
//! This crate provides:
//! - Connection pool management using `deadpool-postgres`
//! - Catalog introspection ([`PgIntrospector`]) feeding the remote schema builder
//! - Migration execution, history and phase locks ([`PgMigrationDatabase`])
//!
//! ## Example
//!
//! ```rust,ignore
//! use pgshift_migrate::{MigrationConfig, MigrationEngine, NoRenames};
//! use pgshift_postgres::connect;
//!
//! let config = MigrationConfig::from_file("pgshift.toml").await?;
//! let (database, introspector) = connect(&config)?;
//!
//! let engine = MigrationEngine::new(config, database);
//! engine.initialize().await?;
//! let plan = engine.plan_from_database(&definition, &introspector, &NoRenames).await?;
//! ```

pub mod config;
pub mod connection;
pub mod database;
pub mod error;
pub mod introspect;
pub mod pool;

pub use config::PgConfig;
pub use connection::{PgConnection, PgTransaction};
pub use database::PgMigrationDatabase;
pub use error::{PgError, PgResult};
pub use introspect::PgIntrospector;
pub use pool::{DEFAULT_POOL_SIZE, PgPool};

use pgshift_migrate::MigrationConfig;

/// Build a pool from the engine configuration and hand out both backends
/// sharing it.
///
/// The pool connects lazily; nothing touches the server until the first
/// query.
pub fn connect(config: &MigrationConfig) -> PgResult<(PgMigrationDatabase, PgIntrospector)> {
    let pool = PgPool::new(PgConfig::from_migration_config(config)?)?;
    Ok((PgMigrationDatabase::new(pool.clone()), PgIntrospector::new(pool)))
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::PgConfig;
    pub use crate::database::PgMigrationDatabase;
    pub use crate::error::{PgError, PgResult};
    pub use crate::introspect::PgIntrospector;
    pub use crate::pool::PgPool;
    pub use crate::connect;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_requires_url() {
        let err = connect(&MigrationConfig::new()).err().unwrap();
        assert!(matches!(err, PgError::Config(_)));
    }

    #[tokio::test]
    async fn test_connect_shares_pool() {
        let config = MigrationConfig::new().database_url("postgres://localhost:1/pgshift_test");
        let (database, _introspector) = connect(&config).unwrap();
        assert_eq!(database.pool().max_size(), DEFAULT_POOL_SIZE);
        assert_eq!(database.pool().config().database, "pgshift_test");
    }
}
