//! The pool shared by [`PgMigrationDatabase`](crate::PgMigrationDatabase)
//! and [`PgIntrospector`](crate::PgIntrospector).
//!
//! Connections open lazily. Checking one out waits at most the configured
//! connect timeout, so a saturated or unreachable server fails a run instead
//! of stalling it.

use std::sync::Arc;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::debug;

use crate::config::PgConfig;
use crate::connection::PgConnection;
use crate::error::{PgError, PgResult};

/// Connections kept by [`PgPool::new`].
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Pooled connections to the migrated database.
#[derive(Clone)]
pub struct PgPool {
    inner: Pool,
    config: Arc<PgConfig>,
}

impl PgPool {
    /// Pool of [`DEFAULT_POOL_SIZE`] connections.
    pub fn new(config: PgConfig) -> PgResult<Self> {
        Self::with_size(config, DEFAULT_POOL_SIZE)
    }

    /// Pool of at most `size` connections (at least one).
    pub fn with_size(config: PgConfig, size: usize) -> PgResult<Self> {
        let manager = Manager::from_config(
            config.to_pg_config(),
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );
        let timeout = Some(config.connect_timeout);
        let inner = Pool::builder(manager)
            .max_size(size.max(1))
            .wait_timeout(timeout)
            .create_timeout(timeout)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| PgError::config(format!("failed to create pool: {}", e)))?;

        debug!(
            host = %config.host,
            database = %config.database,
            size = size.max(1),
            "Migration pool ready"
        );
        Ok(Self {
            inner,
            config: Arc::new(config),
        })
    }

    /// Check out a connection.
    pub async fn get(&self) -> PgResult<PgConnection> {
        Ok(PgConnection::new(self.inner.get().await?))
    }

    /// Upper bound on open connections.
    pub fn max_size(&self) -> usize {
        self.inner.status().max_size
    }

    /// Connection settings.
    pub fn config(&self) -> &PgConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config() -> PgConfig {
        PgConfig::from_url("postgres://localhost:1/pgshift_test?connect_timeout=2").unwrap()
    }

    #[tokio::test]
    async fn test_pool_is_lazy() {
        let pool = PgPool::new(config()).unwrap();
        assert_eq!(pool.max_size(), DEFAULT_POOL_SIZE);
        assert_eq!(pool.inner.status().size, 0);
        assert_eq!(pool.config().connect_timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_pool_size_is_at_least_one() {
        assert_eq!(PgPool::with_size(config(), 0).unwrap().max_size(), 1);
    }
}
