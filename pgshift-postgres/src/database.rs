//! Migration execution against PostgreSQL.

use std::time::Duration;

use chrono::{DateTime, Utc};
use pgshift_migrate::{
    HistoryTables, MigrateResult, Migration, MigrationDatabase, MigrationError, MigrationRecord,
    Phase,
};
use tracing::{debug, info};

use crate::error::PgError;
use crate::pool::PgPool;

/// Runs migrations and keeps the history and lock tables.
///
/// Transactional migrations run their statements and the history insert in
/// one transaction. Everything else runs statement by statement in
/// autocommit on a single connection, which `CREATE INDEX CONCURRENTLY` and
/// `ALTER TYPE ... ADD VALUE` need.
#[derive(Clone)]
pub struct PgMigrationDatabase {
    pool: PgPool,
}

impl PgMigrationDatabase {
    /// Create a database handle.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn lease_secs(lease: Option<Duration>) -> Option<i64> {
    lease.map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

#[async_trait::async_trait]
impl MigrationDatabase for PgMigrationDatabase {
    async fn ensure_history(&self, tables: &HistoryTables) -> MigrateResult<()> {
        let conn = self.pool.get().await?;
        for phase in Phase::ALL {
            for sql in tables.create_sql(phase) {
                conn.batch_execute(&sql).await?;
            }
        }
        debug!(schema = %tables.schema, prefix = %tables.prefix, "History tables ready");
        Ok(())
    }

    async fn applied(&self, tables: &HistoryTables) -> MigrateResult<Vec<MigrationRecord>> {
        let conn = self.pool.get().await?;
        let mut records = Vec::new();
        for phase in Phase::ALL {
            for row in conn.query(&tables.select_applied_sql(phase), &[]).await? {
                let name: String = row.try_get(0).map_err(PgError::from)?;
                let stored: String = row.try_get(1).map_err(PgError::from)?;
                if Phase::parse(&stored) != Some(phase) {
                    return Err(MigrationError::database(format!(
                        "migration {} is recorded as {} in the {} history",
                        name, stored, phase
                    )));
                }
                let executed_at: DateTime<Utc> = row.try_get(3).map_err(PgError::from)?;
                records.push(MigrationRecord {
                    name,
                    phase,
                    checksum: row.try_get(2).map_err(PgError::from)?,
                    executed_at,
                });
            }
        }
        Ok(records)
    }

    async fn try_acquire_lock(
        &self,
        tables: &HistoryTables,
        phase: Phase,
        owner: &str,
        lease: Option<Duration>,
    ) -> MigrateResult<bool> {
        let conn = self.pool.get().await?;
        let secs = lease_secs(lease);
        let updated = conn
            .execute(&tables.acquire_lock_sql(phase), &[&owner, &secs])
            .await?;
        Ok(updated == 1)
    }

    async fn renew_lock(
        &self,
        tables: &HistoryTables,
        phase: Phase,
        owner: &str,
        lease: Duration,
    ) -> MigrateResult<()> {
        let conn = self.pool.get().await?;
        let secs = lease_secs(Some(lease));
        let updated = conn
            .execute(&tables.renew_lock_sql(phase), &[&owner, &secs])
            .await?;
        if updated != 1 {
            return Err(PgError::LockLost(format!(
                "{} lock is no longer held by {}",
                phase, owner
            ))
            .into());
        }
        Ok(())
    }

    async fn release_lock(&self, tables: &HistoryTables, phase: Phase, owner: &str) -> MigrateResult<()> {
        let conn = self.pool.get().await?;
        conn.execute(&tables.release_lock_sql(phase), &[&owner]).await?;
        Ok(())
    }

    async fn force_release_lock(&self, tables: &HistoryTables, phase: Phase) -> MigrateResult<()> {
        let conn = self.pool.get().await?;
        conn.execute(&tables.force_release_lock_sql(phase), &[]).await?;
        Ok(())
    }

    async fn apply(&self, tables: &HistoryTables, migration: &Migration) -> MigrateResult<()> {
        let mut conn = self.pool.get().await?;
        let insert = tables.insert_sql(migration.phase);
        let checksum = migration.checksum();

        if migration.transaction {
            let txn = conn.transaction().await?;
            for sql in &migration.up {
                txn.batch_execute(sql).await?;
            }
            txn.execute(&insert, &[&migration.name, &checksum]).await?;
            txn.commit().await?;
        } else {
            for sql in &migration.up {
                conn.batch_execute(sql).await?;
            }
            conn.execute(&insert, &[&migration.name, &checksum]).await?;
        }

        info!(
            migration = %migration.name,
            statements = migration.up.len(),
            transaction = migration.transaction,
            "Executed migration"
        );
        Ok(())
    }

    async fn revert(&self, tables: &HistoryTables, migration: &Migration) -> MigrateResult<()> {
        let conn = self.pool.get().await?;
        for sql in &migration.down {
            conn.batch_execute(sql).await?;
        }
        conn.execute(&tables.delete_sql(migration.phase), &[&migration.name])
            .await?;

        info!(migration = %migration.name, statements = migration.down.len(), "Reverted migration");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_secs() {
        assert_eq!(lease_secs(None), None);
        assert_eq!(lease_secs(Some(Duration::from_secs(90))), Some(90));
    }
}
