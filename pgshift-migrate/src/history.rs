//! Migration history and lock tables, and the database seam the runner
//! drives.
//!
//! Each phase has its own history table `<prefix>_<phase>_migration` and its
//! own single-row lock table `<prefix>_<phase>_migration_lock`. History rows
//! also carry their phase, constrained to the table's own.

use std::time::Duration;

use chrono::{DateTime, Utc};
use pgshift_schema::naming::{qualified, quote_literal};
use serde::{Deserialize, Serialize};

use crate::changeset::Phase;
use crate::config::MigrationConfig;
use crate::error::MigrateResult;
use crate::migration::Migration;

/// A record of an applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Migration name.
    pub name: String,
    /// Phase it was applied in.
    pub phase: Phase,
    /// Checksum of its `up` when applied.
    pub checksum: String,
    /// When it was applied.
    pub executed_at: DateTime<Utc>,
}

/// Names and SQL of the history and lock tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTables {
    /// Schema holding the tables.
    pub schema: String,
    /// Table name prefix.
    pub prefix: String,
}

impl HistoryTables {
    /// Create table names from a schema and a prefix.
    pub fn new(schema: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            prefix: prefix.into(),
        }
    }

    /// Table names configured for an engine.
    pub fn from_config(config: &MigrationConfig) -> Self {
        Self::new(&config.history_schema, &config.history_prefix)
    }

    /// History table of a phase (unqualified).
    pub fn history_table(&self, phase: Phase) -> String {
        format!("{}_{}_migration", self.prefix, phase)
    }

    /// Lock table of a phase (unqualified).
    pub fn lock_table(&self, phase: Phase) -> String {
        format!("{}_{}_migration_lock", self.prefix, phase)
    }

    /// Every table this module owns, for exclusion from introspection.
    pub fn table_names(&self) -> Vec<String> {
        Phase::ALL
            .into_iter()
            .flat_map(|phase| [self.history_table(phase), self.lock_table(phase)])
            .collect()
    }

    fn history(&self, phase: Phase) -> String {
        qualified(&self.schema, &self.history_table(phase))
    }

    fn lock(&self, phase: Phase) -> String {
        qualified(&self.schema, &self.lock_table(phase))
    }

    /// Statements creating both tables of a phase and seeding the lock row.
    ///
    /// History tables created before the `phase` column existed get it
    /// added.
    pub fn create_sql(&self, phase: Phase) -> Vec<String> {
        let phase_column = format!(
            "phase VARCHAR(16) NOT NULL DEFAULT {} CHECK (phase = {})",
            quote_literal(phase.as_str()),
            quote_literal(phase.as_str())
        );
        vec![
            format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    \
                 name VARCHAR(255) PRIMARY KEY,\n    \
                 {},\n    \
                 checksum VARCHAR(64) NOT NULL,\n    \
                 executed_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT now()\n)",
                self.history(phase),
                phase_column
            ),
            format!(
                "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
                self.history(phase),
                phase_column
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (\n    \
                 id INTEGER PRIMARY KEY CHECK (id = 1),\n    \
                 is_locked BOOLEAN NOT NULL DEFAULT false,\n    \
                 locked_by VARCHAR(255),\n    \
                 locked_at TIMESTAMP WITH TIME ZONE,\n    \
                 expires_at TIMESTAMP WITH TIME ZONE\n)",
                self.lock(phase)
            ),
            format!(
                "INSERT INTO {} (id, is_locked) VALUES (1, false) ON CONFLICT (id) DO NOTHING",
                self.lock(phase)
            ),
        ]
    }

    /// Applied migrations of a phase: `name, phase, checksum, executed_at`.
    pub fn select_applied_sql(&self, phase: Phase) -> String {
        format!(
            "SELECT name, phase, checksum, executed_at FROM {} ORDER BY name",
            self.history(phase)
        )
    }

    /// Record a migration: `$1` name, `$2` checksum.
    pub fn insert_sql(&self, phase: Phase) -> String {
        format!(
            "INSERT INTO {} (name, phase, checksum) VALUES ($1, {}, $2)",
            self.history(phase),
            quote_literal(phase.as_str())
        )
    }

    /// Forget a migration: `$1` name.
    pub fn delete_sql(&self, phase: Phase) -> String {
        format!("DELETE FROM {} WHERE name = $1", self.history(phase))
    }

    /// Take the lock if free or expired: `$1` owner, `$2` lease seconds or NULL.
    ///
    /// Affects one row when the lock was taken.
    pub fn acquire_lock_sql(&self, phase: Phase) -> String {
        format!(
            "UPDATE {} SET is_locked = true, locked_by = $1, locked_at = now(), \
             expires_at = now() + $2::bigint * interval '1 second' \
             WHERE id = 1 AND (NOT is_locked OR expires_at < now())",
            self.lock(phase)
        )
    }

    /// Push the expiry of a held lock: `$1` owner, `$2` lease seconds.
    pub fn renew_lock_sql(&self, phase: Phase) -> String {
        format!(
            "UPDATE {} SET expires_at = now() + $2::bigint * interval '1 second' \
             WHERE id = 1 AND is_locked AND locked_by = $1",
            self.lock(phase)
        )
    }

    /// Release a lock held by `$1`.
    pub fn release_lock_sql(&self, phase: Phase) -> String {
        format!(
            "UPDATE {} SET is_locked = false, locked_by = NULL, locked_at = NULL, expires_at = NULL \
             WHERE id = 1 AND locked_by = $1",
            self.lock(phase)
        )
    }

    /// Release a lock whoever holds it.
    pub fn force_release_lock_sql(&self, phase: Phase) -> String {
        format!(
            "UPDATE {} SET is_locked = false, locked_by = NULL, locked_at = NULL, expires_at = NULL \
             WHERE id = 1",
            self.lock(phase)
        )
    }

    /// Hint attached to lock failures.
    pub fn force_release_hint(&self, phase: Phase) -> String {
        format!(
            "if the holder crashed, clear {} with MigrationEngine::force_release_lock",
            self.lock(phase)
        )
    }
}

/// Everything the runner needs from a database.
///
/// `apply` runs `up` and records the migration; for transactional migrations
/// both happen in one transaction, otherwise each statement runs in
/// autocommit and the record is written last. `revert` runs `down` in
/// autocommit and deletes the record.
#[async_trait::async_trait]
pub trait MigrationDatabase: Send + Sync {
    /// Create missing history and lock tables for every phase.
    async fn ensure_history(&self, tables: &HistoryTables) -> MigrateResult<()>;

    /// Applied migrations of every phase.
    async fn applied(&self, tables: &HistoryTables) -> MigrateResult<Vec<MigrationRecord>>;

    /// Try to take the lock of a phase once. `Ok(false)` means it is held.
    async fn try_acquire_lock(
        &self,
        tables: &HistoryTables,
        phase: Phase,
        owner: &str,
        lease: Option<Duration>,
    ) -> MigrateResult<bool>;

    /// Extend the lease of a held lock.
    async fn renew_lock(
        &self,
        tables: &HistoryTables,
        phase: Phase,
        owner: &str,
        lease: Duration,
    ) -> MigrateResult<()>;

    /// Release a lock held by `owner`.
    async fn release_lock(&self, tables: &HistoryTables, phase: Phase, owner: &str) -> MigrateResult<()>;

    /// Release a lock regardless of owner.
    async fn force_release_lock(&self, tables: &HistoryTables, phase: Phase) -> MigrateResult<()>;

    /// Run `up` and record the migration.
    async fn apply(&self, tables: &HistoryTables, migration: &Migration) -> MigrateResult<()>;

    /// Run `down` and forget the migration.
    async fn revert(&self, tables: &HistoryTables, migration: &Migration) -> MigrateResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_table_names() {
        let tables = HistoryTables::new("public", "pgshift");
        assert_eq!(tables.history_table(Phase::Alter), "pgshift_alter_migration");
        assert_eq!(tables.lock_table(Phase::Contract), "pgshift_contract_migration_lock");
        assert_eq!(tables.table_names().len(), 6);
    }

    #[test]
    fn test_lock_sql() {
        let tables = HistoryTables::new("ops", "app");
        let acquire = tables.acquire_lock_sql(Phase::Expand);
        assert!(acquire.starts_with("UPDATE \"ops\".\"app_expand_migration_lock\" SET is_locked = true"));
        assert!(acquire.contains("NOT is_locked OR expires_at < now()"));
        assert!(tables.release_lock_sql(Phase::Expand).ends_with("locked_by = $1"));
        assert!(tables.create_sql(Phase::Expand)[3].contains("ON CONFLICT (id) DO NOTHING"));
    }

    #[test]
    fn test_history_rows_carry_phase() {
        let tables = HistoryTables::new("ops", "app");
        let create = tables.create_sql(Phase::Contract);
        assert!(create[0].contains("phase VARCHAR(16) NOT NULL DEFAULT 'contract' CHECK (phase = 'contract')"));
        assert_eq!(
            create[1],
            "ALTER TABLE \"ops\".\"app_contract_migration\" ADD COLUMN IF NOT EXISTS \
             phase VARCHAR(16) NOT NULL DEFAULT 'contract' CHECK (phase = 'contract')"
        );
        assert_eq!(
            tables.insert_sql(Phase::Contract),
            "INSERT INTO \"ops\".\"app_contract_migration\" (name, phase, checksum) VALUES ($1, 'contract', $2)"
        );
        assert!(tables.select_applied_sql(Phase::Contract).starts_with("SELECT name, phase, checksum"));
    }
}
