//! Migration execution.
//!
//! ```text
//! Idle -> LockAcquired -> Executing -> Committed   -> Idle
//!                                   \-> RollingBack -> Idle
//! ```
//!
//! Applied migrations are pushed on a stack. The first failure stops
//! execution and the stack is unwound, newest first, through each
//! migration's `down`. Locks are released on every path.

use std::collections::BTreeSet;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::changeset::Phase;
use crate::config::MigrationConfig;
use crate::error::{AggregateError, MigrateResult, MigrationError};
use crate::history::{HistoryTables, MigrationDatabase};
use crate::lock::{MigrationLock, lock_owner};
use crate::migration::{Migration, order_migrations};

/// Runner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Nothing in progress.
    Idle,
    /// Locks held, nothing run yet.
    LockAcquired,
    /// Applying migrations.
    Executing,
    /// Every migration applied.
    Committed,
    /// Unwinding after a failure.
    RollingBack,
}

/// Outcome of a run.
#[derive(Debug)]
pub struct MigrationRunResult {
    /// Whether every pending migration was applied.
    pub success: bool,
    /// The failure, with rollback and release problems attached.
    pub error: Option<AggregateError>,
    /// Migrations applied, in order. On failure these were rolled back again
    /// unless listed in the error.
    pub applied_migration_names: Vec<String>,
    /// Migrations reverted during rollback, in order.
    pub rolled_back_migration_names: Vec<String>,
}

impl MigrationRunResult {
    /// A successful run that applied nothing.
    pub fn empty() -> Self {
        Self {
            success: true,
            error: None,
            applied_migration_names: Vec::new(),
            rolled_back_migration_names: Vec::new(),
        }
    }

    /// Get a summary of the result.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();

        if !self.applied_migration_names.is_empty() {
            parts.push(format!("{} applied", self.applied_migration_names.len()));
        }

        if !self.rolled_back_migration_names.is_empty() {
            parts.push(format!("{} rolled back", self.rolled_back_migration_names.len()));
        }

        if let Some(error) = &self.error {
            parts.push(format!("failed: {}", error));
        }

        if parts.is_empty() {
            "No migrations applied".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Applies and reverts migrations under the migration lock.
pub struct MigrationRunner<'a, D: MigrationDatabase + ?Sized> {
    db: &'a D,
    tables: HistoryTables,
    owner: String,
    lock_timeout: Duration,
    lease: Option<Duration>,
    state: RunnerState,
}

impl<'a, D: MigrationDatabase + ?Sized> MigrationRunner<'a, D> {
    /// Create a runner.
    pub fn new(db: &'a D, config: &MigrationConfig) -> Self {
        Self {
            db,
            tables: HistoryTables::from_config(config),
            owner: lock_owner(),
            lock_timeout: config.lock_timeout_duration(),
            lease: config.lock_lease_duration(),
            state: RunnerState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> RunnerState {
        self.state
    }

    /// History and lock table names in use.
    pub fn tables(&self) -> &HistoryTables {
        &self.tables
    }

    fn transition(&mut self, next: RunnerState) {
        tracing::debug!(from = ?self.state, to = ?next, "Runner state change");
        self.state = next;
    }

    /// Apply every migration not yet recorded.
    ///
    /// Configuration problems (unknown dependency, cycle) are returned as
    /// `Err` before any lock is taken. Execution failures are reported in the
    /// result.
    pub async fn run(&mut self, migrations: Vec<Migration>) -> MigrateResult<MigrationRunResult> {
        let tables = self.tables.clone();
        self.db.ensure_history(&tables).await?;
        let applied: BTreeSet<String> = self
            .db
            .applied(&tables)
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect();

        let pending: Vec<Migration> = migrations
            .into_iter()
            .filter(|m| !applied.contains(&m.name))
            .collect();
        let pending = order_migrations(pending, &applied)?;

        if pending.is_empty() {
            info!("No pending migrations");
            return Ok(MigrationRunResult::empty());
        }

        let mut lock = MigrationLock::acquire(
            self.db,
            &tables,
            self.owner.clone(),
            self.lock_timeout,
            self.lease,
        )
        .await?;
        self.transition(RunnerState::LockAcquired);

        let mut result = MigrationRunResult::empty();
        let mut stack: Vec<&Migration> = Vec::new();
        let mut failure: Option<AggregateError> = None;

        self.transition(RunnerState::Executing);
        for migration in &pending {
            let outcome = match lock.renew().await {
                Ok(()) => self.db.apply(&tables, migration).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => {
                    info!(migration = %migration.name, phase = %migration.phase, "Applied migration");
                    result.applied_migration_names.push(migration.name.clone());
                    stack.push(migration);
                }
                Err(e) => {
                    error!(migration = %migration.name, error = %e, "Migration failed");
                    failure = Some(AggregateError::new(&migration.name, e));
                    break;
                }
            }
        }

        match failure {
            None => {
                self.transition(RunnerState::Committed);
                for e in lock.release().await {
                    warn!(error = %e, "Failed to release migration lock");
                }
            }
            Some(mut aggregate) => {
                self.transition(RunnerState::RollingBack);
                while let Some(migration) = stack.pop() {
                    match self.db.revert(&tables, migration).await {
                        Ok(()) => {
                            info!(migration = %migration.name, "Rolled back migration");
                            result.rolled_back_migration_names.push(migration.name.clone());
                        }
                        Err(e) => {
                            error!(migration = %migration.name, error = %e, "Rollback failed");
                            aggregate.rollback_errors.push((migration.name.clone(), e));
                        }
                    }
                }
                aggregate.release_errors = lock.release().await;
                if aggregate.requires_manual_intervention() {
                    error!("{}", aggregate);
                }
                result.success = false;
                result.error = Some(aggregate);
            }
        }

        self.transition(RunnerState::Idle);
        Ok(result)
    }

    /// Revert the `count` most recently applied migrations: contract before
    /// alter before expand, newest first within a phase.
    ///
    /// `available` supplies the bodies; every migration to revert must be in
    /// it. Returns the reverted names in order.
    pub async fn rollback(&mut self, count: usize, available: &[Migration]) -> MigrateResult<Vec<String>> {
        let tables = self.tables.clone();
        self.db.ensure_history(&tables).await?;
        let mut records = self.db.applied(&tables).await?;
        records.sort_by(|a, b| (b.phase, &b.name).cmp(&(a.phase, &a.name)));

        let targets = records
            .iter()
            .take(count)
            .map(|record| {
                available
                    .iter()
                    .find(|m| m.name == record.name)
                    .ok_or_else(|| MigrationError::NotFound(record.name.clone()))
            })
            .collect::<MigrateResult<Vec<&Migration>>>()?;

        if targets.is_empty() {
            return Ok(Vec::new());
        }

        let mut lock = MigrationLock::acquire(
            self.db,
            &tables,
            self.owner.clone(),
            self.lock_timeout,
            self.lease,
        )
        .await?;
        self.transition(RunnerState::RollingBack);

        let mut reverted = Vec::new();
        let mut failure = None;
        for migration in targets {
            let outcome = match lock.renew().await {
                Ok(()) => self.db.revert(&tables, migration).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => {
                    info!(migration = %migration.name, "Rolled back migration");
                    reverted.push(migration.name.clone());
                }
                Err(e) => {
                    failure = Some(AggregateError::new(&migration.name, e));
                    break;
                }
            }
        }

        let release_errors = lock.release().await;
        self.transition(RunnerState::Idle);

        match failure {
            Some(mut aggregate) => {
                aggregate.release_errors = release_errors;
                Err(aggregate.into())
            }
            None => {
                for e in release_errors {
                    warn!(error = %e, "Failed to release migration lock");
                }
                Ok(reverted)
            }
        }
    }

    /// Clear the lock of every phase, whoever holds it.
    pub async fn force_release_locks(&self) -> MigrateResult<()> {
        self.db.ensure_history(&self.tables).await?;
        for phase in Phase::ALL {
            warn!(phase = %phase, "Force-releasing migration lock");
            self.db.force_release_lock(&self.tables, phase).await?;
        }
        Ok(())
    }
}
