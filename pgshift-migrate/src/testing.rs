//! In-memory [`MigrationDatabase`] for tests.
//!
//! Statements are recorded instead of executed. Transactional migrations
//! that fail leave nothing behind; autocommit ones keep the statements that
//! ran before the failure.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;

use crate::changeset::Phase;
use crate::error::{MigrateResult, MigrationError};
use crate::history::{HistoryTables, MigrationDatabase, MigrationRecord};
use crate::migration::Migration;

#[derive(Debug, Default)]
struct State {
    records: Vec<MigrationRecord>,
    locks: BTreeMap<Phase, String>,
    executed: Vec<String>,
    fail_up: Option<String>,
    fail_down: Option<String>,
    fail_release: bool,
}

/// A database that records statements and history in memory.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

impl MemoryDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take a phase lock as another owner.
    pub fn hold_lock(&self, phase: Phase, owner: &str) {
        self.state().locks.insert(phase, owner.to_string());
    }

    /// Current owner of a phase lock.
    pub fn lock_holder(&self, phase: Phase) -> Option<String> {
        self.state().locks.get(&phase).cloned()
    }

    /// Fail any `up` statement containing `needle`.
    pub fn fail_up_on(&self, needle: &str) {
        self.state().fail_up = Some(needle.to_string());
    }

    /// Fail any `down` statement containing `needle`.
    pub fn fail_down_on(&self, needle: &str) {
        self.state().fail_down = Some(needle.to_string());
    }

    /// Fail every lock release.
    pub fn fail_release(&self) {
        self.state().fail_release = true;
    }

    /// Statements executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state().executed.clone()
    }

    /// Names of the applied migrations.
    pub fn applied_names(&self) -> Vec<String> {
        self.state().records.iter().map(|r| r.name.clone()).collect()
    }

    /// Whether any phase lock is held.
    pub fn is_locked(&self) -> bool {
        !self.state().locks.is_empty()
    }
}

fn run(
    state: &mut State,
    statements: &[String],
    fail: Option<&str>,
    transaction: bool,
) -> MigrateResult<()> {
    let mut done = Vec::new();
    for statement in statements {
        if fail.is_some_and(|needle| statement.contains(needle)) {
            if !transaction {
                state.executed.extend(done);
            }
            return Err(MigrationError::database(format!("statement failed: {}", statement)));
        }
        done.push(statement.clone());
    }
    state.executed.extend(done);
    Ok(())
}

#[async_trait::async_trait]
impl MigrationDatabase for MemoryDatabase {
    async fn ensure_history(&self, _tables: &HistoryTables) -> MigrateResult<()> {
        Ok(())
    }

    async fn applied(&self, _tables: &HistoryTables) -> MigrateResult<Vec<MigrationRecord>> {
        Ok(self.state().records.clone())
    }

    async fn try_acquire_lock(
        &self,
        _tables: &HistoryTables,
        phase: Phase,
        owner: &str,
        _lease: Option<Duration>,
    ) -> MigrateResult<bool> {
        let mut state = self.state();
        if state.locks.contains_key(&phase) {
            return Ok(false);
        }
        state.locks.insert(phase, owner.to_string());
        Ok(true)
    }

    async fn renew_lock(
        &self,
        _tables: &HistoryTables,
        _phase: Phase,
        _owner: &str,
        _lease: Duration,
    ) -> MigrateResult<()> {
        Ok(())
    }

    async fn release_lock(&self, _tables: &HistoryTables, phase: Phase, owner: &str) -> MigrateResult<()> {
        let mut state = self.state();
        if state.fail_release {
            return Err(MigrationError::database("release failed"));
        }
        if state.locks.get(&phase).is_some_and(|held| held == owner) {
            state.locks.remove(&phase);
        }
        Ok(())
    }

    async fn force_release_lock(&self, _tables: &HistoryTables, phase: Phase) -> MigrateResult<()> {
        self.state().locks.remove(&phase);
        Ok(())
    }

    async fn apply(&self, _tables: &HistoryTables, migration: &Migration) -> MigrateResult<()> {
        let mut state = self.state();
        let fail = state.fail_up.clone();
        run(&mut state, &migration.up, fail.as_deref(), migration.transaction)?;
        state.records.push(MigrationRecord {
            name: migration.name.clone(),
            phase: migration.phase,
            checksum: migration.checksum(),
            executed_at: Utc::now(),
        });
        Ok(())
    }

    async fn revert(&self, _tables: &HistoryTables, migration: &Migration) -> MigrateResult<()> {
        let mut state = self.state();
        let fail = state.fail_down.clone();
        run(&mut state, &migration.down, fail.as_deref(), false)?;
        state.records.retain(|r| r.name != migration.name);
        Ok(())
    }
}
