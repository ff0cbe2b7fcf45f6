//! The migration lock.
//!
//! One persisted lock row per phase. All three are taken in phase order
//! before anything runs, so two runners can never interleave.

use std::time::Duration;

use chrono::Utc;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::changeset::Phase;
use crate::error::{MigrateResult, MigrationError};
use crate::history::{HistoryTables, MigrationDatabase};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Lock owner id for this process.
pub fn lock_owner() -> String {
    format!(
        "pgshift-{}-{}",
        std::process::id(),
        Utc::now().format("%Y%m%d%H%M%S%6f")
    )
}

/// Held locks of every phase.
pub struct MigrationLock<'a, D: MigrationDatabase + ?Sized> {
    db: &'a D,
    tables: &'a HistoryTables,
    owner: String,
    lease: Option<Duration>,
    held: Vec<Phase>,
}

impl<'a, D: MigrationDatabase + ?Sized> MigrationLock<'a, D> {
    /// Take every phase lock, waiting up to `timeout` for each.
    ///
    /// On failure the locks taken so far are released again.
    pub async fn acquire(
        db: &'a D,
        tables: &'a HistoryTables,
        owner: impl Into<String>,
        timeout: Duration,
        lease: Option<Duration>,
    ) -> MigrateResult<Self> {
        let mut lock = Self {
            db,
            tables,
            owner: owner.into(),
            lease,
            held: Vec::new(),
        };

        for phase in Phase::ALL {
            if let Err(e) = lock.acquire_phase(phase, timeout).await {
                for release_error in lock.release().await {
                    warn!(error = %release_error, "Failed to release lock after acquisition failure");
                }
                return Err(e);
            }
        }

        info!(owner = %lock.owner, "Migration lock acquired");
        Ok(lock)
    }

    async fn acquire_phase(&mut self, phase: Phase, timeout: Duration) -> MigrateResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self
                .db
                .try_acquire_lock(self.tables, phase, &self.owner, self.lease)
                .await?
            {
                debug!(phase = %phase, owner = %self.owner, "Phase lock acquired");
                self.held.push(phase);
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(MigrationError::lock_failed(format!(
                    "{} lock still held after {:?}; {}",
                    phase,
                    timeout,
                    self.tables.force_release_hint(phase)
                )));
            }
            sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Owner id recorded in the lock rows.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Phases currently held.
    pub fn held(&self) -> &[Phase] {
        &self.held
    }

    /// Extend the lease of every held lock. No-op without a lease.
    pub async fn renew(&self) -> MigrateResult<()> {
        let Some(lease) = self.lease else {
            return Ok(());
        };
        for phase in &self.held {
            self.db
                .renew_lock(self.tables, *phase, &self.owner, lease)
                .await?;
        }
        Ok(())
    }

    /// Release every held lock, newest first, collecting failures.
    pub async fn release(&mut self) -> Vec<MigrationError> {
        let mut errors = Vec::new();
        while let Some(phase) = self.held.pop() {
            match self.db.release_lock(self.tables, phase, &self.owner).await {
                Ok(()) => debug!(phase = %phase, "Phase lock released"),
                Err(e) => errors.push(e),
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryDatabase;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_acquire_and_release_in_order() {
        let db = MemoryDatabase::new();
        let tables = HistoryTables::new("public", "pgshift");

        let mut lock = MigrationLock::acquire(&db, &tables, "me", Duration::from_secs(1), None)
            .await
            .unwrap();
        assert_eq!(lock.held(), &Phase::ALL);
        assert_eq!(db.lock_holder(Phase::Alter), Some("me".to_string()));

        assert!(lock.release().await.is_empty());
        assert!(lock.held().is_empty());
        assert_eq!(db.lock_holder(Phase::Alter), None);
    }

    #[tokio::test]
    async fn test_held_lock_times_out_and_rolls_back_partial_acquisition() {
        let db = MemoryDatabase::new();
        let tables = HistoryTables::new("public", "pgshift");
        db.hold_lock(Phase::Contract, "someone-else");

        let result = MigrationLock::acquire(&db, &tables, "me", Duration::from_millis(50), None).await;
        let err = match result {
            Err(e) => e,
            Ok(_) => panic!("lock should not be acquired"),
        };
        assert!(matches!(err, MigrationError::LockFailed(_)));
        assert!(err.to_string().contains("force_release_lock"));

        assert_eq!(db.lock_holder(Phase::Expand), None);
        assert_eq!(db.lock_holder(Phase::Contract), Some("someone-else".to_string()));
    }
}
