//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use pgshift::migrate::{MigrationConfig, MigrationEngine};

pub use pgshift::migrate::testing::MemoryDatabase;

/// Route engine logs to the test harness; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// An engine over a fresh in-memory database writing into `dir`.
pub fn engine(dir: &Path) -> MigrationEngine<MemoryDatabase> {
    init_tracing();
    let config = MigrationConfig::new()
        .migrations_dir(dir)
        .lock_timeout(Duration::from_millis(50));
    MigrationEngine::new(config, MemoryDatabase::new())
}
