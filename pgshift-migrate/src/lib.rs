//! # pgshift-migrate
//!
//! Diffing, changeset generation and phased execution for pgshift.
//!
//! This crate provides functionality for:
//! - Structural diffing of two information models
//! - One changeset generator per kind of difference, each with exact `down`
//! - Ordering changesets into expand, alter and contract phases
//! - Migration files on disk and migration history in the database
//! - Locked, transactional execution with rollback of applied migrations
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌───────────┐   ┌────────────┐
//! │ Definition │──▶│            │   │           │   │            │
//! └────────────┘   │   Differ   │──▶│ Generators│──▶│ Assembler  │
//! ┌────────────┐   │            │   │           │   │            │
//! │ Introspect │──▶│            │   └───────────┘   └────────────┘
//! └────────────┘   └────────────┘         ▲               │
//!                        ▲                │               ▼
//!                  ┌────────────┐         │         ┌────────────┐
//!                  │  Renames   │─────────┘         │   Runner   │
//!                  └────────────┘                   └────────────┘
//! ```
//!
//! ## Phases
//!
//! Every changeset belongs to a phase. Expand adds what old application code
//! tolerates, alter changes things in place, contract removes what new code
//! no longer needs. Each phase has its own history table, so deployments can
//! run expand before rolling out code and contract after.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pgshift_migrate::{MigrationConfig, MigrationEngine, NoRenames};
//!
//! let engine = MigrationEngine::new(MigrationConfig::new(), database);
//! engine.initialize().await?;
//!
//! let plan = engine.plan_from_database(&definition, &introspector, &NoRenames).await?;
//! println!("Plan: {}", plan.summary());
//! engine.generate(&plan).await?;
//!
//! let result = engine.migrate().await?;
//! println!("{}", result.summary());
//! ```
//!
//! ## Migration Files
//!
//! ```text
//! migrations/
//! ├── expand/
//! │   └── 20240501120000_expand/migration.toml
//! ├── alter/
//! └── contract/
//!     └── 20240501120001_droptable_app_users/migration.toml
//! ```

pub mod assembler;
pub mod change;
pub mod changeset;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod file;
pub mod generators;
pub mod history;
pub mod introspect;
pub mod lock;
pub mod migration;
pub mod rename;
pub mod runner;

#[cfg(any(test, feature = "testing"))]
#[cfg_attr(docsrs, doc(cfg(feature = "testing")))]
pub mod testing;

// Re-exports
pub use assembler::{ChangesetAssembler, ChangesetPlan, build_migrations};
pub use change::{ColumnAttribute, SchemaChange};
pub use changeset::{Changeset, ChangesetType, Phase, Warning, WarningCode, WarningKind};
pub use config::{Granularity, MigrationConfig};
pub use diff::{DiffKind, RawDiff, SchemaDiffer};
pub use engine::{MigrationEngine, MigrationStatus};
pub use error::{AggregateError, MigrateResult, MigrationError};
pub use file::{MigrationFileManager, migration_id};
pub use generators::GenerationContext;
pub use history::{HistoryTables, MigrationDatabase, MigrationRecord};
pub use introspect::{
    CatalogSnapshot, ColumnRecord, ConstraintRecord, ConstraintType, EnumRecord, IndexRecord,
    IntrospectionConfig, Introspector, RemoteSchemaBuilder, SchemaRecord, TableRecord,
    TriggerRecord, introspect,
};
pub use lock::MigrationLock;
pub use migration::{Migration, order_migrations};
pub use rename::{
    ColumnRename, NoRenames, ObjectChange, ObjectRename, RebasedModel, RecordedRenames, RenameMap,
    RenameResolver, TableRename,
};
pub use runner::{MigrationRunResult, MigrationRunner, RunnerState};
