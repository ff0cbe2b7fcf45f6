//! Migration engine orchestration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use pgshift_schema::{DatabaseDefinition, DatabaseInfo};
use tracing::{info, warn};

use crate::assembler::{ChangesetAssembler, ChangesetPlan, build_migrations};
use crate::changeset::Phase;
use crate::config::MigrationConfig;
use crate::error::{MigrateResult, MigrationError};
use crate::file::MigrationFileManager;
use crate::history::{HistoryTables, MigrationDatabase, MigrationRecord};
use crate::introspect::{IntrospectionConfig, Introspector, introspect};
use crate::migration::Migration;
use crate::rename::RenameResolver;
use crate::runner::{MigrationRunResult, MigrationRunner};

/// Migration status information.
#[derive(Debug)]
pub struct MigrationStatus {
    /// Applied migrations.
    pub applied: Vec<MigrationRecord>,
    /// Names of migrations on disk not yet applied.
    pub pending: Vec<String>,
    /// Applied migrations whose file changed since.
    pub modified: Vec<String>,
    /// Applied migrations with no file on disk.
    pub missing: Vec<String>,
}

impl MigrationStatus {
    /// Whether the database is fully migrated.
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }

    /// Get a summary of the status.
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("{} applied", self.applied.len()),
            format!("{} pending", self.pending.len()),
        ];

        if !self.modified.is_empty() {
            parts.push(format!("{} modified", self.modified.len()));
        }

        if !self.missing.is_empty() {
            parts.push(format!("{} missing", self.missing.len()));
        }

        parts.join(", ")
    }
}

/// The main migration engine.
pub struct MigrationEngine<D: MigrationDatabase> {
    config: MigrationConfig,
    db: D,
    file_manager: MigrationFileManager,
}

impl<D: MigrationDatabase> MigrationEngine<D> {
    /// Create a new migration engine.
    pub fn new(config: MigrationConfig, db: D) -> Self {
        let file_manager = MigrationFileManager::new(&config.migrations_dir);
        Self {
            config,
            db,
            file_manager,
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// The database the engine runs against.
    pub fn database(&self) -> &D {
        &self.db
    }

    /// The migration file manager.
    pub fn file_manager(&self) -> &MigrationFileManager {
        &self.file_manager
    }

    /// Create the migration directories and history tables.
    pub async fn initialize(&self) -> MigrateResult<()> {
        self.config.validate()?;
        self.file_manager.ensure_dir().await?;
        self.db
            .ensure_history(&HistoryTables::from_config(&self.config))
            .await
    }

    /// Plan the changes from a known current model.
    pub fn plan(
        &self,
        definition: &DatabaseDefinition,
        remote: &DatabaseInfo,
        resolver: &dyn RenameResolver,
    ) -> MigrateResult<ChangesetPlan> {
        ChangesetAssembler::new(&self.config, resolver).assemble(definition, remote)
    }

    /// Plan the changes against the live catalog.
    pub async fn plan_from_database<I: Introspector + ?Sized>(
        &self,
        definition: &DatabaseDefinition,
        introspector: &I,
        resolver: &dyn RenameResolver,
    ) -> MigrateResult<ChangesetPlan> {
        definition.check_schema_names()?;
        let config = IntrospectionConfig::from_config(&self.config).schemas(definition.schema_names());
        let remote = introspect(introspector, &config).await?;
        self.plan(definition, &remote, resolver)
    }

    /// Write a plan as migration files.
    ///
    /// Fails with [`MigrationError::NoChanges`] when the plan is empty.
    pub async fn generate(&self, plan: &ChangesetPlan) -> MigrateResult<Vec<PathBuf>> {
        if plan.is_empty() {
            return Err(MigrationError::NoChanges);
        }

        for warning in plan.warnings() {
            warn!(code = ?warning.code, "{}", warning);
        }

        let migrations = build_migrations(&plan.changesets, Utc::now(), self.config.granularity);
        let mut paths = Vec::with_capacity(migrations.len());
        for migration in &migrations {
            paths.push(self.file_manager.write_migration(migration).await?);
        }

        info!(count = paths.len(), dir = %self.file_manager.migrations_dir().display(), "Generated migrations");
        Ok(paths)
    }

    /// Write an empty migration to fill in by hand.
    pub async fn scaffold(&self, name: &str, phase: Phase) -> MigrateResult<Migration> {
        self.file_manager.scaffold(name, phase).await
    }

    /// Apply every pending migration on disk.
    ///
    /// In dry-run mode the pending migrations are logged and nothing runs.
    pub async fn migrate(&self) -> MigrateResult<MigrationRunResult> {
        let migrations = self.file_manager.list_migrations().await?;

        if self.config.dry_run {
            let status = self.status().await?;
            for name in &status.pending {
                info!(migration = %name, "[DRY RUN] Would apply");
            }
            return Ok(MigrationRunResult::empty());
        }

        let mut runner = MigrationRunner::new(&self.db, &self.config);
        let result = runner.run(migrations).await?;
        info!(summary = %result.summary(), "Migration run finished");
        Ok(result)
    }

    /// Revert the `count` most recently applied migrations.
    pub async fn rollback(&self, count: usize) -> MigrateResult<Vec<String>> {
        let migrations = self.file_manager.list_migrations().await?;

        if self.config.dry_run {
            let mut applied = self.db.applied(&HistoryTables::from_config(&self.config)).await?;
            applied.sort_by(|a, b| (b.phase, &b.name).cmp(&(a.phase, &a.name)));
            let names: Vec<String> = applied.into_iter().take(count).map(|r| r.name).collect();
            for name in &names {
                info!(migration = %name, "[DRY RUN] Would roll back");
            }
            return Ok(names);
        }

        MigrationRunner::new(&self.db, &self.config)
            .rollback(count, &migrations)
            .await
    }

    /// Compare migrations on disk with the history.
    pub async fn status(&self) -> MigrateResult<MigrationStatus> {
        let tables = HistoryTables::from_config(&self.config);
        self.db.ensure_history(&tables).await?;
        let applied = self.db.applied(&tables).await?;
        let files: BTreeMap<String, Migration> = self
            .file_manager
            .list_migrations()
            .await?
            .into_iter()
            .map(|m| (m.name.clone(), m))
            .collect();

        let mut modified = Vec::new();
        let mut missing = Vec::new();
        for record in &applied {
            match files.get(&record.name) {
                Some(file) if file.checksum() != record.checksum => modified.push(record.name.clone()),
                Some(_) => {}
                None => missing.push(record.name.clone()),
            }
        }

        let pending = files
            .values()
            .filter(|m| !applied.iter().any(|r| r.name == m.name))
            .map(|m| m.name.clone())
            .collect();

        Ok(MigrationStatus {
            applied,
            pending,
            modified,
            missing,
        })
    }

    /// Clear a lock left behind by a crashed run.
    pub async fn force_release_lock(&self) -> MigrateResult<()> {
        MigrationRunner::new(&self.db, &self.config)
            .force_release_locks()
            .await
    }

    /// Write the live structure to a JSON file.
    pub async fn dump_structure<I: Introspector + ?Sized>(
        &self,
        introspector: &I,
        schemas: &[String],
        path: impl AsRef<Path>,
    ) -> MigrateResult<DatabaseInfo> {
        let config = IntrospectionConfig::from_config(&self.config).schemas(schemas.iter().cloned());
        let info = introspect(introspector, &config).await?;
        info.save(path.as_ref())?;
        info!(path = %path.as_ref().display(), "Dumped structure");
        Ok(info)
    }

    /// Read a structure written by [`dump_structure`](Self::dump_structure).
    pub fn load_structure(&self, path: impl AsRef<Path>) -> MigrateResult<DatabaseInfo> {
        Ok(DatabaseInfo::load(path)?)
    }
}
