//! The generation pipeline.
//!
//! [`ChangesetAssembler`] takes a target model and the current one and
//! produces sorted changesets; [`build_migrations`] groups those into
//! migrations.

use chrono::{DateTime, Utc};
use pgshift_schema::hash::is_content_hash;
use pgshift_schema::naming::is_managed_trigger;
use pgshift_schema::{DatabaseDefinition, DatabaseInfo, EntryKind};
use tracing::{debug, info};

use crate::change::{classify_all, coalesce_primary_keys};
use crate::changeset::{Changeset, Phase, Warning, sort_changesets};
use crate::config::{Granularity, MigrationConfig};
use crate::diff::SchemaDiffer;
use crate::error::MigrateResult;
use crate::file::{migration_id, slug};
use crate::generators::{self, GenerationContext};
use crate::migration::Migration;
use crate::rename::{RenameMap, RenameResolver, resolve_renames};

/// Outcome of one generation run.
#[derive(Debug, Clone)]
pub struct ChangesetPlan {
    /// Changesets in execution order.
    pub changesets: Vec<Changeset>,
    /// Confirmed renames.
    pub renames: RenameMap,
}

impl ChangesetPlan {
    /// Whether nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.changesets.is_empty()
    }

    /// Every warning, in changeset order.
    pub fn warnings(&self) -> Vec<&Warning> {
        self.changesets.iter().flat_map(|c| &c.warnings).collect()
    }

    /// Changesets of one phase.
    pub fn phase(&self, phase: Phase) -> impl Iterator<Item = &Changeset> {
        self.changesets.iter().filter(move |c| c.phase == phase)
    }

    /// Get a summary of the plan.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        for phase in Phase::ALL {
            let count = self.phase(phase).count();
            if count > 0 {
                parts.push(format!("{} {}", count, phase));
            }
        }
        let warnings = self.warnings().len();
        if warnings > 0 {
            parts.push(format!("{} warnings", warnings));
        }

        if parts.is_empty() {
            "No changes".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Runs differ, generators and sorting.
pub struct ChangesetAssembler<'a> {
    config: &'a MigrationConfig,
    resolver: &'a dyn RenameResolver,
}

impl<'a> ChangesetAssembler<'a> {
    /// Create an assembler.
    pub fn new(config: &'a MigrationConfig, resolver: &'a dyn RenameResolver) -> Self {
        Self { config, resolver }
    }

    /// Plan the changes that turn `remote` into `definition`.
    pub fn assemble(&self, definition: &DatabaseDefinition, remote: &DatabaseInfo) -> MigrateResult<ChangesetPlan> {
        definition.check_schema_names()?;
        let local = definition.to_info()?;
        self.assemble_info(local, remote)
    }

    /// Plan the changes that turn `remote` into `local`.
    pub fn assemble_info(&self, mut local: DatabaseInfo, remote: &DatabaseInfo) -> MigrateResult<ChangesetPlan> {
        let mut remote = remote.clone();
        for ignored in &self.config.ignore_extensions {
            local.extensions.remove(ignored);
            remote.extensions.remove(ignored);
        }
        adopt_external(&mut local, &remote);

        let renames = resolve_renames(&local, &remote, self.resolver)?;
        let rebased = renames.rebase(&remote, &local);

        let raw = SchemaDiffer::new(&local, &rebased.info).diff();
        debug!(entries = raw.len(), "Diffed schema models");

        let ctx = GenerationContext::new(&local, &rebased.info, &renames, self.config.debug)
            .with_objects(&rebased.objects);
        let changes = coalesce_primary_keys(classify_all(&raw)?, |s, t| ctx.is_surviving(s, t));

        let mut changesets = Vec::new();
        for change in &changes {
            changesets.extend(generators::generate(change, &ctx)?);
        }
        changesets.extend(generators::generate_renames(&ctx));
        sort_changesets(&mut changesets);

        let plan = ChangesetPlan { changesets, renames };
        info!(summary = %plan.summary(), "Assembled changesets");
        Ok(plan)
    }
}

impl std::fmt::Debug for ChangesetAssembler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangesetAssembler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Copy unmanaged objects found on tables the target declares, so they are
/// preserved instead of dropped.
///
/// Introspection only returns unmanaged objects that were configured as
/// external, so every entry not keyed by a content hash is one of those.
pub fn adopt_external(local: &mut DatabaseInfo, remote: &DatabaseInfo) {
    for (name, current) in &remote.schemas {
        let Some(target) = local.schemas.get_mut(name) else {
            continue;
        };
        for kind in EntryKind::ALL {
            for (table, entries) in current.entries(kind) {
                if !target.tables.contains_key(table) {
                    continue;
                }
                for (key, value) in entries {
                    let managed = match kind {
                        EntryKind::Trigger => is_managed_trigger(key),
                        _ => is_content_hash(key),
                    };
                    if managed {
                        continue;
                    }
                    debug!(schema = %name, table = %table, object = %key, "Adopting external object");
                    target
                        .entries_mut(kind)
                        .entry(table.clone())
                        .or_default()
                        .entry(key.clone())
                        .or_insert_with(|| value.clone());
                }
            }
        }
    }
}

/// Group sorted changesets into migrations.
///
/// Within a phase, consecutive transactional changesets share a migration
/// whose `down` reverts them newest first. A non-transactional changeset
/// always gets a migration of its own. Each migration depends on the one
/// before it in the same phase. Ids start at `base` and increase by one
/// second per migration.
pub fn build_migrations(changesets: &[Changeset], base: DateTime<Utc>, granularity: Granularity) -> Vec<Migration> {
    let mut groups: Vec<(Phase, Vec<&Changeset>)> = Vec::new();

    for phase in Phase::ALL {
        let mut current: Vec<&Changeset> = Vec::new();
        for changeset in changesets.iter().filter(|c| c.phase == phase) {
            if changeset.up.is_empty() && changeset.down.is_empty() {
                continue;
            }
            let alone = !changeset.transaction || granularity == Granularity::Changeset;
            if alone {
                if !current.is_empty() {
                    groups.push((phase, std::mem::take(&mut current)));
                }
                groups.push((phase, vec![changeset]));
            } else {
                current.push(changeset);
            }
        }
        if !current.is_empty() {
            groups.push((phase, current));
        }
    }

    let mut migrations: Vec<Migration> = Vec::with_capacity(groups.len());
    for (offset, (phase, group)) in groups.into_iter().enumerate() {
        let label = match group.as_slice() {
            [single] => slug(&single.describe()),
            _ => slug(phase.as_str()),
        };
        let name = format!("{}_{}", migration_id(base, offset as i64), label);

        let mut migration = Migration::new(name, phase)
            .up(group.iter().flat_map(|c| c.up.iter().cloned()))
            .down(group.iter().rev().flat_map(|c| c.down.iter().cloned()));
        if group.iter().any(|c| !c.transaction) {
            migration = migration.non_transactional();
        }
        if let Some(previous) = migrations.last().filter(|m| m.phase == phase) {
            migration = migration.depends_on(previous.name.clone());
        }
        migration.warnings = group.iter().flat_map(|c| c.warnings.iter().cloned()).collect();
        migrations.push(migration);
    }
    migrations
}
