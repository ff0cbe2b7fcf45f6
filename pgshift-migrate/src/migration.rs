//! Migrations: ordered, named groups of changesets.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::changeset::{Phase, Warning};
use crate::error::{MigrateResult, MigrationError};

/// A unit of execution: applied and recorded as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Migration {
    /// Unique name, `<timestamp>_<slug>`.
    pub name: String,
    /// Phase this migration belongs to.
    pub phase: Phase,
    /// Run `up` inside one transaction.
    pub transaction: bool,
    /// Hand-written migration with no generated content.
    #[serde(default)]
    pub scaffold: bool,
    /// Forward statements.
    pub up: Vec<String>,
    /// Inverse statements.
    pub down: Vec<String>,
    /// Migrations that must be applied first.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Warnings of the changesets folded into this migration.
    #[serde(default)]
    pub warnings: Vec<Warning>,
}

impl Migration {
    /// Create an empty transactional migration.
    pub fn new(name: impl Into<String>, phase: Phase) -> Self {
        Self {
            name: name.into(),
            phase,
            transaction: true,
            scaffold: false,
            up: Vec::new(),
            down: Vec::new(),
            depends_on: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add a dependency.
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    /// Add forward statements.
    pub fn up(mut self, sql: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.up.extend(sql.into_iter().map(Into::into));
        self
    }

    /// Add inverse statements.
    pub fn down(mut self, sql: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.down.extend(sql.into_iter().map(Into::into));
        self
    }

    /// Run statement by statement in autocommit.
    pub fn non_transactional(mut self) -> Self {
        self.transaction = false;
        self
    }

    /// Checksum of the forward statements.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for statement in &self.up {
            hasher.update(statement.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

/// Order migrations by phase then name, honouring `depends_on`.
///
/// Dependencies on migrations in `applied` are already satisfied. Ties are
/// broken by `(phase, name)` so the order is deterministic.
pub fn order_migrations(
    migrations: Vec<Migration>,
    applied: &BTreeSet<String>,
) -> MigrateResult<Vec<Migration>> {
    let mut pending: BTreeMap<(Phase, String), Migration> = migrations
        .into_iter()
        .map(|m| ((m.phase, m.name.clone()), m))
        .collect();
    let names: BTreeSet<String> = pending.keys().map(|(_, name)| name.clone()).collect();

    for migration in pending.values() {
        for dependency in &migration.depends_on {
            if !names.contains(dependency) && !applied.contains(dependency) {
                return Err(MigrationError::MissingDependency {
                    migration: migration.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }

    let mut done: BTreeSet<String> = BTreeSet::new();
    let mut ordered = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let next = pending
            .iter()
            .find(|(_, m)| {
                m.depends_on
                    .iter()
                    .all(|d| done.contains(d) || applied.contains(d))
            })
            .map(|(key, _)| key.clone());

        let Some(key) = next else {
            let stuck = pending
                .values()
                .next()
                .map(|m| m.name.clone())
                .unwrap_or_default();
            return Err(MigrationError::DependencyCycle(stuck));
        };

        if let Some(migration) = pending.remove(&key) {
            done.insert(migration.name.clone());
            ordered.push(migration);
        }
    }
    Ok(ordered)
}
