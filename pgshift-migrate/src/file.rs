//! Migration file management.
//!
//! Migrations live in `<migrations_dir>/<phase>/<name>/migration.toml`, where
//! `name` is `YYYYMMDDHHMMSS_slug`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::changeset::{Phase, Warning};
use crate::error::{MigrateResult, MigrationError};
use crate::migration::Migration;

/// File name of a migration body.
pub const MIGRATION_FILE: &str = "migration.toml";

/// On-disk body of a migration. The name comes from the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct MigrationDocument {
    phase: Phase,
    #[serde(default = "default_transaction")]
    transaction: bool,
    #[serde(default)]
    scaffold: bool,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    up: Vec<String>,
    #[serde(default)]
    down: Vec<String>,
    #[serde(default)]
    warnings: Vec<Warning>,
}

fn default_transaction() -> bool {
    true
}

impl MigrationDocument {
    fn from_migration(migration: &Migration) -> Self {
        Self {
            phase: migration.phase,
            transaction: migration.transaction,
            scaffold: migration.scaffold,
            depends_on: migration.depends_on.clone(),
            up: migration.up.clone(),
            down: migration.down.clone(),
            warnings: migration.warnings.clone(),
        }
    }

    fn into_migration(self, name: String) -> Migration {
        Migration {
            name,
            phase: self.phase,
            transaction: self.transaction,
            scaffold: self.scaffold,
            up: self.up,
            down: self.down,
            depends_on: self.depends_on,
            warnings: self.warnings,
        }
    }
}

/// Migration file reader/writer.
#[derive(Debug, Clone)]
pub struct MigrationFileManager {
    migrations_dir: PathBuf,
}

impl MigrationFileManager {
    /// Create a new file manager.
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    /// Get the migrations directory.
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Directory of one phase.
    pub fn phase_dir(&self, phase: Phase) -> PathBuf {
        self.migrations_dir.join(phase.as_str())
    }

    /// Ensure the per-phase directories exist.
    pub async fn ensure_dir(&self) -> MigrateResult<()> {
        for phase in Phase::ALL {
            tokio::fs::create_dir_all(self.phase_dir(phase))
                .await
                .map_err(MigrationError::Io)?;
        }
        Ok(())
    }

    /// List every migration on disk, by phase then name.
    pub async fn list_migrations(&self) -> MigrateResult<Vec<Migration>> {
        let mut migrations = Vec::new();

        for phase in Phase::ALL {
            let dir = self.phase_dir(phase);
            if !dir.exists() {
                continue;
            }

            let mut entries = tokio::fs::read_dir(&dir).await.map_err(MigrationError::Io)?;
            let mut paths = Vec::new();
            while let Some(entry) = entries.next_entry().await.map_err(MigrationError::Io)? {
                let path = entry.path();
                if path.join(MIGRATION_FILE).is_file() {
                    paths.push(path);
                }
            }
            paths.sort();

            for path in paths {
                let migration = self.read_migration(&path).await?;
                if migration.phase != phase {
                    return Err(MigrationError::migration_file(format!(
                        "{} declares phase '{}' but lives under '{}'",
                        path.display(),
                        migration.phase,
                        phase
                    )));
                }
                migrations.push(migration);
            }
        }

        Ok(migrations)
    }

    /// Read a migration from its directory.
    pub async fn read_migration(&self, path: &Path) -> MigrateResult<Migration> {
        let dir_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| MigrationError::migration_file(format!("invalid path {}", path.display())))?;
        parse_migration_name(dir_name)?;

        let content = tokio::fs::read_to_string(path.join(MIGRATION_FILE))
            .await
            .map_err(MigrationError::Io)?;
        let document: MigrationDocument = toml::from_str(&content).map_err(|e| {
            MigrationError::migration_file(format!("{}: {}", path.display(), e))
        })?;

        Ok(document.into_migration(dir_name.to_string()))
    }

    /// Write a migration to disk, returning its directory.
    pub async fn write_migration(&self, migration: &Migration) -> MigrateResult<PathBuf> {
        parse_migration_name(&migration.name)?;

        let dir = self.phase_dir(migration.phase).join(&migration.name);
        tokio::fs::create_dir_all(&dir).await.map_err(MigrationError::Io)?;

        let content = toml::to_string_pretty(&MigrationDocument::from_migration(migration))
            .map_err(|e| MigrationError::migration_file(format!("cannot serialize {}: {}", migration.name, e)))?;
        tokio::fs::write(dir.join(MIGRATION_FILE), content)
            .await
            .map_err(MigrationError::Io)?;

        debug!(migration = %migration.name, path = %dir.display(), "Wrote migration");
        Ok(dir)
    }

    /// Write an empty, hand-editable migration.
    pub async fn scaffold(&self, name: &str, phase: Phase) -> MigrateResult<Migration> {
        let mut migration = Migration::new(format!("{}_{}", generate_id(), slug(name)), phase);
        migration.scaffold = true;
        self.write_migration(&migration).await?;
        Ok(migration)
    }
}

/// Migration id for the current time.
pub fn generate_id() -> String {
    migration_id(Utc::now(), 0)
}

/// Migration id `offset` seconds after `base`.
///
/// Migrations generated together get consecutive ids so their names sort in
/// generation order.
pub fn migration_id(base: DateTime<Utc>, offset: i64) -> String {
    (base + Duration::seconds(offset))
        .format("%Y%m%d%H%M%S")
        .to_string()
}

/// Turn free text into a file-name friendly slug.
pub fn slug(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "migration".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse a migration directory name into (id, slug).
pub fn parse_migration_name(name: &str) -> MigrateResult<(String, String)> {
    let Some((id, slug)) = name.split_once('_') else {
        return Err(MigrationError::migration_file(format!(
            "Invalid migration name format: {}",
            name
        )));
    };

    if id.len() != 14 || !id.chars().all(|c| c.is_ascii_digit()) || slug.is_empty() {
        return Err(MigrationError::migration_file(format!(
            "Invalid migration ID (expected timestamp): {}",
            id
        )));
    }

    Ok((id.to_string(), slug.to_string()))
}
