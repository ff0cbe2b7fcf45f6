//! Configuration loading for `pgshift.toml`.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};

static ENV_VAR: LazyLock<Result<Regex, regex_lite::Error>> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}"));

/// How generated changesets are grouped into migrations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One migration per phase (non-transactional changesets get their own).
    #[default]
    Phase,
    /// One migration per changeset.
    Changeset,
}

/// Migration engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MigrationConfig {
    /// Directory holding the per-phase migration directories.
    pub migrations_dir: PathBuf,
    /// Prefix of the history and lock tables.
    pub history_prefix: String,
    /// Schema that holds the history and lock tables.
    pub history_schema: String,
    /// Connection URL (supports `${ENV_VAR}` interpolation).
    pub database_url: Option<String>,
    /// Prefix every generated statement with a descriptive comment.
    pub debug: bool,
    /// How long to wait for the migration lock, in seconds.
    pub lock_timeout_secs: u64,
    /// Lease after which a held lock is considered stale, in seconds.
    pub lock_lease_secs: Option<u64>,
    /// Migration grouping.
    pub granularity: Granularity,
    /// Plan and log without executing anything.
    pub dry_run: bool,
    /// Unmanaged objects to preserve, as `schema.name`.
    pub external: Vec<String>,
    /// Extensions never created or dropped.
    pub ignore_extensions: Vec<String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("./migrations"),
            history_prefix: "pgshift".to_string(),
            history_schema: "public".to_string(),
            database_url: None,
            debug: false,
            lock_timeout_secs: 30,
            lock_lease_secs: None,
            granularity: Granularity::Phase,
            dry_run: false,
            external: Vec::new(),
            ignore_extensions: vec!["plpgsql".to_string()],
        }
    }
}

impl MigrationConfig {
    /// Create a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file path.
    pub async fn from_file(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            MigrationError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> MigrateResult<Self> {
        let expanded = expand_env_vars(content)?;
        let config: Self = toml::from_str(&expanded)
            .map_err(|e| MigrationError::config(format!("invalid pgshift.toml: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> MigrateResult<()> {
        if self.history_prefix.is_empty() {
            return Err(MigrationError::config("history_prefix must not be empty"));
        }
        if self.lock_lease_secs == Some(0) {
            return Err(MigrationError::config("lock_lease_secs must be positive"));
        }
        for name in &self.external {
            if name.split_once('.').is_none() {
                return Err(MigrationError::config(format!(
                    "external object '{}' must be written as schema.name",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Set the migrations directory.
    pub fn migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    /// Set the history table prefix.
    pub fn history_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.history_prefix = prefix.into();
        self
    }

    /// Set the database URL.
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Enable statement comments.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the lock timeout.
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the lock lease.
    pub fn lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease_secs = Some(lease.as_secs().max(1));
        self
    }

    /// Set the migration granularity.
    pub fn granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    /// Enable dry-run mode.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Preserve an unmanaged object.
    pub fn external(mut self, name: impl Into<String>) -> Self {
        self.external.push(name.into());
        self
    }

    /// Lock timeout as a duration.
    pub fn lock_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    /// Lock lease as a duration.
    pub fn lock_lease_duration(&self) -> Option<Duration> {
        self.lock_lease_secs.map(Duration::from_secs)
    }
}

/// Expand environment variables in the format `${VAR_NAME}`.
fn expand_env_vars(content: &str) -> MigrateResult<String> {
    let re = ENV_VAR
        .as_ref()
        .map_err(|e| MigrationError::config(format!("environment pattern: {}", e)))?;

    let mut result = content.to_string();
    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        let full_match = &cap[0];

        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(full_match, &value);
        }
    }

    Ok(result)
}
