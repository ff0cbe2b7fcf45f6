//! Table and column rename resolution.
//!
//! A table that disappears while another appears might be a rename. Whether
//! it is cannot be inferred from structure, so a [`RenameResolver`] is asked
//! once per run. Confirmed renames end up in a [`RenameMap`] that is applied
//! to a copy of the current model before diffing, so the differ sees the
//! renamed objects as unchanged. Constraints, indexes and triggers naming a
//! renamed table or column are rebased along with it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use pgshift_schema::hash::{is_content_hash, split_trigger_value};
use pgshift_schema::naming::{identifiers, is_managed_trigger, object_name, rename_identifiers};
use pgshift_schema::{DatabaseInfo, EntryKind, ObjectKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MigrateResult, MigrationError};

/// A confirmed table rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRename {
    /// Schema.
    pub schema: String,
    /// Current name.
    pub from: String,
    /// Target name.
    pub to: String,
}

/// A confirmed column rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRename {
    /// Current name.
    pub from: String,
    /// Target name.
    pub to: String,
}

/// How a dependent object follows a rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectChange {
    /// A managed constraint or index gets a new name.
    Rename {
        /// Object kind.
        kind: ObjectKind,
        /// Current name.
        from: String,
        /// Target name.
        to: String,
    },
    /// A managed trigger keeps its name and gets a new hash.
    Rehash {
        /// Trigger name.
        name: String,
        /// Current hash.
        from: String,
        /// Target hash.
        to: String,
    },
}

/// A constraint, index or trigger carried along by a rename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRename {
    /// Schema of the owning table.
    pub schema: String,
    /// Owning table, by its target name.
    pub table: String,
    /// `(schema, table)` whose rename changeset carries the statements.
    pub host: (String, String),
    /// What changes.
    pub change: ObjectChange,
}

/// The current model with every rename applied.
#[derive(Debug, Clone, Default)]
pub struct RebasedModel {
    /// Renamed model.
    pub info: DatabaseInfo,
    /// Managed names and hashes that change with the renames.
    pub objects: Vec<ObjectRename>,
}

/// All confirmed renames of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameMap {
    /// Table renames.
    #[serde(default)]
    pub tables: Vec<TableRename>,
    /// Column renames, keyed by `schema.table` (target table name).
    #[serde(default)]
    pub columns: BTreeMap<String, Vec<ColumnRename>>,
}

impl RenameMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table rename.
    pub fn table(
        mut self,
        schema: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.tables.push(TableRename {
            schema: schema.into(),
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Add a column rename on a table (by its target name).
    pub fn column(
        mut self,
        schema: &str,
        table: &str,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.columns
            .entry(table_key(schema, table))
            .or_default()
            .push(ColumnRename {
                from: from.into(),
                to: to.into(),
            });
        self
    }

    /// Whether nothing was renamed.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.columns.values().all(Vec::is_empty)
    }

    /// Current name of a table, given its target name.
    pub fn current_table_name<'a>(&'a self, schema: &str, table: &'a str) -> &'a str {
        self.tables
            .iter()
            .find(|r| r.schema == schema && r.to == table)
            .map(|r| r.from.as_str())
            .unwrap_or(table)
    }

    /// Column renames on a table (by its target name).
    pub fn column_renames(&self, schema: &str, table: &str) -> &[ColumnRename] {
        self.columns
            .get(&table_key(schema, table))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Apply every rename to a copy of `remote`.
    pub fn apply(&self, remote: &DatabaseInfo) -> DatabaseInfo {
        let mut renamed = remote.clone();
        for rename in &self.tables {
            if let Some(schema) = renamed.schemas.get_mut(&rename.schema) {
                schema.rename_table(&rename.from, &rename.to);
            }
        }
        for (key, renames) in &self.columns {
            let Some((schema, table)) = key.split_once('.') else {
                continue;
            };
            if let Some(schema) = renamed.schemas.get_mut(schema) {
                for rename in renames {
                    schema.rename_column(table, &rename.from, &rename.to);
                }
            }
        }
        renamed
    }

    /// Apply every rename to a copy of `remote` and rebase dependent entries.
    ///
    /// Definitions naming a renamed table or column are rewritten. A
    /// rewritten constraint or index that matches an entry of `local` takes
    /// over that entry's key, so the differ sees it as unchanged; its
    /// managed name change is reported in [`RebasedModel::objects`]. A
    /// rewritten trigger matching its target takes over the target hash.
    pub fn rebase(&self, remote: &DatabaseInfo, local: &DatabaseInfo) -> RebasedModel {
        let mut info = self.apply(remote);
        let mut objects = Vec::new();
        if self.is_empty() {
            return RebasedModel { info, objects };
        }

        let schemas: Vec<String> = info.schemas.keys().chain(local.schemas.keys()).cloned().collect();
        let empty = BTreeMap::new();

        for (name, schema) in info.schemas.iter_mut() {
            let target = local.schema(name);
            for kind in EntryKind::ALL {
                for (table, items) in schema.entries_mut(kind).iter_mut() {
                    let wanted = target
                        .and_then(|t| t.entries(kind).get(table))
                        .unwrap_or(&empty);
                    let original: BTreeSet<String> = items.keys().cloned().collect();
                    let mut claimed = BTreeSet::new();
                    let mut rebased = BTreeMap::new();

                    for (key, value) in std::mem::take(items) {
                        let entry = EntryRef {
                            schema: name,
                            table,
                            kind,
                            key: &key,
                        };
                        let outcome = match kind {
                            EntryKind::Trigger => self.rebase_trigger(&entry, &value, wanted, &schemas),
                            _ => self.rebase_object(&entry, &value, wanted, &original, &mut claimed, &schemas),
                        };
                        let (key, value) = match outcome {
                            Some((new_key, new_value, change)) => {
                                if let Some((change, reference)) = change {
                                    if let Some(host) = self.host(name, table, reference) {
                                        debug!(schema = %name, table = %table, change = ?change, "Rebased object");
                                        objects.push(ObjectRename {
                                            schema: name.clone(),
                                            table: table.clone(),
                                            host,
                                            change,
                                        });
                                    }
                                }
                                (new_key, new_value)
                            }
                            None => (key, value),
                        };
                        rebased.insert(key, value);
                    }
                    *items = rebased;
                }
            }
        }

        RebasedModel { info, objects }
    }

    /// Rebase a managed constraint or index.
    fn rebase_object(
        &self,
        entry: &EntryRef<'_>,
        definition: &str,
        wanted: &BTreeMap<String, String>,
        original: &BTreeSet<String>,
        claimed: &mut BTreeSet<String>,
        schemas: &[String],
    ) -> Option<Rebased> {
        let object = entry.kind.object_kind()?;
        if !is_content_hash(entry.key) {
            return None;
        }
        let current_table = self.current_table_name(entry.schema, entry.table);
        let (rewritten, reference) = self.rewrite_definition(entry, current_table, definition);
        let old_name = object_name(current_table, entry.key, object);

        let mut key = entry.key.to_string();
        let mut value = rewritten;
        if value != definition {
            let print = fingerprint(&value, &old_name, schemas);
            let matched = wanted.iter().find(|(k, v)| {
                !original.contains(*k)
                    && !claimed.contains(*k)
                    && fingerprint(v, &object_name(entry.table, k, object), schemas) == print
            });
            if let Some((k, v)) = matched {
                claimed.insert(k.clone());
                key = k.clone();
                value = v.clone();
            }
        }

        let new_name = object_name(entry.table, &key, object);
        let change = (old_name != new_name).then(|| {
            (
                ObjectChange::Rename {
                    kind: object,
                    from: old_name,
                    to: new_name,
                },
                reference,
            )
        });
        Some((key, value, change))
    }

    /// Rebase a managed trigger.
    fn rebase_trigger(
        &self,
        entry: &EntryRef<'_>,
        value: &str,
        wanted: &BTreeMap<String, String>,
        schemas: &[String],
    ) -> Option<Rebased> {
        if !is_managed_trigger(entry.key) {
            return None;
        }
        let (hash, sql) = split_trigger_value(value)?;
        let current_table = self.current_table_name(entry.schema, entry.table);

        let body = sql.find(" EXECUTE ").unwrap_or(sql.len());
        let (head, tail) = sql.split_at(body);
        let head = rename_identifiers(head, |name| {
            if name == current_table && current_table != entry.table {
                Some(entry.table.to_string())
            } else {
                self.renamed_column(entry.schema, entry.table, name)
            }
        });
        let rewritten = format!("{}{}", head, tail);
        if rewritten == sql {
            return None;
        }

        let target = wanted.get(entry.key).and_then(|v| split_trigger_value(v));
        match target {
            Some((to, target_sql))
                if to != hash && fingerprint(target_sql, "", schemas) == fingerprint(&rewritten, "", schemas) =>
            {
                let change = ObjectChange::Rehash {
                    name: entry.key.to_string(),
                    from: hash.to_string(),
                    to: to.to_string(),
                };
                Some((entry.key.to_string(), format!("{}:{}", to, target_sql), Some((change, None))))
            }
            _ => Some((entry.key.to_string(), format!("{}:{}", hash, rewritten), None)),
        }
    }

    /// Rewrite a constraint or index definition with the new names.
    ///
    /// Foreign keys also return the referenced table, by its target name.
    fn rewrite_definition(
        &self,
        entry: &EntryRef<'_>,
        current_table: &str,
        definition: &str,
    ) -> (String, Option<(String, String)>) {
        let columns = |name: &str| self.renamed_column(entry.schema, entry.table, name);

        match entry.kind {
            EntryKind::Index => {
                let (head, tail) = definition.split_at(definition.find('(').unwrap_or(definition.len()));
                let head = rename_identifiers(head, |name| {
                    (name == current_table && current_table != entry.table).then(|| entry.table.to_string())
                });
                (format!("{}{}", head, rename_identifiers(tail, columns)), None)
            }
            EntryKind::ForeignKey => {
                let Some(at) = definition.find(" REFERENCES ") else {
                    return (rename_identifiers(definition, columns), None);
                };
                let (own, reference) = definition.split_at(at);
                let (target, rest) = reference.split_at(reference.find('(').unwrap_or(reference.len()));
                let (referenced, actions) = rest.split_at(rest.find(')').map_or(rest.len(), |i| i + 1));

                let names = identifiers(target);
                let Some(current) = names.last().cloned() else {
                    return (rename_identifiers(definition, columns), None);
                };
                let ref_schema = match names.len() {
                    n if n >= 3 => names[n - 2].clone(),
                    _ => entry.schema.to_string(),
                };
                let ref_table = self.target_table_name(&ref_schema, &current).to_string();

                let rewritten = format!(
                    "{}{}{}{}",
                    rename_identifiers(own, columns),
                    rename_identifiers(target, |name| {
                        (name == current && ref_table != current).then(|| ref_table.clone())
                    }),
                    rename_identifiers(referenced, |name| self.renamed_column(&ref_schema, &ref_table, name)),
                    actions
                );
                (rewritten, Some((ref_schema, ref_table)))
            }
            _ => (rename_identifiers(definition, columns), None),
        }
    }

    /// Table whose rename changeset carries the change of an object on
    /// `table`, preferring the owning table.
    fn host(&self, schema: &str, table: &str, reference: Option<(String, String)>) -> Option<(String, String)> {
        let touched = |schema: &str, table: &str| {
            self.tables.iter().any(|r| r.schema == schema && r.to == table)
                || !self.column_renames(schema, table).is_empty()
        };
        if touched(schema, table) {
            return Some((schema.to_string(), table.to_string()));
        }
        reference.filter(|(s, t)| touched(s, t))
    }

    /// Target name of a table, given its current name.
    fn target_table_name<'a>(&'a self, schema: &str, table: &'a str) -> &'a str {
        self.tables
            .iter()
            .find(|r| r.schema == schema && r.from == table)
            .map(|r| r.to.as_str())
            .unwrap_or(table)
    }

    fn renamed_column(&self, schema: &str, table: &str, column: &str) -> Option<String> {
        self.column_renames(schema, table)
            .iter()
            .find(|r| r.from == column)
            .map(|r| r.to.clone())
    }

    /// Load a rename file; a missing file is an empty map.
    pub async fn load(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MigrationError::config(format!("Failed to read rename file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| MigrationError::config(format!("Failed to parse rename file: {}", e)))
    }

    /// Save the map as a rename file.
    pub async fn save(&self, path: impl AsRef<Path>) -> MigrateResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| MigrationError::config(format!("Failed to serialize renames: {}", e)))?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

fn table_key(schema: &str, table: &str) -> String {
    format!("{}.{}", schema, table)
}

/// An entry being rebased; `table` is the target table name.
struct EntryRef<'a> {
    schema: &'a str,
    table: &'a str,
    kind: EntryKind,
    key: &'a str,
}

/// New key, new value and the change to report, if any.
type Rebased = (String, String, Option<(ObjectChange, Option<(String, String)>)>);

/// Formatting-insensitive form of a definition.
///
/// Catalog output and compiled definitions differ in quoting, spacing,
/// schema qualification and default referential actions.
fn fingerprint(definition: &str, own_name: &str, schemas: &[String]) -> String {
    let mut print = if own_name.is_empty() {
        definition.to_string()
    } else {
        definition.replace(own_name, "")
    };
    print = print.replace('"', "").to_lowercase();
    print.retain(|c| !c.is_whitespace());
    for schema in schemas {
        print = print.replace(&format!("{}.", schema.to_lowercase()), "");
    }
    for noise in ["ondeletenoaction", "onupdatenoaction"] {
        print = print.replace(noise, "");
    }
    print
}

/// Decides whether disappearing objects were renamed into appearing ones.
pub trait RenameResolver: Send + Sync {
    /// Pick `(from, to)` table pairs among the candidates of one schema.
    fn resolve_tables(
        &self,
        schema: &str,
        added: &[String],
        removed: &[String],
    ) -> MigrateResult<Vec<(String, String)>>;

    /// Pick `(from, to)` column pairs among the candidates of one table.
    fn resolve_columns(
        &self,
        schema: &str,
        table: &str,
        added: &[String],
        removed: &[String],
    ) -> MigrateResult<Vec<(String, String)>>;
}

/// Treats every candidate as a drop plus a create.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRenames;

impl RenameResolver for NoRenames {
    fn resolve_tables(&self, _: &str, _: &[String], _: &[String]) -> MigrateResult<Vec<(String, String)>> {
        Ok(Vec::new())
    }

    fn resolve_columns(
        &self,
        _: &str,
        _: &str,
        _: &[String],
        _: &[String],
    ) -> MigrateResult<Vec<(String, String)>> {
        Ok(Vec::new())
    }
}

/// Answers from a previously recorded [`RenameMap`].
#[derive(Debug, Clone, Default)]
pub struct RecordedRenames {
    map: RenameMap,
}

impl RecordedRenames {
    /// Wrap a recorded map.
    pub fn new(map: RenameMap) -> Self {
        Self { map }
    }
}

impl RenameResolver for RecordedRenames {
    fn resolve_tables(
        &self,
        schema: &str,
        added: &[String],
        removed: &[String],
    ) -> MigrateResult<Vec<(String, String)>> {
        Ok(self
            .map
            .tables
            .iter()
            .filter(|r| r.schema == schema && removed.contains(&r.from) && added.contains(&r.to))
            .map(|r| (r.from.clone(), r.to.clone()))
            .collect())
    }

    fn resolve_columns(
        &self,
        schema: &str,
        table: &str,
        added: &[String],
        removed: &[String],
    ) -> MigrateResult<Vec<(String, String)>> {
        Ok(self
            .map
            .column_renames(schema, table)
            .iter()
            .filter(|r| removed.contains(&r.from) && added.contains(&r.to))
            .map(|r| (r.from.clone(), r.to.clone()))
            .collect())
    }
}

/// Build the rename map for one run.
///
/// Column `rename_from` hints in the target model are honoured before the
/// resolver is consulted.
pub fn resolve_renames(
    local: &DatabaseInfo,
    remote: &DatabaseInfo,
    resolver: &dyn RenameResolver,
) -> MigrateResult<RenameMap> {
    let mut map = RenameMap::new();

    for (name, schema) in &local.schemas {
        let Some(current) = remote.schemas.get(name) else {
            continue;
        };
        let added = difference(schema.tables.keys(), current.tables.keys());
        let removed = difference(current.tables.keys(), schema.tables.keys());
        if added.is_empty() || removed.is_empty() {
            continue;
        }
        let pairs = resolver.resolve_tables(name, &added, &removed)?;
        for (from, to) in validate_pairs("table", name, pairs, &added, &removed)? {
            map.tables.push(TableRename {
                schema: name.clone(),
                from,
                to,
            });
        }
    }

    let renamed = map.apply(remote);

    for (name, schema) in &local.schemas {
        let Some(current) = renamed.schemas.get(name) else {
            continue;
        };
        for (table, info) in &schema.tables {
            let Some(current_table) = current.tables.get(table) else {
                continue;
            };
            let mut added = difference(info.columns.keys(), current_table.columns.keys());
            let mut removed = difference(current_table.columns.keys(), info.columns.keys());
            if added.is_empty() || removed.is_empty() {
                continue;
            }

            let mut pairs = Vec::new();
            for column in added.clone() {
                let hint = info.columns.get(&column).and_then(|c| c.rename_from.clone());
                if let Some(from) = hint.filter(|from| removed.contains(from)) {
                    removed.retain(|r| r != &from);
                    added.retain(|a| a != &column);
                    pairs.push((from, column));
                }
            }
            if !added.is_empty() && !removed.is_empty() {
                let resolved = resolver.resolve_columns(name, table, &added, &removed)?;
                pairs.extend(validate_pairs("column", name, resolved, &added, &removed)?);
            }

            for (from, to) in pairs {
                debug!(schema = %name, table = %table, from = %from, to = %to, "Column rename");
                map.columns
                    .entry(table_key(name, table))
                    .or_default()
                    .push(ColumnRename { from, to });
            }
        }
    }

    Ok(map)
}

fn difference<'a>(
    left: impl Iterator<Item = &'a String>,
    right: impl Iterator<Item = &'a String>,
) -> Vec<String> {
    let right: BTreeSet<&String> = right.collect();
    left.filter(|k| !right.contains(k)).cloned().collect()
}

fn validate_pairs(
    what: &str,
    schema: &str,
    pairs: Vec<(String, String)>,
    added: &[String],
    removed: &[String],
) -> MigrateResult<Vec<(String, String)>> {
    let mut seen_from = BTreeSet::new();
    let mut seen_to = BTreeSet::new();
    for (from, to) in &pairs {
        if !removed.contains(from) || !added.contains(to) {
            return Err(MigrationError::config(format!(
                "{} rename {}.{} -> {} does not match the schema difference",
                what, schema, from, to
            )));
        }
        if !seen_from.insert(from.clone()) || !seen_to.insert(to.clone()) {
            return Err(MigrationError::config(format!(
                "{} {}.{} is renamed more than once",
                what, schema, from
            )));
        }
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgshift_schema::{
        ColumnInfo, ForeignKeyDef, SchemaInfo, TableInfo, TriggerDef, TriggerEvent, TriggerTiming,
    };
    use pretty_assertions::assert_eq;

    fn model(table: &str, column: &str) -> DatabaseInfo {
        DatabaseInfo::new().with_schema(
            SchemaInfo::new("app")
                .with_table(
                    table,
                    TableInfo::new()
                        .with_column("id", ColumnInfo::new("integer"))
                        .with_column(column, ColumnInfo::new("text")),
                )
                .with_entry(EntryKind::PrimaryKey, table, "0a1b2c3d", "PRIMARY KEY (\"id\")"),
        )
    }

    #[test]
    fn test_no_renames() {
        let local = model("people", "name");
        let remote = model("users", "name");
        let map = resolve_renames(&local, &remote, &NoRenames).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_recorded_table_and_column_rename() {
        let local = model("people", "full_name");
        let remote = model("users", "name");
        let recorded = RenameMap::new()
            .table("app", "users", "people")
            .column("app", "people", "name", "full_name");

        let map = resolve_renames(&local, &remote, &RecordedRenames::new(recorded.clone())).unwrap();
        assert_eq!(map, recorded);

        let renamed = map.apply(&remote);
        assert_eq!(renamed, local);
    }

    #[test]
    fn test_rename_from_hint() {
        let mut local = model("users", "full_name");
        local
            .schema_mut("app")
            .tables
            .get_mut("users")
            .unwrap()
            .columns
            .get_mut("full_name")
            .unwrap()
            .rename_from = Some("name".to_string());
        let remote = model("users", "name");

        let map = resolve_renames(&local, &remote, &NoRenames).unwrap();
        assert_eq!(map.column_renames("app", "users")[0].from, "name");
        assert_eq!(map.column_renames("app", "users")[0].to, "full_name");
    }

    #[test]
    fn test_rebase_foreign_key_to_renamed_table() {
        let fk = ForeignKeyDef::new(["book_id"], "novels", ["id"]);
        let old_key = ForeignKeyDef::new(["book_id"], "books", ["id"]).hash("app");
        let local = DatabaseInfo::new().with_schema(
            SchemaInfo::new("app")
                .with_table("novels", TableInfo::new())
                .with_table("users", TableInfo::new())
                .with_entry(EntryKind::ForeignKey, "users", fk.hash("app"), fk.definition("app")),
        );
        let remote = DatabaseInfo::new().with_schema(
            SchemaInfo::new("app")
                .with_table("books", TableInfo::new())
                .with_table("users", TableInfo::new())
                .with_entry(
                    EntryKind::ForeignKey,
                    "users",
                    old_key.clone(),
                    "FOREIGN KEY (book_id) REFERENCES books(id)",
                ),
        );

        let rebased = RenameMap::new().table("app", "books", "novels").rebase(&remote, &local);
        assert_eq!(rebased.info, local);
        assert_eq!(
            rebased.objects,
            vec![ObjectRename {
                schema: "app".to_string(),
                table: "users".to_string(),
                host: ("app".to_string(), "novels".to_string()),
                change: ObjectChange::Rename {
                    kind: ObjectKind::ForeignKey,
                    from: object_name("users", &old_key, ObjectKind::ForeignKey),
                    to: object_name("users", &fk.hash("app"), ObjectKind::ForeignKey),
                },
            }]
        );
    }

    #[test]
    fn test_rebase_trigger_takes_target_hash() {
        let trigger = TriggerDef::new("touch", TriggerTiming::Before, [TriggerEvent::Update], "touch()");
        let (name, old_value) = trigger.compile("app", "people");
        let (_, new_value) = trigger.compile("app", "users");
        let local = DatabaseInfo::new().with_schema(
            SchemaInfo::new("app")
                .with_table("users", TableInfo::new())
                .with_entry(EntryKind::Trigger, "users", name.clone(), new_value.clone()),
        );
        let remote = DatabaseInfo::new().with_schema(
            SchemaInfo::new("app")
                .with_table("people", TableInfo::new())
                .with_entry(EntryKind::Trigger, "people", name.clone(), old_value.clone()),
        );

        let rebased = RenameMap::new().table("app", "people", "users").rebase(&remote, &local);
        assert_eq!(rebased.info, local);
        let hash = |value: &str| value.split_once(':').unwrap().0.to_string();
        assert_eq!(
            rebased.objects[0].change,
            ObjectChange::Rehash {
                name,
                from: hash(&old_value),
                to: hash(&new_value),
            }
        );
    }

    #[test]
    fn test_rebase_keeps_unmatched_definition_rewritten() {
        let remote = DatabaseInfo::new().with_schema(
            SchemaInfo::new("app")
                .with_table("users", TableInfo::new().with_column("name", ColumnInfo::new("text")))
                .with_entry(EntryKind::Check, "users", "0c0c0c0c", "CHECK ((length(name) > 0))"),
        );
        let local = model("users", "full_name");

        let rebased = RenameMap::new()
            .column("app", "users", "name", "full_name")
            .rebase(&remote, &local);
        let app = rebased.info.schema("app").unwrap();
        assert_eq!(
            app.entry(EntryKind::Check, "users", "0c0c0c0c"),
            Some("CHECK ((length(\"full_name\") > 0))")
        );
        assert!(rebased.objects.is_empty());
    }

    struct Bogus;

    impl RenameResolver for Bogus {
        fn resolve_tables(&self, _: &str, _: &[String], _: &[String]) -> MigrateResult<Vec<(String, String)>> {
            Ok(vec![("missing".to_string(), "people".to_string())])
        }

        fn resolve_columns(
            &self,
            _: &str,
            _: &str,
            _: &[String],
            _: &[String],
        ) -> MigrateResult<Vec<(String, String)>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_invalid_resolution_is_refused() {
        let local = model("people", "name");
        let remote = model("users", "name");
        assert!(matches!(
            resolve_renames(&local, &remote, &Bogus),
            Err(MigrationError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("renames.toml");

        assert!(RenameMap::load(&path).await.unwrap().is_empty());

        let map = RenameMap::new()
            .table("app", "users", "people")
            .column("app", "people", "name", "full_name");
        map.save(&path).await.unwrap();
        assert_eq!(RenameMap::load(&path).await.unwrap(), map);
    }
}
