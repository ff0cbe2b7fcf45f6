//! The schema information model.
//!
//! One [`DatabaseInfo`] describes a whole database: which extensions are
//! installed and, per schema, its tables, columns, hash-keyed constraints,
//! indexes, triggers and enums. The same shape is produced by the declarative
//! builder and by catalog introspection, which is what makes the two sides
//! comparable.
//!
//! ```text
//! DatabaseInfo
//! ├── extensions            {"pgcrypto"}
//! └── schemas
//!     └── "app" ─ SchemaInfo
//!         ├── tables        table -> columns (declaration order)
//!         ├── primary_keys  table -> hash -> "PRIMARY KEY (...)"
//!         ├── unique_constraints / foreign_keys / check_constraints
//!         ├── indexes       table -> hash -> "CREATE INDEX ..."
//!         ├── triggers      table -> name -> "hash:CREATE TRIGGER ..."
//!         └── enums         name  -> "a,b,c"
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, SchemaResult};
use crate::naming::ObjectKind;

/// Per-table map of entry key to compiled definition.
pub type TableEntries = BTreeMap<String, BTreeMap<String, String>>;

/// The structure of one database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    /// Installed extensions.
    #[serde(default)]
    pub extensions: BTreeSet<String>,
    /// Schemas by name.
    #[serde(default)]
    pub schemas: BTreeMap<String, SchemaInfo>,
}

impl DatabaseInfo {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a schema.
    pub fn schema(&self, name: &str) -> Option<&SchemaInfo> {
        self.schemas.get(name)
    }

    /// Look up a schema mutably, creating it when missing.
    pub fn schema_mut(&mut self, name: &str) -> &mut SchemaInfo {
        self.schemas
            .entry(name.to_string())
            .or_insert_with(|| SchemaInfo::new(name))
    }

    /// Look up a table.
    pub fn table(&self, schema: &str, table: &str) -> Option<&TableInfo> {
        self.schema(schema).and_then(|s| s.tables.get(table))
    }

    /// Look up a column.
    pub fn column(&self, schema: &str, table: &str, column: &str) -> Option<&ColumnInfo> {
        self.table(schema, table).and_then(|t| t.columns.get(column))
    }

    /// Whether nothing is declared at all.
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty() && self.schemas.is_empty()
    }

    /// Add an extension.
    pub fn with_extension(mut self, name: impl Into<String>) -> Self {
        self.extensions.insert(name.into());
        self
    }

    /// Add a schema.
    pub fn with_schema(mut self, schema: SchemaInfo) -> Self {
        self.schemas.insert(schema.name.clone(), schema);
        self
    }

    /// Serialize to the JSON structure dump format.
    pub fn to_json(&self) -> SchemaResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SchemaError::StructureError { source: e })
    }

    /// Parse a JSON structure dump.
    pub fn from_json(content: &str) -> SchemaResult<Self> {
        serde_json::from_str(content).map_err(|e| SchemaError::StructureError { source: e })
    }

    /// Load a structure dump from disk.
    pub fn load(path: impl AsRef<Path>) -> SchemaResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SchemaError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json(&content)
    }

    /// Write a structure dump to disk.
    pub fn save(&self, path: impl AsRef<Path>) -> SchemaResult<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?).map_err(|e| SchemaError::IoError {
            path: path.display().to_string(),
            source: e,
        })
    }
}

/// The structure of one schema (namespace).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaInfo {
    /// Schema name.
    pub name: String,
    /// Tables by name.
    #[serde(default)]
    pub tables: BTreeMap<String, TableInfo>,
    /// Primary keys: table -> hash -> definition.
    #[serde(default)]
    pub primary_keys: TableEntries,
    /// Unique constraints: table -> hash -> definition.
    #[serde(default)]
    pub unique_constraints: TableEntries,
    /// Foreign keys: table -> hash -> definition.
    #[serde(default)]
    pub foreign_keys: TableEntries,
    /// Check constraints: table -> hash -> definition.
    #[serde(default)]
    pub check_constraints: TableEntries,
    /// Indexes: table -> hash -> `CREATE INDEX` statement.
    #[serde(default)]
    pub indexes: TableEntries,
    /// Triggers: table -> trigger name -> `hash:CREATE TRIGGER` statement.
    #[serde(default)]
    pub triggers: TableEntries,
    /// Enum types: name -> comma-joined ordered values.
    #[serde(default)]
    pub enums: BTreeMap<String, String>,
}

impl SchemaInfo {
    /// Create an empty schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a table.
    pub fn with_table(mut self, name: impl Into<String>, table: TableInfo) -> Self {
        self.tables.insert(name.into(), table);
        self
    }

    /// Add an entry to one of the hash-keyed maps.
    pub fn with_entry(
        mut self,
        kind: EntryKind,
        table: impl Into<String>,
        key: impl Into<String>,
        definition: impl Into<String>,
    ) -> Self {
        self.entries_mut(kind)
            .entry(table.into())
            .or_default()
            .insert(key.into(), definition.into());
        self
    }

    /// Add an enum type.
    pub fn with_enum<S: AsRef<str>>(mut self, name: impl Into<String>, values: &[S]) -> Self {
        self.enums.insert(name.into(), join_enum_values(values));
        self
    }

    /// The entry map for a kind.
    pub fn entries(&self, kind: EntryKind) -> &TableEntries {
        match kind {
            EntryKind::PrimaryKey => &self.primary_keys,
            EntryKind::Unique => &self.unique_constraints,
            EntryKind::ForeignKey => &self.foreign_keys,
            EntryKind::Check => &self.check_constraints,
            EntryKind::Index => &self.indexes,
            EntryKind::Trigger => &self.triggers,
        }
    }

    /// The entry map for a kind, mutably.
    pub fn entries_mut(&mut self, kind: EntryKind) -> &mut TableEntries {
        match kind {
            EntryKind::PrimaryKey => &mut self.primary_keys,
            EntryKind::Unique => &mut self.unique_constraints,
            EntryKind::ForeignKey => &mut self.foreign_keys,
            EntryKind::Check => &mut self.check_constraints,
            EntryKind::Index => &mut self.indexes,
            EntryKind::Trigger => &mut self.triggers,
        }
    }

    /// Look up one entry.
    pub fn entry(&self, kind: EntryKind, table: &str, key: &str) -> Option<&str> {
        self.entries(kind)
            .get(table)
            .and_then(|entries| entries.get(key))
            .map(String::as_str)
    }

    /// Entries of a kind on a table, in key order.
    pub fn table_entries(&self, kind: EntryKind, table: &str) -> Vec<(&str, &str)> {
        self.entries(kind)
            .get(table)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Enum values in order.
    pub fn enum_values(&self, name: &str) -> Option<Vec<String>> {
        self.enums.get(name).map(|v| split_enum_values(v))
    }

    /// Move a table and everything keyed by it to a new name.
    pub fn rename_table(&mut self, from: &str, to: &str) {
        if let Some(table) = self.tables.remove(from) {
            self.tables.insert(to.to_string(), table);
        }
        for kind in EntryKind::ALL {
            let entries = self.entries_mut(kind);
            if let Some(items) = entries.remove(from) {
                entries.insert(to.to_string(), items);
            }
        }
    }

    /// Rename a column in place, keeping its position.
    pub fn rename_column(&mut self, table: &str, from: &str, to: &str) {
        if let Some(info) = self.tables.get_mut(table) {
            info.columns = info
                .columns
                .drain(..)
                .map(|(name, column)| {
                    if name == from {
                        (to.to_string(), column)
                    } else {
                        (name, column)
                    }
                })
                .collect();
        }
    }
}

/// Kinds of per-table keyed entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Primary key constraint.
    PrimaryKey,
    /// Unique constraint.
    Unique,
    /// Foreign key constraint.
    ForeignKey,
    /// Check constraint.
    Check,
    /// Index.
    Index,
    /// Trigger.
    Trigger,
}

impl EntryKind {
    /// Every kind.
    pub const ALL: [EntryKind; 6] = [
        Self::PrimaryKey,
        Self::Unique,
        Self::ForeignKey,
        Self::Check,
        Self::Index,
        Self::Trigger,
    ];

    /// Key used for this kind in the diff tree.
    pub fn tree_key(&self) -> &'static str {
        match self {
            Self::PrimaryKey => "primaryKey",
            Self::Unique => "unique",
            Self::ForeignKey => "foreignKey",
            Self::Check => "check",
            Self::Index => "index",
            Self::Trigger => "trigger",
        }
    }

    /// Parse a diff tree key.
    pub fn from_tree_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tree_key() == key)
    }

    /// Object kind used for managed naming, if the kind is hash-named.
    pub fn object_kind(&self) -> Option<ObjectKind> {
        match self {
            Self::PrimaryKey => Some(ObjectKind::PrimaryKey),
            Self::Unique => Some(ObjectKind::Unique),
            Self::ForeignKey => Some(ObjectKind::ForeignKey),
            Self::Check => Some(ObjectKind::Check),
            Self::Index => Some(ObjectKind::Index),
            Self::Trigger => None,
        }
    }
}

/// A table: its columns in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Columns by name, in declaration order.
    #[serde(default)]
    pub columns: IndexMap<String, ColumnInfo>,
}

impl TableInfo {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column.
    pub fn with_column(mut self, name: impl Into<String>, column: ColumnInfo) -> Self {
        self.columns.insert(name.into(), column);
        self
    }
}

/// Identity generation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identity {
    /// `GENERATED ALWAYS AS IDENTITY`.
    #[serde(rename = "ALWAYS")]
    Always,
    /// `GENERATED BY DEFAULT AS IDENTITY`.
    #[serde(rename = "BY DEFAULT")]
    ByDefault,
}

impl Identity {
    /// SQL keyword form.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Always => "ALWAYS",
            Self::ByDefault => "BY DEFAULT",
        }
    }

    /// Parse the catalog spelling.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ALWAYS" | "A" => Some(Self::Always),
            "BY DEFAULT" | "D" => Some(Self::ByDefault),
            _ => None,
        }
    }
}

/// A column default, compared by hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultValue {
    /// Content hash of the declared expression.
    pub hash: String,
    /// SQL expression.
    pub sql: String,
}

impl DefaultValue {
    /// Build a default from its SQL expression.
    pub fn new(sql: impl Into<String>) -> Self {
        let sql = sql.into();
        Self {
            hash: crate::hash::default_hash(&sql),
            sql,
        }
    }
}

/// A column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Canonical type name, or the enum name for enum columns.
    pub data_type: String,
    /// Whether NULL is allowed.
    pub is_nullable: bool,
    /// Default expression.
    #[serde(default)]
    pub default_value: Option<DefaultValue>,
    /// Identity generation.
    #[serde(default)]
    pub identity: Option<Identity>,
    /// Numeric precision.
    #[serde(default)]
    pub numeric_precision: Option<u32>,
    /// Numeric scale.
    #[serde(default)]
    pub numeric_scale: Option<u32>,
    /// Maximum character length.
    #[serde(default)]
    pub character_maximum_length: Option<u32>,
    /// Fractional seconds precision.
    #[serde(default)]
    pub datetime_precision: Option<u32>,
    /// Whether the type is an enum declared in the same schema.
    #[serde(default)]
    pub is_enum: bool,
    /// Previous name, when the column was renamed in the definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename_from: Option<String>,
}

impl ColumnInfo {
    /// Create a nullable column of the given canonical type.
    pub fn new(data_type: impl Into<String>) -> Self {
        let data_type = data_type.into();
        let parsed = crate::types::DataType::parse(&data_type);
        Self {
            numeric_precision: match parsed.base.as_str() {
                "numeric" => parsed.precision(),
                _ => None,
            },
            numeric_scale: parsed.scale(),
            character_maximum_length: parsed.length(),
            datetime_precision: if parsed.is_temporal() {
                parsed.precision()
            } else {
                None
            },
            data_type,
            is_nullable: true,
            default_value: None,
            identity: None,
            is_enum: false,
            rename_from: None,
        }
    }

    /// Create a column typed by an enum.
    pub fn enumeration(name: impl Into<String>) -> Self {
        Self {
            data_type: name.into(),
            is_nullable: true,
            default_value: None,
            identity: None,
            numeric_precision: None,
            numeric_scale: None,
            character_maximum_length: None,
            datetime_precision: None,
            is_enum: true,
            rename_from: None,
        }
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    /// Set the default expression.
    pub fn default_sql(mut self, sql: impl Into<String>) -> Self {
        self.default_value = Some(DefaultValue::new(sql));
        self
    }

    /// Set identity generation.
    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }
}

/// Join enum values into their stored form.
pub fn join_enum_values<S: AsRef<str>>(values: &[S]) -> String {
    values
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",")
}

/// Split stored enum values.
pub fn split_enum_values(joined: &str) -> Vec<String> {
    if joined.is_empty() {
        return Vec::new();
    }
    joined.split(',').map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> DatabaseInfo {
        DatabaseInfo::new().with_schema(
            SchemaInfo::new("app")
                .with_table(
                    "users",
                    TableInfo::new()
                        .with_column("id", ColumnInfo::new("integer").not_null())
                        .with_column("email", ColumnInfo::new("character varying(255)")),
                )
                .with_entry(EntryKind::PrimaryKey, "users", "0a1b2c3d", "PRIMARY KEY (\"id\")")
                .with_enum("mood", &["happy", "sad"]),
        )
    }

    #[test]
    fn test_lookup() {
        let db = sample();
        assert!(db.table("app", "users").is_some());
        assert_eq!(
            db.column("app", "users", "email").map(|c| c.character_maximum_length),
            Some(Some(255))
        );
        let schema = db.schema("app").unwrap();
        assert_eq!(
            schema.entry(EntryKind::PrimaryKey, "users", "0a1b2c3d"),
            Some("PRIMARY KEY (\"id\")")
        );
        assert_eq!(
            schema.enum_values("mood"),
            Some(vec!["happy".to_string(), "sad".to_string()])
        );
    }

    #[test]
    fn test_rename_table_moves_entries() {
        let mut db = sample();
        let schema = db.schema_mut("app");
        schema.rename_table("users", "accounts");

        assert!(schema.tables.contains_key("accounts"));
        assert!(!schema.tables.contains_key("users"));
        assert_eq!(schema.table_entries(EntryKind::PrimaryKey, "accounts").len(), 1);
    }

    #[test]
    fn test_rename_column_keeps_position() {
        let mut db = sample();
        db.schema_mut("app").rename_column("users", "id", "user_id");

        let names: Vec<_> = db.table("app", "users").unwrap().columns.keys().cloned().collect();
        assert_eq!(names, vec!["user_id".to_string(), "email".to_string()]);
    }

    #[test]
    fn test_json_roundtrip() {
        let db = sample();
        let json = db.to_json().unwrap();
        assert_eq!(DatabaseInfo::from_json(&json).unwrap(), db);
    }

    #[test]
    fn test_entry_kind_tree_keys() {
        for kind in EntryKind::ALL {
            assert_eq!(EntryKind::from_tree_key(kind.tree_key()), Some(kind));
        }
        assert_eq!(EntryKind::from_tree_key("columns"), None);
    }

    #[test]
    fn test_identity_parse() {
        assert_eq!(Identity::parse("ALWAYS"), Some(Identity::Always));
        assert_eq!(Identity::parse("by default"), Some(Identity::ByDefault));
        assert_eq!(Identity::parse("d"), Some(Identity::ByDefault));
        assert_eq!(Identity::parse(""), None);
    }
}
