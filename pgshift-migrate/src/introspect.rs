//! Building the current model from catalog records.
//!
//! An [`Introspector`] returns raw records; [`RemoteSchemaBuilder`] turns
//! them into a [`DatabaseInfo`]. Only objects following the managed naming
//! convention are kept, plus objects explicitly listed as external. Hashes
//! come back from names (constraints, indexes) and comments (triggers,
//! column defaults).

use std::collections::BTreeSet;

use pgshift_schema::hash::{default_hash, is_content_hash};
use pgshift_schema::model::join_enum_values;
use pgshift_schema::naming::{SCHEMA_COMMENT, is_managed_trigger, parse_managed_name};
use pgshift_schema::{
    ColumnInfo, DatabaseInfo, DefaultValue, EntryKind, Identity, SchemaError, SchemaInfo,
    TableInfo,
};
use tracing::debug;

use crate::config::MigrationConfig;
use crate::error::MigrateResult;
use crate::history::HistoryTables;

/// Configuration for introspection.
#[derive(Debug, Clone, Default)]
pub struct IntrospectionConfig {
    /// Schemas to read even when they are not managed (usually every
    /// declared schema).
    pub schemas: Vec<String>,
    /// Unmanaged objects to keep, as `schema.name`.
    pub external: Vec<String>,
    /// Tables never read, as `(schema, table)`.
    pub exclude_tables: Vec<(String, String)>,
}

impl IntrospectionConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration for an engine, excluding its own history tables.
    pub fn from_config(config: &MigrationConfig) -> Self {
        let tables = HistoryTables::from_config(config);
        Self {
            schemas: Vec::new(),
            external: config.external.clone(),
            exclude_tables: tables
                .table_names()
                .into_iter()
                .map(|t| (tables.schema.clone(), t))
                .collect(),
        }
    }

    /// Read these schemas.
    pub fn schemas<S: Into<String>>(mut self, schemas: impl IntoIterator<Item = S>) -> Self {
        self.schemas.extend(schemas.into_iter().map(Into::into));
        self
    }

    /// Keep an unmanaged object.
    pub fn external(mut self, name: impl Into<String>) -> Self {
        self.external.push(name.into());
        self
    }

    /// Whether `schema.name` is external.
    pub fn is_external(&self, schema: &str, name: &str) -> bool {
        self.external
            .iter()
            .any(|e| e.split_once('.') == Some((schema, name)))
    }

    fn is_excluded(&self, schema: &str, table: &str) -> bool {
        self.exclude_tables
            .iter()
            .any(|(s, t)| s == schema && t == table)
    }
}

/// A schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRecord {
    /// Name.
    pub name: String,
    /// `COMMENT ON SCHEMA`.
    pub comment: Option<String>,
}

/// A base table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRecord {
    /// Schema.
    pub schema: String,
    /// Name.
    pub name: String,
}

/// A column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRecord {
    /// Schema.
    pub schema: String,
    /// Table.
    pub table: String,
    /// Name.
    pub name: String,
    /// Position within the table.
    pub ordinal: i32,
    /// `format_type()` output, or the bare type name for enums.
    pub data_type: String,
    /// Whether the type is an enum.
    pub is_enum: bool,
    /// Whether NULL is allowed.
    pub is_nullable: bool,
    /// Default expression.
    pub default: Option<String>,
    /// Identity generation (`ALWAYS` / `BY DEFAULT`).
    pub identity: Option<String>,
    /// `COMMENT ON COLUMN`.
    pub comment: Option<String>,
}

/// Constraint type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintType {
    /// `p`.
    PrimaryKey,
    /// `u`.
    Unique,
    /// `f`.
    ForeignKey,
    /// `c`.
    Check,
}

impl ConstraintType {
    /// Parse a `pg_constraint.contype` code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "p" => Some(Self::PrimaryKey),
            "u" => Some(Self::Unique),
            "f" => Some(Self::ForeignKey),
            "c" => Some(Self::Check),
            _ => None,
        }
    }

    fn entry_kind(&self) -> EntryKind {
        match self {
            Self::PrimaryKey => EntryKind::PrimaryKey,
            Self::Unique => EntryKind::Unique,
            Self::ForeignKey => EntryKind::ForeignKey,
            Self::Check => EntryKind::Check,
        }
    }
}

/// A table constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintRecord {
    /// Schema.
    pub schema: String,
    /// Table.
    pub table: String,
    /// Name.
    pub name: String,
    /// Type.
    pub constraint_type: ConstraintType,
    /// `pg_get_constraintdef()` output.
    pub definition: String,
}

/// An index that does not back a constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    /// Schema.
    pub schema: String,
    /// Table.
    pub table: String,
    /// Name.
    pub name: String,
    /// `pg_get_indexdef()` output.
    pub definition: String,
}

/// A user trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRecord {
    /// Schema.
    pub schema: String,
    /// Table.
    pub table: String,
    /// Name.
    pub name: String,
    /// `pg_get_triggerdef()` output.
    pub definition: String,
    /// `COMMENT ON TRIGGER`.
    pub comment: Option<String>,
}

/// An enum type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumRecord {
    /// Schema.
    pub schema: String,
    /// Name.
    pub name: String,
    /// Values in sort order.
    pub values: Vec<String>,
}

/// Every record of one introspection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogSnapshot {
    /// Installed extensions.
    pub extensions: Vec<String>,
    /// Schemas.
    pub schemas: Vec<SchemaRecord>,
    /// Tables.
    pub tables: Vec<TableRecord>,
    /// Columns.
    pub columns: Vec<ColumnRecord>,
    /// Constraints.
    pub constraints: Vec<ConstraintRecord>,
    /// Indexes.
    pub indexes: Vec<IndexRecord>,
    /// Triggers.
    pub triggers: Vec<TriggerRecord>,
    /// Enums.
    pub enums: Vec<EnumRecord>,
}

/// Catalog access. Every query is restricted to the given schemas.
#[async_trait::async_trait]
pub trait Introspector: Send + Sync {
    /// Installed extensions.
    async fn extensions(&self) -> MigrateResult<Vec<String>>;

    /// Every non-system schema.
    async fn schemas(&self) -> MigrateResult<Vec<SchemaRecord>>;

    /// Base tables.
    async fn tables(&self, schemas: &[String]) -> MigrateResult<Vec<TableRecord>>;

    /// Columns of base tables.
    async fn columns(&self, schemas: &[String]) -> MigrateResult<Vec<ColumnRecord>>;

    /// Primary key, unique, foreign key and check constraints.
    async fn constraints(&self, schemas: &[String]) -> MigrateResult<Vec<ConstraintRecord>>;

    /// Indexes not backing a constraint.
    async fn indexes(&self, schemas: &[String]) -> MigrateResult<Vec<IndexRecord>>;

    /// User triggers.
    async fn triggers(&self, schemas: &[String]) -> MigrateResult<Vec<TriggerRecord>>;

    /// Enum types.
    async fn enums(&self, schemas: &[String]) -> MigrateResult<Vec<EnumRecord>>;
}

/// Read the catalog and build the current model.
pub async fn introspect<I: Introspector + ?Sized>(
    introspector: &I,
    config: &IntrospectionConfig,
) -> MigrateResult<DatabaseInfo> {
    let (extensions, schemas) = futures::try_join!(introspector.extensions(), introspector.schemas())?;
    let mut snapshot = CatalogSnapshot {
        extensions,
        schemas,
        ..CatalogSnapshot::default()
    };

    let names = RemoteSchemaBuilder::new(config).schema_names(&snapshot);
    if !names.is_empty() {
        let (tables, enums) = futures::try_join!(introspector.tables(&names), introspector.enums(&names))?;
        snapshot.tables = tables;
        snapshot.enums = enums;
    }

    if !snapshot.tables.is_empty() {
        let (columns, constraints, indexes, triggers) = futures::try_join!(
            introspector.columns(&names),
            introspector.constraints(&names),
            introspector.indexes(&names),
            introspector.triggers(&names),
        )?;
        snapshot.columns = columns;
        snapshot.constraints = constraints;
        snapshot.indexes = indexes;
        snapshot.triggers = triggers;
    }

    debug!(
        schemas = names.len(),
        tables = snapshot.tables.len(),
        columns = snapshot.columns.len(),
        constraints = snapshot.constraints.len(),
        indexes = snapshot.indexes.len(),
        triggers = snapshot.triggers.len(),
        "Introspected catalog"
    );

    Ok(RemoteSchemaBuilder::new(config).build(&snapshot)?)
}

/// Turns catalog records into the information model.
#[derive(Debug)]
pub struct RemoteSchemaBuilder<'a> {
    config: &'a IntrospectionConfig,
}

impl<'a> RemoteSchemaBuilder<'a> {
    /// Create a builder.
    pub fn new(config: &'a IntrospectionConfig) -> Self {
        Self { config }
    }

    /// Schemas to read: managed ones and the configured ones that exist.
    pub fn schema_names(&self, snapshot: &CatalogSnapshot) -> Vec<String> {
        snapshot
            .schemas
            .iter()
            .filter(|s| s.comment.as_deref() == Some(SCHEMA_COMMENT) || self.config.schemas.contains(&s.name))
            .map(|s| s.name.clone())
            .collect()
    }

    /// Build the model.
    pub fn build(&self, snapshot: &CatalogSnapshot) -> Result<DatabaseInfo, SchemaError> {
        let mut info = DatabaseInfo::new();
        info.extensions = snapshot.extensions.iter().cloned().collect();

        let names: BTreeSet<String> = self.schema_names(snapshot).into_iter().collect();
        for name in &names {
            info.schemas.insert(name.clone(), SchemaInfo::new(name));
        }

        let mut tables: BTreeSet<(&str, &str)> = BTreeSet::new();
        for table in &snapshot.tables {
            if !names.contains(&table.schema)
                || self.config.is_excluded(&table.schema, &table.name)
                || self.config.is_external(&table.schema, &table.name)
            {
                continue;
            }
            tables.insert((table.schema.as_str(), table.name.as_str()));
            info.schema_mut(&table.schema)
                .tables
                .insert(table.name.clone(), TableInfo::new());
        }
        let has_table = |schema: &str, table: &str| tables.contains(&(schema, table));

        let mut columns: Vec<&ColumnRecord> = snapshot
            .columns
            .iter()
            .filter(|c| has_table(&c.schema, &c.table))
            .collect();
        columns.sort_by_key(|c| (&c.schema, &c.table, c.ordinal));
        for record in columns {
            let column = build_column(record);
            if let Some(table) = info.schema_mut(&record.schema).tables.get_mut(&record.table) {
                table.columns.insert(record.name.clone(), column);
            }
        }

        for record in snapshot.constraints.iter().filter(|c| has_table(&c.schema, &c.table)) {
            let kind = record.constraint_type.entry_kind();
            if let Some(key) = self.entry_key(&record.schema, &record.name, kind)? {
                info.schema_mut(&record.schema).entries_mut(kind)
                    .entry(record.table.clone())
                    .or_default()
                    .insert(key, record.definition.clone());
            }
        }

        for record in snapshot.indexes.iter().filter(|i| has_table(&i.schema, &i.table)) {
            if let Some(key) = self.entry_key(&record.schema, &record.name, EntryKind::Index)? {
                info.schema_mut(&record.schema)
                    .indexes
                    .entry(record.table.clone())
                    .or_default()
                    .insert(key, record.definition.clone());
            }
        }

        for record in snapshot.triggers.iter().filter(|t| has_table(&t.schema, &t.table)) {
            let value = if is_managed_trigger(&record.name) {
                match record.comment.as_deref().filter(|c| is_content_hash(c)) {
                    Some(hash) => format!("{}:{}", hash, record.definition),
                    None => return Err(SchemaError::malformed("trigger", &record.name)),
                }
            } else if self.config.is_external(&record.schema, &record.name) {
                record.definition.clone()
            } else {
                continue;
            };
            info.schema_mut(&record.schema)
                .triggers
                .entry(record.table.clone())
                .or_default()
                .insert(record.name.clone(), value);
        }

        for record in snapshot.enums.iter().filter(|e| names.contains(&e.schema)) {
            if self.config.is_external(&record.schema, &record.name) {
                continue;
            }
            info.schema_mut(&record.schema)
                .enums
                .insert(record.name.clone(), join_enum_values(&record.values));
        }

        Ok(info)
    }

    /// Key of a constraint or index: its hash when managed, its name when
    /// external, `None` when neither.
    fn entry_key(&self, schema: &str, name: &str, kind: EntryKind) -> Result<Option<String>, SchemaError> {
        match parse_managed_name(name)? {
            Some(managed) if Some(managed.kind) == kind.object_kind() => Ok(Some(managed.hash)),
            Some(_) => Err(SchemaError::malformed(object_label(kind), name)),
            None if self.config.is_external(schema, name) => Ok(Some(name.to_string())),
            None => Ok(None),
        }
    }
}

fn object_label(kind: EntryKind) -> &'static str {
    kind.object_kind().map(|k| k.describe()).unwrap_or("trigger")
}

fn build_column(record: &ColumnRecord) -> ColumnInfo {
    let mut column = if record.is_enum {
        ColumnInfo::enumeration(record.data_type.clone())
    } else {
        ColumnInfo::new(record.data_type.clone())
    };
    column.is_nullable = record.is_nullable;
    column.identity = record.identity.as_deref().and_then(Identity::parse);
    column.default_value = record.default.as_ref().map(|sql| DefaultValue {
        hash: record
            .comment
            .clone()
            .filter(|c| is_content_hash(c))
            .unwrap_or_else(|| default_hash(sql)),
        sql: sql.clone(),
    });
    column
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use pretty_assertions::assert_eq;

    struct Fake {
        snapshot: CatalogSnapshot,
        table_queries: AtomicUsize,
        column_queries: AtomicUsize,
    }

    impl Fake {
        fn new(snapshot: CatalogSnapshot) -> Self {
            Self {
                snapshot,
                table_queries: AtomicUsize::new(0),
                column_queries: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl Introspector for Fake {
        async fn extensions(&self) -> MigrateResult<Vec<String>> {
            Ok(self.snapshot.extensions.clone())
        }
        async fn schemas(&self) -> MigrateResult<Vec<SchemaRecord>> {
            Ok(self.snapshot.schemas.clone())
        }
        async fn tables(&self, _: &[String]) -> MigrateResult<Vec<TableRecord>> {
            self.table_queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.snapshot.tables.clone())
        }
        async fn columns(&self, _: &[String]) -> MigrateResult<Vec<ColumnRecord>> {
            self.column_queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.snapshot.columns.clone())
        }
        async fn constraints(&self, _: &[String]) -> MigrateResult<Vec<ConstraintRecord>> {
            Ok(self.snapshot.constraints.clone())
        }
        async fn indexes(&self, _: &[String]) -> MigrateResult<Vec<IndexRecord>> {
            Ok(self.snapshot.indexes.clone())
        }
        async fn triggers(&self, _: &[String]) -> MigrateResult<Vec<TriggerRecord>> {
            Ok(self.snapshot.triggers.clone())
        }
        async fn enums(&self, _: &[String]) -> MigrateResult<Vec<EnumRecord>> {
            Ok(self.snapshot.enums.clone())
        }
    }

    fn schema(name: &str, comment: Option<&str>) -> SchemaRecord {
        SchemaRecord {
            name: name.to_string(),
            comment: comment.map(str::to_string),
        }
    }

    fn table(name: &str) -> TableRecord {
        TableRecord {
            schema: "app".to_string(),
            name: name.to_string(),
        }
    }

    fn column(table: &str, name: &str, ordinal: i32, data_type: &str) -> ColumnRecord {
        ColumnRecord {
            schema: "app".to_string(),
            table: table.to_string(),
            name: name.to_string(),
            ordinal,
            data_type: data_type.to_string(),
            is_enum: false,
            is_nullable: true,
            default: None,
            identity: None,
            comment: None,
        }
    }

    fn constraint(name: &str, constraint_type: ConstraintType, definition: &str) -> ConstraintRecord {
        ConstraintRecord {
            schema: "app".to_string(),
            table: "users".to_string(),
            name: name.to_string(),
            constraint_type,
            definition: definition.to_string(),
        }
    }

    fn trigger(name: &str, comment: Option<&str>) -> TriggerRecord {
        TriggerRecord {
            schema: "app".to_string(),
            table: "users".to_string(),
            name: name.to_string(),
            definition: format!("CREATE TRIGGER {} BEFORE UPDATE ON app.users", name),
            comment: comment.map(str::to_string),
        }
    }

    fn snapshot() -> CatalogSnapshot {
        let mut id = column("users", "id", 1, "bigint");
        id.is_nullable = false;
        id.identity = Some("ALWAYS".to_string());
        let mut created = column("users", "created_at", 3, "timestamp with time zone");
        created.default = Some("now()".to_string());
        created.comment = Some("0badcafe".to_string());
        let mut mood = column("users", "mood", 2, "mood");
        mood.is_enum = true;

        CatalogSnapshot {
            extensions: vec!["pgcrypto".to_string()],
            schemas: vec![
                schema("app", Some("pgshift")),
                schema("public", None),
                schema("legacy", None),
            ],
            tables: vec![table("users"), table("pgshift_migrations_expand")],
            columns: vec![created, id, mood, column("pgshift_migrations_expand", "name", 1, "text")],
            constraints: vec![
                constraint("users_0a1b2c3d_pgshift_pk", ConstraintType::PrimaryKey, "PRIMARY KEY (id)"),
                constraint("users_email_key", ConstraintType::Unique, "UNIQUE (email)"),
                constraint("users_legacy_check", ConstraintType::Check, "CHECK (id > 0)"),
            ],
            indexes: vec![IndexRecord {
                schema: "app".to_string(),
                table: "users".to_string(),
                name: "users_1a2b3c4d_pgshift_idx".to_string(),
                definition: "CREATE INDEX users_1a2b3c4d_pgshift_idx ON app.users USING btree (mood)".to_string(),
            }],
            triggers: vec![
                trigger("touch_pgshift_trg", Some("2b3c4d5e")),
                trigger("audit", None),
            ],
            enums: vec![EnumRecord {
                schema: "app".to_string(),
                name: "mood".to_string(),
                values: vec!["happy".to_string(), "sad".to_string()],
            }],
        }
    }

    fn config() -> IntrospectionConfig {
        let mut config = IntrospectionConfig::new().external("app.users_legacy_check");
        config.exclude_tables.push(("app".to_string(), "pgshift_migrations_expand".to_string()));
        config
    }

    #[test]
    fn test_build_managed_objects() {
        let config = config();
        let info = RemoteSchemaBuilder::new(&config).build(&snapshot()).unwrap();

        assert_eq!(info.schemas.keys().collect::<Vec<_>>(), vec!["app"]);
        assert!(info.extensions.contains("pgcrypto"));

        let app = info.schema("app").unwrap();
        assert_eq!(app.tables.keys().collect::<Vec<_>>(), vec!["users"]);

        let users = &app.tables["users"];
        assert_eq!(users.columns.keys().collect::<Vec<_>>(), vec!["id", "mood", "created_at"]);
        assert_eq!(users.columns["id"].identity, Some(Identity::Always));
        assert!(users.columns["mood"].is_enum);
        assert_eq!(
            users.columns["created_at"].default_value.as_ref().map(|d| d.hash.as_str()),
            Some("0badcafe")
        );

        assert_eq!(app.entry(EntryKind::PrimaryKey, "users", "0a1b2c3d"), Some("PRIMARY KEY (id)"));
        assert!(app.entries(EntryKind::Unique).is_empty());
        assert_eq!(
            app.entry(EntryKind::Check, "users", "users_legacy_check"),
            Some("CHECK (id > 0)")
        );
        assert!(app.entry(EntryKind::Index, "users", "1a2b3c4d").is_some());

        let triggers = app.table_entries(EntryKind::Trigger, "users");
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].0, "touch_pgshift_trg");
        assert!(triggers[0].1.starts_with("2b3c4d5e:CREATE TRIGGER touch_pgshift_trg"));

        assert_eq!(app.enum_values("mood"), Some(vec!["happy".to_string(), "sad".to_string()]));
    }

    #[test]
    fn test_default_without_hash_comment() {
        let mut snapshot = snapshot();
        snapshot.columns[0].comment = None;
        let config = config();
        let info = RemoteSchemaBuilder::new(&config).build(&snapshot).unwrap();
        let column = info.column("app", "users", "created_at").unwrap();
        assert_eq!(
            column.default_value.as_ref().map(|d| d.hash.clone()),
            Some(default_hash("now()"))
        );
    }

    #[test]
    fn test_managed_trigger_without_hash_is_malformed() {
        let mut snapshot = snapshot();
        snapshot.triggers = vec![trigger("touch_pgshift_trg", Some("not a hash"))];
        let config = config();
        assert!(matches!(
            RemoteSchemaBuilder::new(&config).build(&snapshot),
            Err(SchemaError::MalformedManagedName { .. })
        ));
    }

    #[test]
    fn test_user_trigger_with_short_suffix_is_ignored() {
        let mut snapshot = snapshot();
        snapshot.triggers.push(trigger("audit_trg", None));
        let config = config();
        let info = RemoteSchemaBuilder::new(&config).build(&snapshot).unwrap();
        let triggers = info.schema("app").unwrap().table_entries(EntryKind::Trigger, "users");
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].0, "touch_pgshift_trg");
    }

    #[test]
    fn test_kind_mismatch_is_malformed() {
        let mut snapshot = snapshot();
        snapshot.constraints = vec![constraint(
            "users_0a1b2c3d_pgshift_fk",
            ConstraintType::Unique,
            "UNIQUE (id)",
        )];
        let config = config();
        assert!(RemoteSchemaBuilder::new(&config).build(&snapshot).is_err());
    }

    #[test]
    fn test_declared_schema_is_read() {
        let config = config().schemas(["legacy"]);
        let names = RemoteSchemaBuilder::new(&config).schema_names(&snapshot());
        assert_eq!(names, vec!["app".to_string(), "legacy".to_string()]);
    }

    #[tokio::test]
    async fn test_introspect_short_circuits() {
        let fake = Fake::new(CatalogSnapshot {
            schemas: vec![schema("public", None)],
            ..CatalogSnapshot::default()
        });
        let info = introspect(&fake, &IntrospectionConfig::new()).await.unwrap();
        assert!(info.schemas.is_empty());
        assert_eq!(fake.table_queries.load(Ordering::SeqCst), 0);
        assert_eq!(fake.column_queries.load(Ordering::SeqCst), 0);

        let fake = Fake::new(CatalogSnapshot {
            schemas: vec![schema("app", Some("pgshift"))],
            ..CatalogSnapshot::default()
        });
        let info = introspect(&fake, &IntrospectionConfig::new()).await.unwrap();
        assert!(info.schema("app").is_some());
        assert_eq!(fake.table_queries.load(Ordering::SeqCst), 1);
        assert_eq!(fake.column_queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_introspect_full() {
        let fake = Fake::new(snapshot());
        let info = introspect(&fake, &config()).await.unwrap();
        assert_eq!(info.schema("app").unwrap().tables.len(), 1);
    }
}
