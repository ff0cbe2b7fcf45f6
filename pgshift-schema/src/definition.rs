//! Declarative schema definitions.
//!
//! A [`DatabaseDefinition`] is the target state a project declares. It can
//! be assembled in Rust with the builder methods or loaded from TOML:
//!
//! ```toml
//! extensions = ["pgcrypto"]
//!
//! [[schema]]
//! name = "app"
//!
//! [[schema.table]]
//! name = "users"
//! primary_key = ["id"]
//!
//! [[schema.table.column]]
//! name = "id"
//! type = "bigint"
//! nullable = false
//! identity = "ALWAYS"
//!
//! [[schema.table.column]]
//! name = "email"
//! type = "varchar(255)"
//! nullable = false
//!
//! [[schema.table.unique]]
//! columns = ["email"]
//! ```
//!
//! [`DatabaseDefinition::to_info`] compiles the definition into the
//! information model, computing every hash key through [`crate::hash`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SchemaError, SchemaResult};
use crate::hash::Canonical;
use crate::model::{
    ColumnInfo, DatabaseInfo, DefaultValue, EntryKind, Identity, SchemaInfo, TableInfo,
    join_enum_values,
};
use crate::naming::{managed_name, qualified, quote_ident, trigger_name, ObjectKind};
use crate::types::normalize_type;

fn yes() -> bool {
    true
}

/// The declared target state of a database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseDefinition {
    /// Extensions to install.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Declared schemas.
    #[serde(default, rename = "schema")]
    pub schemas: Vec<SchemaDef>,
}

impl DatabaseDefinition {
    /// Create an empty definition.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an extension.
    pub fn extension(mut self, name: impl Into<String>) -> Self {
        self.extensions.push(name.into());
        self
    }

    /// Add a schema.
    pub fn schema(mut self, schema: SchemaDef) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Parse a definition from TOML.
    pub fn from_toml_str(content: &str) -> SchemaResult<Self> {
        toml::from_str(content).map_err(|e| SchemaError::TomlError { source: e })
    }

    /// Load a definition file.
    pub fn from_file(path: impl AsRef<Path>) -> SchemaResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| SchemaError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    /// Declared schema names, in declaration order.
    pub fn schema_names(&self) -> Vec<&str> {
        self.schemas.iter().map(|s| s.name.as_str()).collect()
    }

    /// Refuse schema name collisions.
    pub fn check_schema_names(&self) -> SchemaResult<()> {
        let mut seen = BTreeSet::new();
        for schema in &self.schemas {
            if !seen.insert(schema.name.as_str()) {
                return Err(SchemaError::DuplicateSchema {
                    name: schema.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Compile the definition into the information model.
    pub fn to_info(&self) -> SchemaResult<DatabaseInfo> {
        self.check_schema_names()?;

        let mut info = DatabaseInfo::new();
        info.extensions = self.extensions.iter().cloned().collect();

        let mut errors = Vec::new();
        for schema in &self.schemas {
            match schema.compile(self) {
                Ok(compiled) => {
                    info.schemas.insert(schema.name.clone(), compiled);
                }
                Err(SchemaError::ValidationFailed { errors: nested, .. }) => errors.extend(nested),
                Err(e) => errors.push(e),
            }
        }
        SchemaError::collect(errors)?;

        debug!(
            schemas = info.schemas.len(),
            extensions = info.extensions.len(),
            "Compiled schema definition"
        );
        Ok(info)
    }

    fn find_table(&self, schema: &str, table: &str) -> Option<&TableDef> {
        self.schemas
            .iter()
            .find(|s| s.name == schema)
            .and_then(|s| s.tables.iter().find(|t| t.name == table))
    }
}

/// A declared schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDef {
    /// Schema name.
    pub name: String,
    /// Tables.
    #[serde(default, rename = "table")]
    pub tables: Vec<TableDef>,
    /// Enum types.
    #[serde(default, rename = "enum")]
    pub enums: Vec<EnumDef>,
}

impl SchemaDef {
    /// Create an empty schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a table.
    pub fn table(mut self, table: TableDef) -> Self {
        self.tables.push(table);
        self
    }

    /// Add an enum type.
    pub fn enumeration(mut self, def: EnumDef) -> Self {
        self.enums.push(def);
        self
    }

    fn compile(&self, database: &DatabaseDefinition) -> SchemaResult<SchemaInfo> {
        let mut info = SchemaInfo::new(&self.name);
        let mut errors = Vec::new();

        let mut enum_names = BTreeSet::new();
        for def in &self.enums {
            if !enum_names.insert(def.name.as_str()) {
                errors.push(SchemaError::duplicate(&self.name, "enum", &def.name));
                continue;
            }
            match def.compile(&self.name) {
                Ok(values) => {
                    info.enums.insert(def.name.clone(), values);
                }
                Err(e) => errors.push(e),
            }
        }

        for table in &self.tables {
            if info.tables.contains_key(&table.name) {
                errors.push(SchemaError::duplicate(&self.name, "table", &table.name));
                continue;
            }
            if let Err(e) = table.compile(&self.name, &enum_names, database, &mut info) {
                errors.push(e);
            }
        }

        SchemaError::collect(errors)?;
        Ok(info)
    }
}

/// A declared enum type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnumDef {
    /// Type name.
    pub name: String,
    /// Values in order.
    pub values: Vec<String>,
}

impl EnumDef {
    /// Create an enum type.
    pub fn new<S: Into<String>>(name: impl Into<String>, values: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    fn compile(&self, schema: &str) -> SchemaResult<String> {
        if self.values.is_empty() {
            return Err(SchemaError::invalid_enum(schema, &self.name, "no values declared"));
        }
        let mut seen = BTreeSet::new();
        for value in &self.values {
            if value.contains(',') {
                return Err(SchemaError::invalid_enum(
                    schema,
                    &self.name,
                    format!("value `{}` may not contain a comma", value),
                ));
            }
            if !seen.insert(value.as_str()) {
                return Err(SchemaError::duplicate(
                    schema,
                    format!("value of enum `{}`", self.name),
                    value,
                ));
            }
        }
        Ok(join_enum_values(&self.values))
    }
}

/// A declared table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableDef {
    /// Table name.
    pub name: String,
    /// Columns in order.
    #[serde(default, rename = "column")]
    pub columns: Vec<ColumnDef>,
    /// Primary key columns.
    #[serde(default)]
    pub primary_key: Vec<String>,
    /// Unique constraints.
    #[serde(default, rename = "unique")]
    pub uniques: Vec<UniqueDef>,
    /// Foreign keys.
    #[serde(default, rename = "foreign_key")]
    pub foreign_keys: Vec<ForeignKeyDef>,
    /// Check constraints.
    #[serde(default, rename = "check")]
    pub checks: Vec<CheckDef>,
    /// Indexes.
    #[serde(default, rename = "index")]
    pub indexes: Vec<IndexDef>,
    /// Triggers.
    #[serde(default, rename = "trigger")]
    pub triggers: Vec<TriggerDef>,
}

impl TableDef {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a column.
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the primary key.
    pub fn primary_key<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Add a unique constraint.
    pub fn unique(mut self, unique: UniqueDef) -> Self {
        self.uniques.push(unique);
        self
    }

    /// Add a foreign key.
    pub fn foreign_key(mut self, fk: ForeignKeyDef) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Add a check constraint.
    pub fn check(mut self, expression: impl Into<String>) -> Self {
        self.checks.push(CheckDef {
            expression: expression.into(),
        });
        self
    }

    /// Add an index.
    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Add a trigger.
    pub fn trigger(mut self, trigger: TriggerDef) -> Self {
        self.triggers.push(trigger);
        self
    }

    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    fn require_columns(&self, schema: &str, columns: &[String], context: &str) -> SchemaResult<()> {
        if columns.is_empty() {
            return Err(SchemaError::invalid_table(
                schema,
                &self.name,
                format!("{} needs at least one column", context),
            ));
        }
        for column in columns {
            if !self.has_column(column) {
                return Err(SchemaError::unknown_column(schema, &self.name, column, context));
            }
        }
        Ok(())
    }

    fn compile(
        &self,
        schema: &str,
        enums: &BTreeSet<&str>,
        database: &DatabaseDefinition,
        info: &mut SchemaInfo,
    ) -> SchemaResult<()> {
        let mut table = TableInfo::new();
        for column in &self.columns {
            if table.columns.contains_key(&column.name) {
                return Err(SchemaError::duplicate(
                    schema,
                    format!("column of `{}`", self.name),
                    &column.name,
                ));
            }
            table
                .columns
                .insert(column.name.clone(), column.compile(enums));
        }

        let mut entries: BTreeMap<EntryKind, BTreeMap<String, String>> = BTreeMap::new();
        let mut insert = |kind: EntryKind, key: String, definition: String| {
            entries.entry(kind).or_default().insert(key, definition)
        };

        if !self.primary_key.is_empty() {
            self.require_columns(schema, &self.primary_key, "primary key")?;
            let hash = Canonical::new("primary_key")
                .column_set("columns", &self.primary_key)
                .finish();
            insert(
                EntryKind::PrimaryKey,
                hash,
                format!("PRIMARY KEY ({})", quote_columns(&self.primary_key)),
            );
        }

        for unique in &self.uniques {
            self.require_columns(schema, &unique.columns, "unique constraint")?;
            insert(EntryKind::Unique, unique.hash(), unique.definition());
        }

        for fk in &self.foreign_keys {
            self.require_columns(schema, &fk.columns, "foreign key")?;
            if fk.columns.len() != fk.references_columns.len() {
                return Err(SchemaError::invalid_table(
                    schema,
                    &self.name,
                    "foreign key column count does not match referenced columns",
                ));
            }
            let target_schema = fk.target_schema(schema);
            if database.schemas.iter().any(|s| s.name == target_schema) {
                let target = database
                    .find_table(target_schema, &fk.references_table)
                    .ok_or_else(|| {
                        SchemaError::invalid_table(
                            schema,
                            &self.name,
                            format!(
                                "foreign key references unknown table `{}.{}`",
                                target_schema, fk.references_table
                            ),
                        )
                    })?;
                target.require_columns(target_schema, &fk.references_columns, "foreign key target")?;
            }
            insert(EntryKind::ForeignKey, fk.hash(schema), fk.definition(schema));
        }

        for check in &self.checks {
            insert(EntryKind::Check, check.hash(), check.definition());
        }

        for index in &self.indexes {
            for column in &index.columns {
                if is_plain_identifier(column) && !self.has_column(column) {
                    return Err(SchemaError::unknown_column(schema, &self.name, column, "index"));
                }
            }
            let hash = index.hash();
            let name = managed_name(&self.name, &hash, ObjectKind::Index);
            insert(EntryKind::Index, hash, index.statement(schema, &self.name, &name));
        }

        for trigger in &self.triggers {
            let (name, value) = trigger.compile(schema, &self.name);
            if insert(EntryKind::Trigger, name.clone(), value).is_some() {
                return Err(SchemaError::duplicate(schema, "trigger", name));
            }
        }

        info.tables.insert(self.name.clone(), table);
        for (kind, items) in entries {
            info.entries_mut(kind).insert(self.name.clone(), items);
        }
        Ok(())
    }
}

/// A declared column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Declared type; aliases are normalized.
    #[serde(rename = "type")]
    pub data_type: String,
    /// Whether NULL is allowed.
    #[serde(default = "yes")]
    pub nullable: bool,
    /// Default SQL expression.
    #[serde(default)]
    pub default: Option<String>,
    /// Identity generation.
    #[serde(default)]
    pub identity: Option<Identity>,
    /// Previous column name.
    #[serde(default)]
    pub rename_from: Option<String>,
}

impl ColumnDef {
    /// Create a nullable column.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            default: None,
            identity: None,
            rename_from: None,
        }
    }

    /// Mark NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set a default expression.
    pub fn default_sql(mut self, sql: impl Into<String>) -> Self {
        self.default = Some(sql.into());
        self
    }

    /// Set identity generation.
    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Record the column's previous name.
    pub fn renamed_from(mut self, name: impl Into<String>) -> Self {
        self.rename_from = Some(name.into());
        self
    }

    fn compile(&self, enums: &BTreeSet<&str>) -> ColumnInfo {
        let mut identity = self.identity;
        let mut column = if enums.contains(self.data_type.as_str()) {
            ColumnInfo::enumeration(&self.data_type)
        } else {
            let normalized = normalize_type(&self.data_type);
            // serial types are declared as identity columns
            let base = match normalized.as_str() {
                "smallserial" => Some("smallint"),
                "serial" => Some("integer"),
                "bigserial" => Some("bigint"),
                _ => None,
            };
            match base {
                Some(base) => {
                    identity = identity.or(Some(Identity::ByDefault));
                    ColumnInfo::new(base)
                }
                None => ColumnInfo::new(normalized),
            }
        };
        // identity columns are implicitly NOT NULL
        column.is_nullable = self.nullable && identity.is_none();
        column.default_value = self.default.as_deref().map(DefaultValue::new);
        column.identity = identity;
        column.rename_from = self.rename_from.clone();
        column
    }
}

/// A declared unique constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UniqueDef {
    /// Columns.
    pub columns: Vec<String>,
    /// Whether NULLs compare distinct (the PostgreSQL default).
    #[serde(default = "yes")]
    pub nulls_distinct: bool,
}

impl UniqueDef {
    /// Create a unique constraint.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            nulls_distinct: true,
        }
    }

    /// Treat NULLs as equal.
    pub fn nulls_not_distinct(mut self) -> Self {
        self.nulls_distinct = false;
        self
    }

    /// Content hash.
    pub fn hash(&self) -> String {
        Canonical::new("unique")
            .column_set("columns", &self.columns)
            .field("nulls_distinct", self.nulls_distinct)
            .finish()
    }

    /// Compiled constraint definition.
    pub fn definition(&self) -> String {
        let nulls = if self.nulls_distinct {
            ""
        } else {
            "NULLS NOT DISTINCT "
        };
        format!("UNIQUE {}({})", nulls, quote_columns(&self.columns))
    }
}

/// Referential action of a foreign key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferentialAction {
    /// `NO ACTION`.
    #[default]
    NoAction,
    /// `RESTRICT`.
    Restrict,
    /// `CASCADE`.
    Cascade,
    /// `SET NULL`.
    SetNull,
    /// `SET DEFAULT`.
    SetDefault,
}

impl ReferentialAction {
    /// SQL keyword form.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// A declared foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForeignKeyDef {
    /// Local columns.
    pub columns: Vec<String>,
    /// Referenced schema; defaults to the declaring schema.
    #[serde(default)]
    pub references_schema: Option<String>,
    /// Referenced table.
    pub references_table: String,
    /// Referenced columns, paired with `columns`.
    pub references_columns: Vec<String>,
    /// `ON DELETE` action.
    #[serde(default)]
    pub on_delete: ReferentialAction,
    /// `ON UPDATE` action.
    #[serde(default)]
    pub on_update: ReferentialAction,
}

impl ForeignKeyDef {
    /// Create a foreign key referencing a table in the same schema.
    pub fn new<S: Into<String>, T: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        table: impl Into<String>,
        references: impl IntoIterator<Item = T>,
    ) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            references_schema: None,
            references_table: table.into(),
            references_columns: references.into_iter().map(Into::into).collect(),
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
        }
    }

    /// Reference a table in another schema.
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.references_schema = Some(schema.into());
        self
    }

    /// Set the `ON DELETE` action.
    pub fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Set the `ON UPDATE` action.
    pub fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }

    fn target_schema<'a>(&'a self, schema: &'a str) -> &'a str {
        self.references_schema.as_deref().unwrap_or(schema)
    }

    /// Column pairs sorted by local column.
    fn sorted_pairs(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = self
            .columns
            .iter()
            .map(String::as_str)
            .zip(self.references_columns.iter().map(String::as_str))
            .collect();
        pairs.sort_unstable();
        pairs
    }

    /// Content hash; pairing order and declaration order do not matter.
    pub fn hash(&self, schema: &str) -> String {
        let (local, remote): (Vec<&str>, Vec<&str>) = self.sorted_pairs().into_iter().unzip();
        Canonical::new("foreign_key")
            .list("columns", &local)
            .field("table", format!("{}.{}", self.target_schema(schema), self.references_table))
            .list("references", &remote)
            .field("on_delete", self.on_delete.as_sql())
            .field("on_update", self.on_update.as_sql())
            .finish()
    }

    /// Compiled constraint definition.
    pub fn definition(&self, schema: &str) -> String {
        format!(
            "FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {} ON UPDATE {}",
            quote_columns(&self.columns),
            qualified(self.target_schema(schema), &self.references_table),
            quote_columns(&self.references_columns),
            self.on_delete.as_sql(),
            self.on_update.as_sql()
        )
    }
}

/// A declared check constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckDef {
    /// Boolean SQL expression.
    pub expression: String,
}

impl CheckDef {
    /// Content hash.
    pub fn hash(&self) -> String {
        Canonical::new("check").sql("expression", &self.expression).finish()
    }

    /// Compiled constraint definition.
    pub fn definition(&self) -> String {
        format!("CHECK ({})", self.expression.trim())
    }
}

/// A declared index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexDef {
    /// Columns or expressions, in order.
    pub columns: Vec<String>,
    /// Whether the index is unique.
    #[serde(default)]
    pub unique: bool,
    /// Access method.
    #[serde(default = "default_index_method")]
    pub method: String,
    /// Partial index predicate.
    #[serde(default)]
    pub predicate: Option<String>,
}

fn default_index_method() -> String {
    "btree".to_string()
}

impl IndexDef {
    /// Create a btree index.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            method: default_index_method(),
            predicate: None,
        }
    }

    /// Make the index unique.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Use another access method.
    pub fn using(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Make the index partial.
    pub fn predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    /// Content hash of the compiled definition.
    pub fn hash(&self) -> String {
        Canonical::new("index")
            .list("columns", &self.columns)
            .field("unique", self.unique)
            .field("method", self.method.to_lowercase())
            .sql("predicate", self.predicate.as_deref().unwrap_or(""))
            .finish()
    }

    /// Compiled `CREATE INDEX` statement.
    pub fn statement(&self, schema: &str, table: &str, name: &str) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                if is_plain_identifier(c) {
                    quote_ident(c)
                } else {
                    c.clone()
                }
            })
            .collect();
        let mut sql = format!(
            "CREATE {}INDEX {} ON {} USING {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            quote_ident(name),
            qualified(schema, table),
            self.method.to_lowercase(),
            columns.join(", ")
        );
        if let Some(predicate) = &self.predicate {
            sql.push_str(&format!(" WHERE ({})", predicate.trim()));
        }
        sql
    }
}

/// When a trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerTiming {
    /// `BEFORE`.
    Before,
    /// `AFTER`.
    After,
    /// `INSTEAD OF`.
    InsteadOf,
}

impl TriggerTiming {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Before => "BEFORE",
            Self::After => "AFTER",
            Self::InsteadOf => "INSTEAD OF",
        }
    }
}

/// Event a trigger listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerEvent {
    /// `INSERT`.
    Insert,
    /// `UPDATE`.
    Update,
    /// `DELETE`.
    Delete,
    /// `TRUNCATE`.
    Truncate,
}

impl TriggerEvent {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
        }
    }
}

/// A declared trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriggerDef {
    /// Trigger name; `_pgshift_trg` is appended when missing.
    pub name: String,
    /// Timing.
    pub timing: TriggerTiming,
    /// Events.
    pub events: Vec<TriggerEvent>,
    /// Fire once per row rather than per statement.
    #[serde(default = "yes")]
    pub for_each_row: bool,
    /// Function call, e.g. `app.touch_updated_at()`.
    pub function: String,
    /// Optional `WHEN` condition.
    #[serde(default)]
    pub when: Option<String>,
}

impl TriggerDef {
    /// Create a row-level trigger.
    pub fn new(
        name: impl Into<String>,
        timing: TriggerTiming,
        events: impl IntoIterator<Item = TriggerEvent>,
        function: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            timing,
            events: events.into_iter().collect(),
            for_each_row: true,
            function: function.into(),
            when: None,
        }
    }

    /// Add a `WHEN` condition.
    pub fn when(mut self, condition: impl Into<String>) -> Self {
        self.when = Some(condition.into());
        self
    }

    /// Compile into `(trigger name, "hash:sql")`.
    pub fn compile(&self, schema: &str, table: &str) -> (String, String) {
        let name = trigger_name(&self.name);
        let events: Vec<&str> = self.events.iter().map(TriggerEvent::as_sql).collect();
        let mut sql = format!(
            "CREATE TRIGGER {} {} {} ON {} FOR EACH {}",
            quote_ident(&name),
            self.timing.as_sql(),
            events.join(" OR "),
            qualified(schema, table),
            if self.for_each_row { "ROW" } else { "STATEMENT" }
        );
        if let Some(condition) = &self.when {
            sql.push_str(&format!(" WHEN ({})", condition.trim()));
        }
        sql.push_str(&format!(" EXECUTE FUNCTION {}", self.function.trim()));

        let hash = Canonical::new("trigger").sql("sql", &sql).finish();
        (name, format!("{}:{}", hash, sql))
    }
}

/// Quote a list of column names.
pub fn quote_columns<S: AsRef<str>>(columns: &[S]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_plain_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !value.starts_with(|c: char| c.is_ascii_digit())
}
