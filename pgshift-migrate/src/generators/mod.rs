//! Changeset generators.
//!
//! Each [`SchemaChange`] variant is handled by exactly one generator. The
//! generators are pure: they read the target and current models through a
//! [`GenerationContext`] and return changesets, never touching a database.

pub mod column;
pub mod column_change;
pub mod constraint;
pub mod enums;
pub mod extension;
pub mod index;
pub mod rename;
pub mod safe_type;
pub mod schema;
pub mod sql;
pub mod table;
pub mod trigger;

use std::collections::BTreeSet;

use pgshift_schema::{ColumnInfo, DatabaseInfo, EntryKind, SchemaInfo, TableInfo};

use crate::change::{ColumnAttribute, SchemaChange};
use crate::changeset::Changeset;
use crate::error::{MigrateResult, MigrationError};
use crate::rename::{ObjectRename, RenameMap};

/// Everything a generator may look at.
#[derive(Debug)]
pub struct GenerationContext<'a> {
    /// Target model.
    pub local: &'a DatabaseInfo,
    /// Current model, with confirmed renames applied.
    pub remote: &'a DatabaseInfo,
    /// Confirmed renames.
    pub renames: &'a RenameMap,
    /// Managed names and trigger hashes that follow the renames.
    pub objects: &'a [ObjectRename],
    /// Tables created in this run, as `(schema, table)`.
    pub added_tables: BTreeSet<(String, String)>,
    /// Tables dropped in this run, as `(schema, table)`.
    pub dropped_tables: BTreeSet<(String, String)>,
    /// Prefix statements with descriptive comments.
    pub debug: bool,
}

impl<'a> GenerationContext<'a> {
    /// Build a context, deriving the added and dropped table sets.
    pub fn new(
        local: &'a DatabaseInfo,
        remote: &'a DatabaseInfo,
        renames: &'a RenameMap,
        debug: bool,
    ) -> Self {
        Self {
            added_tables: table_difference(local, remote),
            dropped_tables: table_difference(remote, local),
            local,
            remote,
            renames,
            objects: &[],
            debug,
        }
    }

    /// Attach the objects carried along by the renames.
    pub fn with_objects(mut self, objects: &'a [ObjectRename]) -> Self {
        self.objects = objects;
        self
    }

    /// Whether the table is created in this run.
    pub fn is_added(&self, schema: &str, table: &str) -> bool {
        self.added_tables
            .contains(&(schema.to_string(), table.to_string()))
    }

    /// Whether the table is dropped in this run.
    pub fn is_dropped(&self, schema: &str, table: &str) -> bool {
        self.dropped_tables
            .contains(&(schema.to_string(), table.to_string()))
    }

    /// Whether the table exists before and after this run.
    pub fn is_surviving(&self, schema: &str, table: &str) -> bool {
        !self.is_added(schema, table) && !self.is_dropped(schema, table)
    }

    /// Target schema.
    pub fn local_schema(&self, schema: &str) -> MigrateResult<&'a SchemaInfo> {
        self.local
            .schema(schema)
            .ok_or_else(|| missing("target schema", schema))
    }

    /// Current schema.
    pub fn remote_schema(&self, schema: &str) -> MigrateResult<&'a SchemaInfo> {
        self.remote
            .schema(schema)
            .ok_or_else(|| missing("current schema", schema))
    }

    /// Target table.
    pub fn local_table(&self, schema: &str, table: &str) -> MigrateResult<&'a TableInfo> {
        self.local
            .table(schema, table)
            .ok_or_else(|| missing("target table", &format!("{}.{}", schema, table)))
    }

    /// Current table.
    pub fn remote_table(&self, schema: &str, table: &str) -> MigrateResult<&'a TableInfo> {
        self.remote
            .table(schema, table)
            .ok_or_else(|| missing("current table", &format!("{}.{}", schema, table)))
    }

    /// Target column.
    pub fn local_column(&self, schema: &str, table: &str, column: &str) -> MigrateResult<&'a ColumnInfo> {
        self.local
            .column(schema, table, column)
            .ok_or_else(|| missing("target column", &format!("{}.{}.{}", schema, table, column)))
    }

    /// Current column.
    pub fn remote_column(&self, schema: &str, table: &str, column: &str) -> MigrateResult<&'a ColumnInfo> {
        self.remote
            .column(schema, table, column)
            .ok_or_else(|| missing("current column", &format!("{}.{}.{}", schema, table, column)))
    }

    /// Target entry definition.
    pub fn local_entry(&self, schema: &str, kind: EntryKind, table: &str, key: &str) -> MigrateResult<&'a str> {
        self.local_schema(schema)?
            .entry(kind, table, key)
            .ok_or_else(|| missing(kind.tree_key(), &format!("{}.{}.{}", schema, table, key)))
    }

    /// Current entry definition.
    pub fn remote_entry(&self, schema: &str, kind: EntryKind, table: &str, key: &str) -> MigrateResult<&'a str> {
        self.remote_schema(schema)?
            .entry(kind, table, key)
            .ok_or_else(|| missing(kind.tree_key(), &format!("{}.{}.{}", schema, table, key)))
    }
}

fn missing(what: &str, name: &str) -> MigrationError {
    MigrationError::other(format!("{} '{}' is missing from the model", what, name))
}

fn table_difference(left: &DatabaseInfo, right: &DatabaseInfo) -> BTreeSet<(String, String)> {
    left.schemas
        .iter()
        .flat_map(|(schema, info)| {
            info.tables
                .keys()
                .filter(move |table| right.table(schema, table).is_none())
                .map(move |table| (schema.clone(), table.clone()))
        })
        .collect()
}

/// Generate the changesets for one change.
pub fn generate(change: &SchemaChange, ctx: &GenerationContext<'_>) -> MigrateResult<Vec<Changeset>> {
    let changesets = match change {
        SchemaChange::CreateExtension { name } => vec![extension::create(name)],
        SchemaChange::DropExtension { name } => vec![extension::drop(name)],
        SchemaChange::CreateSchema { schema } => vec![schema::create(schema)],
        SchemaChange::DropSchema { schema } => vec![schema::drop(schema)],
        SchemaChange::CreateTable { schema, table } => vec![table::create(ctx, schema, table)?],
        SchemaChange::DropTable { schema, table } => vec![table::drop(ctx, schema, table)?],
        SchemaChange::CreateColumn {
            schema,
            table,
            column,
        } => vec![column::create(ctx, schema, table, column)?],
        SchemaChange::DropColumn {
            schema,
            table,
            column,
        } => vec![column::drop(ctx, schema, table, column)?],
        SchemaChange::ChangeColumn {
            schema,
            table,
            column,
            attribute,
        } => {
            let changeset = match attribute {
                ColumnAttribute::DataType => Some(column_change::data_type(ctx, schema, table, column)?),
                ColumnAttribute::Nullable => column_change::nullable(ctx, schema, table, column)?,
                ColumnAttribute::Default => Some(column_change::default(ctx, schema, table, column)?),
                ColumnAttribute::Identity => Some(column_change::identity(ctx, schema, table, column)?),
            };
            changeset.into_iter().collect()
        }
        SchemaChange::CreateEntry {
            schema,
            kind,
            table,
            key,
        } => match kind {
            EntryKind::Index => vec![index::create(ctx, schema, table, key)?],
            EntryKind::Trigger => vec![trigger::create(ctx, schema, table, key)?],
            _ => vec![constraint::create(ctx, schema, *kind, table, key)?],
        },
        SchemaChange::DropEntry {
            schema,
            kind,
            table,
            key,
        } => match kind {
            EntryKind::Index => vec![index::drop(ctx, schema, table, key)?],
            EntryKind::Trigger => vec![trigger::drop(ctx, schema, table, key)?],
            _ => vec![constraint::drop(ctx, schema, *kind, table, key)?],
        },
        SchemaChange::ChangeEntry {
            schema,
            kind,
            table,
            key,
        } => match kind {
            EntryKind::Trigger => trigger::change(ctx, schema, table, key)?.into_iter().collect(),
            // same hash means same semantics
            _ => Vec::new(),
        },
        SchemaChange::ReplacePrimaryKey {
            schema,
            table,
            old_key,
            new_key,
        } => vec![constraint::replace_primary_key(ctx, schema, table, old_key, new_key)?],
        SchemaChange::CreateEnum { schema, name } => vec![enums::create(ctx, schema, name)?],
        SchemaChange::DropEnum { schema, name } => vec![enums::drop(ctx, schema, name)?],
        SchemaChange::ChangeEnum { schema, name } => vec![enums::change(ctx, schema, name)?],
    };

    Ok(if ctx.debug {
        changesets.into_iter().map(Changeset::annotated).collect()
    } else {
        changesets
    })
}

/// Generate the rename changesets of a run.
pub fn generate_renames(ctx: &GenerationContext<'_>) -> Vec<Changeset> {
    let changesets = rename::generate(ctx);
    if ctx.debug {
        changesets.into_iter().map(Changeset::annotated).collect()
    } else {
        changesets
    }
}
