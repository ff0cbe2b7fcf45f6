//! Typed schema changes.
//!
//! Raw diff paths are classified into [`SchemaChange`], a closed set of
//! shapes. A path that matches no shape is a hard error: the differ and the
//! generators must agree on the tree layout.

use std::collections::BTreeMap;

use pgshift_schema::EntryKind;

use crate::diff::{DiffKind, RawDiff};
use crate::error::{MigrateResult, MigrationError};

/// Column attribute compared by the differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ColumnAttribute {
    /// `dataType`.
    DataType,
    /// `isNullable`.
    Nullable,
    /// `defaultValue`.
    Default,
    /// `identity`.
    Identity,
}

impl ColumnAttribute {
    fn from_tree_key(key: &str) -> Option<Self> {
        match key {
            "dataType" => Some(Self::DataType),
            "isNullable" => Some(Self::Nullable),
            "defaultValue" => Some(Self::Default),
            "identity" => Some(Self::Identity),
            _ => None,
        }
    }
}

/// A classified difference.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum SchemaChange {
    CreateExtension {
        name: String,
    },
    DropExtension {
        name: String,
    },
    CreateSchema {
        schema: String,
    },
    DropSchema {
        schema: String,
    },
    CreateTable {
        schema: String,
        table: String,
    },
    DropTable {
        schema: String,
        table: String,
    },
    CreateColumn {
        schema: String,
        table: String,
        column: String,
    },
    DropColumn {
        schema: String,
        table: String,
        column: String,
    },
    ChangeColumn {
        schema: String,
        table: String,
        column: String,
        attribute: ColumnAttribute,
    },
    CreateEntry {
        schema: String,
        kind: EntryKind,
        table: String,
        key: String,
    },
    DropEntry {
        schema: String,
        kind: EntryKind,
        table: String,
        key: String,
    },
    ChangeEntry {
        schema: String,
        kind: EntryKind,
        table: String,
        key: String,
    },
    /// A primary key dropped and created on the same table.
    ReplacePrimaryKey {
        schema: String,
        table: String,
        old_key: String,
        new_key: String,
    },
    CreateEnum {
        schema: String,
        name: String,
    },
    DropEnum {
        schema: String,
        name: String,
    },
    ChangeEnum {
        schema: String,
        name: String,
    },
}

/// Classify one raw diff entry.
pub fn classify(raw: &RawDiff) -> MigrateResult<Vec<SchemaChange>> {
    use DiffKind::*;

    let s = |i: usize| raw.path[i].clone();
    let unrecognized = || MigrationError::unrecognized(&raw.path);

    let change = match (raw.kind, raw.segments().as_slice()) {
        (Create, ["extensions", _]) => SchemaChange::CreateExtension { name: s(1) },
        (Remove, ["extensions", _]) => SchemaChange::DropExtension { name: s(1) },
        (Create, ["schemas", _]) => SchemaChange::CreateSchema { schema: s(1) },
        (Remove, ["schemas", _]) => SchemaChange::DropSchema { schema: s(1) },

        (Create, ["schema", _, "tables", _]) => SchemaChange::CreateTable {
            schema: s(1),
            table: s(3),
        },
        (Remove, ["schema", _, "tables", _]) => SchemaChange::DropTable {
            schema: s(1),
            table: s(3),
        },
        (Create, ["schema", _, "tables", _, "columns", _]) => SchemaChange::CreateColumn {
            schema: s(1),
            table: s(3),
            column: s(5),
        },
        (Remove, ["schema", _, "tables", _, "columns", _]) => SchemaChange::DropColumn {
            schema: s(1),
            table: s(3),
            column: s(5),
        },
        (Change, ["schema", _, "tables", _, "columns", _, attribute]) => {
            let attribute = ColumnAttribute::from_tree_key(attribute).ok_or_else(unrecognized)?;
            SchemaChange::ChangeColumn {
                schema: s(1),
                table: s(3),
                column: s(5),
                attribute,
            }
        }

        (Create, ["schema", _, "enums", _]) => SchemaChange::CreateEnum {
            schema: s(1),
            name: s(3),
        },
        (Remove, ["schema", _, "enums", _]) => SchemaChange::DropEnum {
            schema: s(1),
            name: s(3),
        },
        (Change, ["schema", _, "enums", _]) => SchemaChange::ChangeEnum {
            schema: s(1),
            name: s(3),
        },

        // A whole table's worth of entries appeared or disappeared.
        (Create | Remove, ["schema", _, kind, _]) => {
            let kind = EntryKind::from_tree_key(kind).ok_or_else(unrecognized)?;
            let node = match raw.kind {
                Create => raw.value.as_ref(),
                _ => raw.old_value.as_ref(),
            }
            .ok_or_else(unrecognized)?;
            return Ok(node
                .children()
                .map(|(key, _)| entry(raw.kind, s(1), kind, s(3), key.clone()))
                .collect());
        }
        (kind_of_diff, ["schema", _, kind, _, _]) => {
            let kind = EntryKind::from_tree_key(kind).ok_or_else(unrecognized)?;
            entry(kind_of_diff, s(1), kind, s(3), s(4))
        }

        _ => return Err(unrecognized()),
    };

    Ok(vec![change])
}

fn entry(diff: DiffKind, schema: String, kind: EntryKind, table: String, key: String) -> SchemaChange {
    match diff {
        DiffKind::Create => SchemaChange::CreateEntry {
            schema,
            kind,
            table,
            key,
        },
        DiffKind::Remove => SchemaChange::DropEntry {
            schema,
            kind,
            table,
            key,
        },
        DiffKind::Change => SchemaChange::ChangeEntry {
            schema,
            kind,
            table,
            key,
        },
    }
}

/// Classify every raw diff entry.
pub fn classify_all(raw: &[RawDiff]) -> MigrateResult<Vec<SchemaChange>> {
    let mut changes = Vec::new();
    for diff in raw {
        changes.extend(classify(diff)?);
    }
    Ok(changes)
}

/// Merge a dropped and a created primary key on one table into a replacement.
///
/// Tables that are themselves created or dropped are left alone; their keys
/// go with the table.
pub fn coalesce_primary_keys(
    changes: Vec<SchemaChange>,
    is_surviving: impl Fn(&str, &str) -> bool,
) -> Vec<SchemaChange> {
    let mut created: BTreeMap<(String, String), String> = BTreeMap::new();
    let mut dropped: BTreeMap<(String, String), String> = BTreeMap::new();

    for change in &changes {
        match change {
            SchemaChange::CreateEntry {
                schema,
                kind: EntryKind::PrimaryKey,
                table,
                key,
            } if is_surviving(schema, table) => {
                created.insert((schema.clone(), table.clone()), key.clone());
            }
            SchemaChange::DropEntry {
                schema,
                kind: EntryKind::PrimaryKey,
                table,
                key,
            } if is_surviving(schema, table) => {
                dropped.insert((schema.clone(), table.clone()), key.clone());
            }
            _ => {}
        }
    }

    let mut out = Vec::with_capacity(changes.len());
    for change in changes {
        // Some(Some(r)): replace; Some(None): drop; None: keep
        let replacement = match &change {
            SchemaChange::CreateEntry {
                schema,
                kind: EntryKind::PrimaryKey,
                table,
                key,
            } => {
                let id = (schema.clone(), table.clone());
                match (dropped.get(&id), created.contains_key(&id)) {
                    (Some(old_key), true) => Some(Some(SchemaChange::ReplacePrimaryKey {
                        schema: schema.clone(),
                        table: table.clone(),
                        old_key: old_key.clone(),
                        new_key: key.clone(),
                    })),
                    _ => None,
                }
            }
            SchemaChange::DropEntry {
                schema,
                kind: EntryKind::PrimaryKey,
                table,
                ..
            } => {
                let id = (schema.clone(), table.clone());
                (created.contains_key(&id) && dropped.contains_key(&id)).then_some(None)
            }
            _ => None,
        };

        match replacement {
            Some(Some(merged)) => out.push(merged),
            Some(None) => {}
            None => out.push(change),
        }
    }
    out
}
