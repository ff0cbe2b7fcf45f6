//! Rename changesets.
//!
//! Managed constraint and index names embed the table name and a hash of
//! the definition, so renaming a table or column also renames every managed
//! object that depends on it. Managed triggers get their hash comment
//! updated instead. External objects keep their names.

use pgshift_schema::ObjectKind;
use pgshift_schema::naming::{qualified, quote_ident, quote_literal};

use crate::changeset::{Changeset, ChangesetType, Warning, WarningCode};
use crate::generators::GenerationContext;
use crate::generators::sql;
use crate::rename::{ObjectChange, ObjectRename, TableRename};

/// Changesets for every confirmed rename.
pub fn generate(ctx: &GenerationContext<'_>) -> Vec<Changeset> {
    let mut changesets: Vec<Changeset> = ctx
        .renames
        .tables
        .iter()
        .map(|rename| table_rename(ctx, rename))
        .collect();

    for (key, renames) in &ctx.renames.columns {
        let Some((schema, table)) = key.split_once('.') else {
            continue;
        };
        // a renamed table carries its objects in the table rename
        let table_renamed = ctx.renames.current_table_name(schema, table) != table;
        let mut hosted = if table_renamed {
            (Vec::new(), Vec::new())
        } else {
            object_statements(ctx, schema, table)
        };

        for rename in renames {
            let action = |from: &str, to: &str| {
                sql::alter_table(
                    schema,
                    table,
                    format!("RENAME COLUMN {} TO {}", quote_ident(from), quote_ident(to)),
                )
            };
            let (up, down) = std::mem::take(&mut hosted);
            changesets.push(
                Changeset::new(ChangesetType::RenameColumn, schema)
                    .table(table)
                    .up(action(&rename.from, &rename.to))
                    .up_all(up)
                    .down_all(down)
                    .down(action(&rename.to, &rename.from))
                    .warn(
                        Warning::new(WarningCode::BI002, schema)
                            .table(table)
                            .column(rename.to.clone()),
                    ),
            );
        }
    }

    changesets
}

fn table_rename(ctx: &GenerationContext<'_>, rename: &TableRename) -> Changeset {
    let schema = rename.schema.as_str();
    let (objects_up, objects_down) = object_statements(ctx, schema, &rename.to);

    let mut up = vec![sql::alter_table(
        schema,
        &rename.from,
        format!("RENAME TO {}", quote_ident(&rename.to)),
    )];
    up.extend(objects_up);
    let mut down = objects_down;
    down.push(sql::alter_table(
        schema,
        &rename.to,
        format!("RENAME TO {}", quote_ident(&rename.from)),
    ));

    Changeset::new(ChangesetType::RenameTable, schema)
        .table(rename.to.clone())
        .current_table(rename.from.clone())
        .up_all(up)
        .down_all(down)
        .warn(Warning::new(WarningCode::BI001, schema).table(rename.to.clone()))
}

/// Statements for the objects hosted by a renamed table, with `down`
/// already reversed.
fn object_statements(ctx: &GenerationContext<'_>, schema: &str, table: &str) -> (Vec<String>, Vec<String>) {
    let mut up = Vec::new();
    let mut down = Vec::new();
    for object in ctx
        .objects
        .iter()
        .filter(|o| o.host.0 == schema && o.host.1 == table)
    {
        let (forward, backward) = object_statement(object);
        up.push(forward);
        down.push(backward);
    }
    down.reverse();
    (up, down)
}

fn object_statement(object: &ObjectRename) -> (String, String) {
    let (schema, table) = (object.schema.as_str(), object.table.as_str());
    match &object.change {
        ObjectChange::Rename { kind, from, to } => (
            rename_object(schema, table, *kind, from, to),
            rename_object(schema, table, *kind, to, from),
        ),
        ObjectChange::Rehash { name, from, to } => {
            let comment = |hash: &str| {
                format!(
                    "COMMENT ON TRIGGER {} ON {} IS {}",
                    quote_ident(name),
                    qualified(schema, table),
                    quote_literal(hash)
                )
            };
            (comment(to), comment(from))
        }
    }
}

fn rename_object(schema: &str, table: &str, kind: ObjectKind, from: &str, to: &str) -> String {
    match kind {
        ObjectKind::Index => format!(
            "ALTER INDEX {} RENAME TO {}",
            qualified(schema, from),
            quote_ident(to)
        ),
        _ => sql::alter_table(
            schema,
            table,
            format!("RENAME CONSTRAINT {} TO {}", quote_ident(from), quote_ident(to)),
        ),
    }
}
