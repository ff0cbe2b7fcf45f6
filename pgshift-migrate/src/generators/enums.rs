//! Enum type generators.
//!
//! Postgres can append values to an enum but cannot remove or reorder them.
//! Anything other than an append rebuilds the type: the old type is renamed
//! away, the new one created, dependent columns re-pointed through `text`
//! and the old type dropped.

use std::collections::BTreeSet;

use pgshift_schema::naming::{qualified, quote_ident, quote_literal};

use crate::changeset::{Changeset, ChangesetType, Warning, WarningCode};
use crate::error::{MigrateResult, MigrationError};
use crate::generators::GenerationContext;
use crate::generators::sql;

fn values_of(schema: &str, name: &str, values: Option<Vec<String>>) -> MigrateResult<Vec<String>> {
    values.ok_or_else(|| MigrationError::other(format!("enum '{}.{}' is missing from the model", schema, name)))
}

fn create_type(schema: &str, name: &str, values: &[String]) -> String {
    let values: Vec<String> = values.iter().map(|v| quote_literal(v)).collect();
    format!("CREATE TYPE {} AS ENUM ({})", qualified(schema, name), values.join(", "))
}

fn drop_type(schema: &str, name: &str) -> String {
    format!("DROP TYPE {}", qualified(schema, name))
}

/// Create an enum type.
pub fn create(ctx: &GenerationContext<'_>, schema: &str, name: &str) -> MigrateResult<Changeset> {
    let values = values_of(schema, name, ctx.local_schema(schema)?.enum_values(name))?;
    Ok(Changeset::new(ChangesetType::CreateEnum, schema)
        .up(create_type(schema, name, &values))
        .down(drop_type(schema, name)))
}

/// Drop an enum type.
pub fn drop(ctx: &GenerationContext<'_>, schema: &str, name: &str) -> MigrateResult<Changeset> {
    let values = values_of(schema, name, ctx.remote_schema(schema)?.enum_values(name))?;
    Ok(Changeset::new(ChangesetType::DropEnum, schema)
        .up(drop_type(schema, name))
        .down(create_type(schema, name, &values)))
}

/// Change the values of an enum type.
pub fn change(ctx: &GenerationContext<'_>, schema: &str, name: &str) -> MigrateResult<Changeset> {
    let local = values_of(schema, name, ctx.local_schema(schema)?.enum_values(name))?;
    let remote = values_of(schema, name, ctx.remote_schema(schema)?.enum_values(name))?;
    let columns = dependent_columns(ctx, schema, name);

    if local.len() > remote.len() && local.starts_with(&remote) {
        let additions = local[remote.len()..].iter().map(|value| {
            format!(
                "ALTER TYPE {} ADD VALUE {}",
                qualified(schema, name),
                quote_literal(value)
            )
        });
        return Ok(Changeset::new(ChangesetType::AddEnumValue, schema)
            .up_all(additions)
            .down_all(rebuild(schema, name, &remote, &columns))
            .non_transactional());
    }

    Ok(Changeset::new(ChangesetType::ChangeEnum, schema)
        .up_all(rebuild(schema, name, &local, &columns))
        .down_all(rebuild(schema, name, &remote, &columns))
        .warn(Warning::new(WarningCode::B002, schema)))
}

/// Columns typed by the enum while the alter phase runs: every target
/// column, plus current columns that are only dropped later.
fn dependent_columns(ctx: &GenerationContext<'_>, schema: &str, name: &str) -> BTreeSet<(String, String)> {
    let mut columns = BTreeSet::new();
    let uses_enum = |column: &pgshift_schema::ColumnInfo| column.is_enum && column.data_type == name;

    if let Some(local) = ctx.local.schema(schema) {
        for (table, info) in &local.tables {
            for (column, _) in info.columns.iter().filter(|(_, c)| uses_enum(c)) {
                columns.insert((table.clone(), column.clone()));
            }
        }
    }
    if let Some(remote) = ctx.remote.schema(schema) {
        for (table, info) in &remote.tables {
            for (column, _) in info.columns.iter().filter(|(_, c)| uses_enum(c)) {
                if ctx.local.column(schema, table, column).is_none() {
                    columns.insert((table.clone(), column.clone()));
                }
            }
        }
    }
    columns
}

fn rebuild(schema: &str, name: &str, values: &[String], columns: &BTreeSet<(String, String)>) -> Vec<String> {
    let old = sql::identifier(format!("{}_pgshift_old", name));
    let target = qualified(schema, name);

    let mut statements = vec![
        format!("ALTER TYPE {} RENAME TO {}", target, quote_ident(&old)),
        create_type(schema, name, values),
    ];
    statements.extend(columns.iter().map(|(table, column)| {
        sql::alter_column(
            schema,
            table,
            column,
            format!("TYPE {} USING {}::text::{}", target, quote_ident(column), target),
        )
    }));
    statements.push(drop_type(schema, &old));
    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rename::RenameMap;
    use pgshift_schema::{ColumnInfo, DatabaseInfo, SchemaInfo, TableInfo};
    use pretty_assertions::assert_eq;

    fn model(values: &[&str]) -> DatabaseInfo {
        DatabaseInfo::new().with_schema(
            SchemaInfo::new("app")
                .with_enum("mood", values)
                .with_table("people", TableInfo::new().with_column("mood", ColumnInfo::enumeration("mood"))),
        )
    }

    #[test]
    fn test_create_and_drop() {
        let local = model(&["sad", "happy"]);
        let remote = DatabaseInfo::new();
        let renames = RenameMap::new();
        let ctx = GenerationContext::new(&local, &remote, &renames, false);

        let changeset = create(&ctx, "app", "mood").unwrap();
        assert_eq!(
            changeset.up,
            vec!["CREATE TYPE \"app\".\"mood\" AS ENUM ('sad', 'happy')".to_string()]
        );
        assert_eq!(changeset.down, vec!["DROP TYPE \"app\".\"mood\"".to_string()]);

        let inverse = drop(&GenerationContext::new(&remote, &local, &renames, false), "app", "mood").unwrap();
        assert_eq!(inverse.up, changeset.down);
        assert_eq!(inverse.down, changeset.up);
    }

    #[test]
    fn test_append_adds_values() {
        let local = model(&["sad", "happy", "ok"]);
        let remote = model(&["sad", "happy"]);
        let renames = RenameMap::new();
        let ctx = GenerationContext::new(&local, &remote, &renames, false);

        let changeset = change(&ctx, "app", "mood").unwrap();
        assert_eq!(changeset.changeset_type, ChangesetType::AddEnumValue);
        assert!(!changeset.transaction);
        assert_eq!(
            changeset.up,
            vec!["ALTER TYPE \"app\".\"mood\" ADD VALUE 'ok'".to_string()]
        );
        assert!(changeset.warnings.is_empty());
    }

    #[test]
    fn test_removal_rebuilds() {
        let local = model(&["happy"]);
        let remote = model(&["sad", "happy"]);
        let renames = RenameMap::new();
        let ctx = GenerationContext::new(&local, &remote, &renames, false);

        let changeset = change(&ctx, "app", "mood").unwrap();
        assert_eq!(changeset.changeset_type, ChangesetType::ChangeEnum);
        assert_eq!(
            changeset.up,
            vec![
                "ALTER TYPE \"app\".\"mood\" RENAME TO \"mood_pgshift_old\"".to_string(),
                "CREATE TYPE \"app\".\"mood\" AS ENUM ('happy')".to_string(),
                "ALTER TABLE \"app\".\"people\" ALTER COLUMN \"mood\" TYPE \"app\".\"mood\" USING \"mood\"::text::\"app\".\"mood\""
                    .to_string(),
                "DROP TYPE \"app\".\"mood_pgshift_old\"".to_string(),
            ]
        );
        assert_eq!(changeset.warnings[0].code, WarningCode::B002);
    }
}
