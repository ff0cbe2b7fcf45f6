//! Column add and drop generators.

use pgshift_schema::naming::quote_ident;

use crate::changeset::{Changeset, ChangesetType, Warning, WarningCode};
use crate::error::MigrateResult;
use crate::generators::GenerationContext;
use crate::generators::sql;

/// Add a column to an existing table.
pub fn create(
    ctx: &GenerationContext<'_>,
    schema: &str,
    table: &str,
    column: &str,
) -> MigrateResult<Changeset> {
    let info = ctx.local_column(schema, table, column)?;

    let mut changeset = Changeset::new(ChangesetType::CreateColumn, schema)
        .table(table)
        .up(sql::alter_table(
            schema,
            table,
            format!("ADD COLUMN {}", sql::column_definition(schema, column, info)),
        ));
    if let Some(default) = &info.default_value {
        changeset = changeset.up(sql::column_comment(schema, table, column, Some(&default.hash)));
    }
    changeset = changeset.down(sql::alter_table(
        schema,
        table,
        format!("DROP COLUMN {}", quote_ident(column)),
    ));

    if !info.is_nullable && info.default_value.is_none() && info.identity.is_none() {
        changeset = changeset.warn(Warning::new(WarningCode::MF004, schema).table(table).column(column));
    }
    Ok(changeset)
}

/// Drop a column from a surviving table.
pub fn drop(
    ctx: &GenerationContext<'_>,
    schema: &str,
    table: &str,
    column: &str,
) -> MigrateResult<Changeset> {
    let info = ctx.remote_column(schema, table, column)?;

    let mut changeset = Changeset::new(ChangesetType::DropColumn, schema)
        .table(table)
        .current_table(ctx.renames.current_table_name(schema, table))
        .up(sql::alter_table(
            schema,
            table,
            format!("DROP COLUMN {}", quote_ident(column)),
        ))
        .down(sql::alter_table(
            schema,
            table,
            format!("ADD COLUMN {}", sql::column_definition(schema, column, info)),
        ));
    if let Some(default) = &info.default_value {
        changeset = changeset.down(sql::column_comment(schema, table, column, Some(&default.hash)));
    }
    Ok(changeset.warn(Warning::new(WarningCode::D003, schema).table(table).column(column)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rename::RenameMap;
    use pgshift_schema::{ColumnInfo, DatabaseInfo, SchemaInfo, TableInfo};
    use pretty_assertions::assert_eq;

    fn model(extra: Option<ColumnInfo>) -> DatabaseInfo {
        let mut table = TableInfo::new().with_column("id", ColumnInfo::new("integer").not_null());
        if let Some(column) = extra {
            table = table.with_column("age", column);
        }
        DatabaseInfo::new().with_schema(SchemaInfo::new("app").with_table("users", table))
    }

    #[test]
    fn test_add_not_null_without_default_warns() {
        let local = model(Some(ColumnInfo::new("integer").not_null()));
        let remote = model(None);
        let renames = RenameMap::new();
        let ctx = GenerationContext::new(&local, &remote, &renames, false);

        let changeset = create(&ctx, "app", "users", "age").unwrap();
        assert_eq!(
            changeset.up,
            vec!["ALTER TABLE \"app\".\"users\" ADD COLUMN \"age\" integer NOT NULL".to_string()]
        );
        assert_eq!(changeset.warnings[0].code, WarningCode::MF004);
    }

    #[test]
    fn test_add_and_drop_are_inverse() {
        let with = model(Some(ColumnInfo::new("integer").default_sql("0")));
        let without = model(None);
        let renames = RenameMap::new();

        let added = create(&GenerationContext::new(&with, &without, &renames, false), "app", "users", "age").unwrap();
        let dropped = drop(&GenerationContext::new(&without, &with, &renames, false), "app", "users", "age").unwrap();

        assert!(added.warnings.is_empty());
        assert_eq!(added.up, dropped.down);
        assert_eq!(added.down, dropped.up);
        assert_eq!(dropped.warnings[0].code, WarningCode::D003);
    }
}
