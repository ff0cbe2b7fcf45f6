//! Table generators.

use crate::changeset::{Changeset, ChangesetType, Warning, WarningCode};
use crate::error::MigrateResult;
use crate::generators::GenerationContext;
use crate::generators::sql;

/// Create a table with every column inline.
pub fn create(ctx: &GenerationContext<'_>, schema: &str, table: &str) -> MigrateResult<Changeset> {
    let info = ctx.local_table(schema, table)?;
    Ok(Changeset::new(ChangesetType::CreateTable, schema)
        .table(table)
        .up(sql::create_table(schema, table, info))
        .up_all(sql::default_comments(schema, table, info))
        .down(sql::drop_table(schema, table)))
}

/// Drop a table; `down` recreates it in its current shape.
pub fn drop(ctx: &GenerationContext<'_>, schema: &str, table: &str) -> MigrateResult<Changeset> {
    let info = ctx.remote_table(schema, table)?;
    Ok(Changeset::new(ChangesetType::DropTable, schema)
        .table(table)
        .current_table(ctx.renames.current_table_name(schema, table))
        .up(sql::drop_table(schema, table))
        .down(sql::create_table(schema, table, info))
        .down_all(sql::default_comments(schema, table, info))
        .warn(Warning::new(WarningCode::D002, schema).table(table)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rename::RenameMap;
    use pgshift_schema::{ColumnInfo, DatabaseInfo, Identity, SchemaInfo, TableInfo};
    use pretty_assertions::assert_eq;

    fn books() -> DatabaseInfo {
        DatabaseInfo::new().with_schema(SchemaInfo::new("app").with_table(
            "books",
            TableInfo::new()
                .with_column(
                    "id",
                    ColumnInfo::new("bigint").identity(Identity::Always).not_null(),
                )
                .with_column("title", ColumnInfo::new("text").not_null().default_sql("''")),
        ))
    }

    #[test]
    fn test_create_and_drop_are_inverse() {
        let model = books();
        let empty = DatabaseInfo::new();
        let renames = RenameMap::new();

        let created = create(&GenerationContext::new(&model, &empty, &renames, false), "app", "books").unwrap();
        let dropped = drop(&GenerationContext::new(&empty, &model, &renames, false), "app", "books").unwrap();

        assert_eq!(created.up, dropped.down);
        assert_eq!(created.down, dropped.up);
        assert_eq!(
            created.up[0],
            "CREATE TABLE \"app\".\"books\" (\n    \"id\" bigint GENERATED ALWAYS AS IDENTITY NOT NULL,\n    \"title\" text DEFAULT '' NOT NULL\n)"
        );
        assert!(created.up[1].starts_with("COMMENT ON COLUMN \"app\".\"books\".\"title\" IS '"));
        assert_eq!(dropped.warnings[0].code, WarningCode::D002);
    }
}
