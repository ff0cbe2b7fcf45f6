//! Index generators.
//!
//! Indexes on tables that already hold data are built concurrently, which
//! cannot run inside a transaction.

use pgshift_schema::{EntryKind, ObjectKind};

use crate::changeset::{Changeset, ChangesetType};
use crate::error::MigrateResult;
use crate::generators::GenerationContext;
use crate::generators::sql;

/// Create an index.
pub fn create(ctx: &GenerationContext<'_>, schema: &str, table: &str, key: &str) -> MigrateResult<Changeset> {
    let statement = ctx.local_entry(schema, EntryKind::Index, table, key)?;
    let name = sql::entry_name(table, key, ObjectKind::Index);
    let changeset = Changeset::new(ChangesetType::CreateIndex, schema).table(table);

    Ok(if ctx.is_added(schema, table) {
        changeset
            .up(statement)
            .down(sql::drop_index(schema, &name, false))
    } else {
        changeset
            .up(sql::concurrently(statement))
            .down(sql::drop_index(schema, &name, true))
            .non_transactional()
    })
}

/// Drop an index.
pub fn drop(ctx: &GenerationContext<'_>, schema: &str, table: &str, key: &str) -> MigrateResult<Changeset> {
    let statement = ctx.remote_entry(schema, EntryKind::Index, table, key)?;
    let name = sql::entry_name(table, key, ObjectKind::Index);
    let changeset = Changeset::new(ChangesetType::DropIndex, schema)
        .table(table)
        .current_table(ctx.renames.current_table_name(schema, table));

    Ok(if ctx.is_dropped(schema, table) {
        // goes away with the table
        changeset.down(statement)
    } else {
        changeset
            .up(sql::drop_index(schema, &name, true))
            .down(sql::concurrently(statement))
            .non_transactional()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rename::RenameMap;
    use pgshift_schema::{ColumnInfo, DatabaseInfo, SchemaInfo, TableInfo};
    use pretty_assertions::assert_eq;

    const KEY: &str = "abcdef01";
    const STATEMENT: &str =
        "CREATE INDEX \"books_abcdef01_pgshift_idx\" ON \"app\".\"books\" USING btree (\"title\")";

    fn books(with_index: bool) -> DatabaseInfo {
        let mut schema = SchemaInfo::new("app").with_table(
            "books",
            TableInfo::new().with_column("title", ColumnInfo::new("text")),
        );
        if with_index {
            schema = schema.with_entry(EntryKind::Index, "books", KEY, STATEMENT);
        }
        DatabaseInfo::new().with_schema(schema)
    }

    #[test]
    fn test_existing_table_builds_concurrently() {
        let local = books(true);
        let remote = books(false);
        let renames = RenameMap::new();
        let ctx = GenerationContext::new(&local, &remote, &renames, false);

        let changeset = create(&ctx, "app", "books", KEY).unwrap();
        assert!(!changeset.transaction);
        assert_eq!(
            changeset.up,
            vec![
                "CREATE INDEX CONCURRENTLY \"books_abcdef01_pgshift_idx\" ON \"app\".\"books\" USING btree (\"title\")"
                    .to_string()
            ]
        );
        assert_eq!(
            changeset.down,
            vec!["DROP INDEX CONCURRENTLY \"app\".\"books_abcdef01_pgshift_idx\"".to_string()]
        );

        let inverse = drop(&GenerationContext::new(&remote, &local, &renames, false), "app", "books", KEY).unwrap();
        assert_eq!(inverse.up, changeset.down);
        assert_eq!(inverse.down, changeset.up);
    }

    #[test]
    fn test_new_table_builds_inline() {
        let local = books(true);
        let remote = DatabaseInfo::new();
        let renames = RenameMap::new();
        let ctx = GenerationContext::new(&local, &remote, &renames, false);

        let changeset = create(&ctx, "app", "books", KEY).unwrap();
        assert!(changeset.transaction);
        assert_eq!(changeset.up, vec![STATEMENT.to_string()]);
    }
}
