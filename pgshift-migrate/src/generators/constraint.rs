//! Primary key, unique, foreign key and check constraints.
//!
//! Entries are keyed by content hash, so a changed definition arrives here as
//! a drop of the old key plus a create of the new one. The SQL name of each
//! constraint is derived from the table and the key.

use pgshift_schema::{EntryKind, ObjectKind};

use crate::changeset::{Changeset, ChangesetType, Warning, WarningCode};
use crate::error::{MigrateResult, MigrationError};
use crate::generators::GenerationContext;
use crate::generators::sql;

fn object_kind(kind: EntryKind) -> MigrateResult<ObjectKind> {
    match kind.object_kind() {
        Some(object) if object != ObjectKind::Index => Ok(object),
        _ => Err(MigrationError::other(format!(
            "'{}' entries are not constraints",
            kind.tree_key()
        ))),
    }
}

fn create_type(kind: ObjectKind) -> ChangesetType {
    match kind {
        ObjectKind::PrimaryKey => ChangesetType::CreatePrimaryKey,
        ObjectKind::Unique => ChangesetType::CreateUniqueConstraint,
        ObjectKind::ForeignKey => ChangesetType::CreateForeignKeyConstraint,
        ObjectKind::Check | ObjectKind::Index => ChangesetType::CreateCheckConstraint,
    }
}

fn drop_type(kind: ObjectKind) -> ChangesetType {
    match kind {
        ObjectKind::PrimaryKey => ChangesetType::DropPrimaryKey,
        ObjectKind::Unique => ChangesetType::DropUniqueConstraint,
        ObjectKind::ForeignKey => ChangesetType::DropForeignKeyConstraint,
        ObjectKind::Check | ObjectKind::Index => ChangesetType::DropCheckConstraint,
    }
}

/// Add a constraint.
pub fn create(
    ctx: &GenerationContext<'_>,
    schema: &str,
    kind: EntryKind,
    table: &str,
    key: &str,
) -> MigrateResult<Changeset> {
    let object = object_kind(kind)?;
    let definition = ctx.local_entry(schema, kind, table, key)?;
    let name = sql::entry_name(table, key, object);
    let changeset = Changeset::new(create_type(object), schema).table(table);

    if ctx.is_added(schema, table) {
        // The table is empty, nothing to validate against.
        let changeset = changeset.up(sql::add_constraint(schema, table, &name, definition));
        return Ok(match object {
            ObjectKind::ForeignKey => changeset.down(sql::drop_constraint(schema, table, &name)),
            _ => changeset,
        });
    }

    let changeset = match object {
        ObjectKind::ForeignKey | ObjectKind::Check => changeset
            .up(sql::add_constraint_not_valid(schema, table, &name, definition))
            .up(sql::validate_constraint(schema, table, &name)),
        ObjectKind::PrimaryKey => changeset
            .up(sql::add_constraint(schema, table, &name, definition))
            .warn(Warning::new(WarningCode::MF003, schema).table(table)),
        ObjectKind::Unique | ObjectKind::Index => changeset
            .up(sql::add_constraint(schema, table, &name, definition))
            .warn(Warning::new(WarningCode::MF002, schema).table(table)),
    };
    Ok(changeset.down(sql::drop_constraint(schema, table, &name)))
}

/// Drop a constraint.
pub fn drop(
    ctx: &GenerationContext<'_>,
    schema: &str,
    kind: EntryKind,
    table: &str,
    key: &str,
) -> MigrateResult<Changeset> {
    let object = object_kind(kind)?;
    let definition = ctx.remote_entry(schema, kind, table, key)?;
    let name = sql::entry_name(table, key, object);
    let changeset = Changeset::new(drop_type(object), schema)
        .table(table)
        .current_table(ctx.renames.current_table_name(schema, table));

    let explicit = match object {
        ObjectKind::PrimaryKey | ObjectKind::ForeignKey => true,
        _ => !ctx.is_dropped(schema, table),
    };
    let changeset = if explicit {
        changeset.up(sql::drop_constraint(schema, table, &name))
    } else {
        changeset
    };
    Ok(changeset.down(sql::add_constraint(schema, table, &name, definition)))
}

/// Swap the primary key of a surviving table in one step.
pub fn replace_primary_key(
    ctx: &GenerationContext<'_>,
    schema: &str,
    table: &str,
    old_key: &str,
    new_key: &str,
) -> MigrateResult<Changeset> {
    let old_definition = ctx.remote_entry(schema, EntryKind::PrimaryKey, table, old_key)?;
    let new_definition = ctx.local_entry(schema, EntryKind::PrimaryKey, table, new_key)?;
    let old_name = sql::entry_name(table, old_key, ObjectKind::PrimaryKey);
    let new_name = sql::entry_name(table, new_key, ObjectKind::PrimaryKey);

    Ok(Changeset::new(ChangesetType::ChangePrimaryKey, schema)
        .table(table)
        .up(sql::drop_constraint(schema, table, &old_name))
        .up(sql::add_constraint(schema, table, &new_name, new_definition))
        .down(sql::drop_constraint(schema, table, &new_name))
        .down(sql::add_constraint(schema, table, &old_name, old_definition))
        .warn(Warning::new(WarningCode::MF003, schema).table(table)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rename::RenameMap;
    use pgshift_schema::{ColumnInfo, DatabaseInfo, SchemaInfo, TableInfo};
    use pretty_assertions::assert_eq;

    const FK_KEY: &str = "0badf00d";
    const FK: &str = "FOREIGN KEY (\"user_id\") REFERENCES \"app\".\"users\" (\"id\") ON DELETE NO ACTION ON UPDATE NO ACTION";

    fn books(with_fk: bool) -> DatabaseInfo {
        let mut schema = SchemaInfo::new("app").with_table(
            "books",
            TableInfo::new().with_column("user_id", ColumnInfo::new("integer")),
        );
        if with_fk {
            schema = schema.with_entry(EntryKind::ForeignKey, "books", FK_KEY, FK);
        }
        DatabaseInfo::new().with_schema(schema)
    }

    #[test]
    fn test_foreign_key_on_existing_table_is_validated_separately() {
        let local = books(true);
        let remote = books(false);
        let renames = RenameMap::new();
        let ctx = GenerationContext::new(&local, &remote, &renames, false);

        let changeset = create(&ctx, "app", EntryKind::ForeignKey, "books", FK_KEY).unwrap();
        let name = "books_0badf00d_pgshift_fk";
        assert_eq!(changeset.changeset_type, ChangesetType::CreateForeignKeyConstraint);
        assert_eq!(
            changeset.up,
            vec![
                format!("ALTER TABLE \"app\".\"books\" ADD CONSTRAINT \"{}\" {} NOT VALID", name, FK),
                format!("ALTER TABLE \"app\".\"books\" VALIDATE CONSTRAINT \"{}\"", name),
            ]
        );
        assert_eq!(
            changeset.down,
            vec![format!("ALTER TABLE \"app\".\"books\" DROP CONSTRAINT \"{}\"", name)]
        );
    }

    #[test]
    fn test_foreign_key_on_new_table_is_direct() {
        let local = books(true);
        let remote = DatabaseInfo::new();
        let renames = RenameMap::new();
        let ctx = GenerationContext::new(&local, &remote, &renames, false);

        let changeset = create(&ctx, "app", EntryKind::ForeignKey, "books", FK_KEY).unwrap();
        assert_eq!(changeset.up.len(), 1);
        assert!(!changeset.up[0].ends_with("NOT VALID"));
        assert_eq!(changeset.down.len(), 1);
    }

    #[test]
    fn test_unique_drop_on_dropped_table_only_restores() {
        let remote = DatabaseInfo::new().with_schema(
            SchemaInfo::new("app")
                .with_table("tags", TableInfo::new().with_column("name", ColumnInfo::new("text")))
                .with_entry(EntryKind::Unique, "tags", "12345678", "UNIQUE (\"name\")"),
        );
        let local = DatabaseInfo::new();
        let renames = RenameMap::new();
        let ctx = GenerationContext::new(&local, &remote, &renames, false);

        let changeset = drop(&ctx, "app", EntryKind::Unique, "tags", "12345678").unwrap();
        assert!(changeset.up.is_empty());
        assert_eq!(
            changeset.down,
            vec![
                "ALTER TABLE \"app\".\"tags\" ADD CONSTRAINT \"tags_12345678_pgshift_key\" UNIQUE (\"name\")"
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_replace_primary_key() {
        let table = TableInfo::new()
            .with_column("id", ColumnInfo::new("integer").not_null())
            .with_column("code", ColumnInfo::new("text").not_null());
        let local = DatabaseInfo::new().with_schema(
            SchemaInfo::new("app")
                .with_table("t", table.clone())
                .with_entry(EntryKind::PrimaryKey, "t", "bbbbbbbb", "PRIMARY KEY (\"code\")"),
        );
        let remote = DatabaseInfo::new().with_schema(
            SchemaInfo::new("app")
                .with_table("t", table)
                .with_entry(EntryKind::PrimaryKey, "t", "aaaaaaaa", "PRIMARY KEY (\"id\")"),
        );
        let renames = RenameMap::new();
        let ctx = GenerationContext::new(&local, &remote, &renames, false);

        let changeset = replace_primary_key(&ctx, "app", "t", "aaaaaaaa", "bbbbbbbb").unwrap();
        assert_eq!(changeset.changeset_type, ChangesetType::ChangePrimaryKey);
        assert!(changeset.up[0].ends_with("DROP CONSTRAINT \"t_aaaaaaaa_pgshift_pk\""));
        assert!(changeset.up[1].contains("\"t_bbbbbbbb_pgshift_pk\" PRIMARY KEY (\"code\")"));
        assert!(changeset.down[0].ends_with("DROP CONSTRAINT \"t_bbbbbbbb_pgshift_pk\""));
        assert_eq!(changeset.warnings[0].code, WarningCode::MF003);
    }

    #[test]
    fn test_index_kind_is_rejected() {
        let local = books(true);
        let renames = RenameMap::new();
        let ctx = GenerationContext::new(&local, &local, &renames, false);
        assert!(create(&ctx, "app", EntryKind::Index, "books", FK_KEY).is_err());
    }
}
