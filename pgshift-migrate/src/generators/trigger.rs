//! Trigger generators.
//!
//! Trigger entries are stored as `hash:sql`. Only the hash is compared, so
//! formatting differences in the SQL never regenerate a trigger.

use pgshift_schema::EntryKind;
use pgshift_schema::hash::split_trigger_value;

use crate::changeset::{Changeset, ChangesetType};
use crate::error::MigrateResult;
use crate::generators::GenerationContext;
use crate::generators::sql;

/// Create a trigger.
pub fn create(ctx: &GenerationContext<'_>, schema: &str, table: &str, name: &str) -> MigrateResult<Changeset> {
    let value = ctx.local_entry(schema, EntryKind::Trigger, table, name)?;
    Ok(Changeset::new(ChangesetType::CreateTrigger, schema)
        .table(table)
        .up_all(sql::create_trigger(schema, table, name, value))
        .down(sql::drop_trigger(schema, table, name)))
}

/// Drop a trigger.
pub fn drop(ctx: &GenerationContext<'_>, schema: &str, table: &str, name: &str) -> MigrateResult<Changeset> {
    let value = ctx.remote_entry(schema, EntryKind::Trigger, table, name)?;
    let changeset = Changeset::new(ChangesetType::DropTrigger, schema)
        .table(table)
        .current_table(ctx.renames.current_table_name(schema, table));
    let changeset = if ctx.is_dropped(schema, table) {
        changeset
    } else {
        changeset.up(sql::drop_trigger(schema, table, name))
    };
    Ok(changeset.down_all(sql::create_trigger(schema, table, name, value)))
}

/// Recreate a trigger whose hash changed.
pub fn change(
    ctx: &GenerationContext<'_>,
    schema: &str,
    table: &str,
    name: &str,
) -> MigrateResult<Option<Changeset>> {
    let local = ctx.local_entry(schema, EntryKind::Trigger, table, name)?;
    let remote = ctx.remote_entry(schema, EntryKind::Trigger, table, name)?;

    let hash = |value: &str| split_trigger_value(value).map(|(hash, _)| hash.to_string());
    if hash(local).is_some() && hash(local) == hash(remote) {
        return Ok(None);
    }

    Ok(Some(
        Changeset::new(ChangesetType::ChangeTrigger, schema)
            .table(table)
            .up(sql::drop_trigger(schema, table, name))
            .up_all(sql::create_trigger(schema, table, name, local))
            .down(sql::drop_trigger(schema, table, name))
            .down_all(sql::create_trigger(schema, table, name, remote)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rename::RenameMap;
    use pgshift_schema::{ColumnInfo, DatabaseInfo, SchemaInfo, TableInfo};
    use pretty_assertions::assert_eq;

    const SQL: &str = "CREATE TRIGGER \"touch_pgshift_trg\" BEFORE UPDATE ON \"app\".\"books\" FOR EACH ROW EXECUTE FUNCTION touch()";

    fn books(value: Option<String>) -> DatabaseInfo {
        let mut schema = SchemaInfo::new("app").with_table(
            "books",
            TableInfo::new().with_column("id", ColumnInfo::new("integer")),
        );
        if let Some(value) = value {
            schema = schema.with_entry(EntryKind::Trigger, "books", "touch_pgshift_trg", value);
        }
        DatabaseInfo::new().with_schema(schema)
    }

    #[test]
    fn test_create_comments_hash() {
        let local = books(Some(format!("deadbeef:{}", SQL)));
        let remote = books(None);
        let renames = RenameMap::new();
        let ctx = GenerationContext::new(&local, &remote, &renames, false);

        let changeset = create(&ctx, "app", "books", "touch_pgshift_trg").unwrap();
        assert_eq!(
            changeset.up,
            vec![
                SQL.to_string(),
                "COMMENT ON TRIGGER \"touch_pgshift_trg\" ON \"app\".\"books\" IS 'deadbeef'".to_string(),
            ]
        );
        assert_eq!(
            changeset.down,
            vec!["DROP TRIGGER \"touch_pgshift_trg\" ON \"app\".\"books\"".to_string()]
        );
    }

    #[test]
    fn test_same_hash_is_a_no_op() {
        let local = books(Some(format!("deadbeef:{}", SQL)));
        let remote = books(Some(format!("deadbeef:{}", SQL.replace(' ', "  "))));
        let renames = RenameMap::new();
        let ctx = GenerationContext::new(&local, &remote, &renames, false);
        assert!(change(&ctx, "app", "books", "touch_pgshift_trg").unwrap().is_none());

        let remote = books(Some(format!("00000000:{}", SQL)));
        let ctx = GenerationContext::new(&local, &remote, &renames, false);
        let changeset = change(&ctx, "app", "books", "touch_pgshift_trg").unwrap().unwrap();
        assert_eq!(changeset.changeset_type, ChangesetType::ChangeTrigger);
        assert_eq!(changeset.up.len(), 3);
    }
}
