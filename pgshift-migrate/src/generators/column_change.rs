//! Column attribute changes.

use pgshift_schema::naming::quote_ident;
use pgshift_schema::{ColumnInfo, Identity};

use crate::changeset::{Changeset, ChangesetType, Warning, WarningCode};
use crate::error::MigrateResult;
use crate::generators::GenerationContext;
use crate::generators::safe_type::is_safe_type_change;
use crate::generators::sql;

fn pair<'a>(
    ctx: &GenerationContext<'a>,
    schema: &str,
    table: &str,
    column: &str,
) -> MigrateResult<(&'a ColumnInfo, &'a ColumnInfo)> {
    Ok((
        ctx.local_column(schema, table, column)?,
        ctx.remote_column(schema, table, column)?,
    ))
}

fn retype(schema: &str, table: &str, column: &str, info: &ColumnInfo) -> String {
    let ty = sql::column_type(schema, info);
    sql::alter_column(
        schema,
        table,
        column,
        format!("TYPE {} USING {}::{}", ty, quote_ident(column), ty),
    )
}

/// `ALTER COLUMN ... TYPE`.
pub fn data_type(
    ctx: &GenerationContext<'_>,
    schema: &str,
    table: &str,
    column: &str,
) -> MigrateResult<Changeset> {
    let (local, remote) = pair(ctx, schema, table, column)?;

    let changeset = Changeset::new(ChangesetType::ChangeColumnDataType, schema)
        .table(table)
        .up(retype(schema, table, column, local))
        .down(retype(schema, table, column, remote));

    let safe = !local.is_enum
        && !remote.is_enum
        && is_safe_type_change(&remote.data_type, &local.data_type);
    Ok(if safe {
        changeset
    } else {
        changeset.warn(Warning::new(WarningCode::B001, schema).table(table).column(column))
    })
}

/// `SET NOT NULL` through a validated check, or `DROP NOT NULL`.
///
/// Returns `None` when an identity is added or dropped in the same run;
/// the identity changeset then orders the nullability change itself.
pub fn nullable(
    ctx: &GenerationContext<'_>,
    schema: &str,
    table: &str,
    column: &str,
) -> MigrateResult<Option<Changeset>> {
    let (local, remote) = pair(ctx, schema, table, column)?;
    if local.identity.is_some() != remote.identity.is_some() {
        return Ok(None);
    }
    let changeset = Changeset::new(ChangesetType::ChangeColumnNullable, schema).table(table);

    if local.is_nullable {
        return Ok(Some(
            changeset
                .up(sql::alter_column(schema, table, column, "DROP NOT NULL"))
                .down(sql::alter_column(schema, table, column, "SET NOT NULL")),
        ));
    }

    // A validated check lets SET NOT NULL skip its own full scan.
    let check = sql::identifier(format!("{}_{}_not_null", table, column));
    Ok(Some(changeset
        .up(sql::add_constraint_not_valid(
            schema,
            table,
            &check,
            &format!("CHECK ({} IS NOT NULL)", quote_ident(column)),
        ))
        .up(sql::validate_constraint(schema, table, &check))
        .up(sql::alter_column(schema, table, column, "SET NOT NULL"))
        .up(sql::drop_constraint(schema, table, &check))
        .down(sql::alter_column(schema, table, column, "DROP NOT NULL"))
        .warn(Warning::new(WarningCode::MF001, schema).table(table).column(column))))
}

fn default_statements(schema: &str, table: &str, column: &str, info: &ColumnInfo) -> Vec<String> {
    match &info.default_value {
        Some(default) => vec![
            sql::alter_column(schema, table, column, format!("SET DEFAULT {}", default.sql)),
            sql::column_comment(schema, table, column, Some(&default.hash)),
        ],
        None => vec![
            sql::alter_column(schema, table, column, "DROP DEFAULT"),
            sql::column_comment(schema, table, column, None),
        ],
    }
}

/// `SET DEFAULT` / `DROP DEFAULT` with the hash comment kept in step.
pub fn default(
    ctx: &GenerationContext<'_>,
    schema: &str,
    table: &str,
    column: &str,
) -> MigrateResult<Changeset> {
    let (local, remote) = pair(ctx, schema, table, column)?;
    Ok(Changeset::new(ChangesetType::ChangeColumnDefault, schema)
        .table(table)
        .up_all(default_statements(schema, table, column, local))
        .down_all(default_statements(schema, table, column, remote)))
}

fn identity_action(from: Option<Identity>, to: Option<Identity>) -> Option<String> {
    match (from, to) {
        (None, Some(to)) => Some(format!("ADD GENERATED {} AS IDENTITY", to.as_sql())),
        (Some(_), None) => Some("DROP IDENTITY".to_string()),
        (Some(_), Some(to)) => Some(format!("SET GENERATED {}", to.as_sql())),
        (None, None) => None,
    }
}

/// Statements moving a column from one identity state to another.
///
/// An identity needs a `NOT NULL` column and an identity column cannot
/// drop `NOT NULL`, so nullability is set before adding an identity and
/// released after dropping one.
fn identity_statements(schema: &str, table: &str, column: &str, from: &ColumnInfo, to: &ColumnInfo) -> Vec<String> {
    let Some(action) = identity_action(from.identity, to.identity) else {
        return Vec::new();
    };
    let action = sql::alter_column(schema, table, column, action);
    match (from.identity, to.identity) {
        (None, Some(_)) if from.is_nullable => {
            vec![sql::alter_column(schema, table, column, "SET NOT NULL"), action]
        }
        (Some(_), None) if to.is_nullable => {
            vec![action, sql::alter_column(schema, table, column, "DROP NOT NULL")]
        }
        _ => vec![action],
    }
}

/// Identity generation changes, together with the nullability they imply.
pub fn identity(
    ctx: &GenerationContext<'_>,
    schema: &str,
    table: &str,
    column: &str,
) -> MigrateResult<Changeset> {
    let (local, remote) = pair(ctx, schema, table, column)?;
    let changeset = Changeset::new(ChangesetType::ChangeColumnIdentity, schema)
        .table(table)
        .up_all(identity_statements(schema, table, column, remote, local))
        .down_all(identity_statements(schema, table, column, local, remote));
    Ok(if remote.identity.is_none() && local.identity.is_some() && remote.is_nullable {
        changeset.warn(Warning::new(WarningCode::MF001, schema).table(table).column(column))
    } else {
        changeset
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rename::RenameMap;
    use pgshift_schema::{DatabaseInfo, SchemaInfo, TableInfo};
    use pretty_assertions::assert_eq;

    fn model(column: ColumnInfo) -> DatabaseInfo {
        DatabaseInfo::new().with_schema(
            SchemaInfo::new("app").with_table("users", TableInfo::new().with_column("name", column)),
        )
    }

    #[test]
    fn test_widen_varchar_is_safe() {
        let local = model(ColumnInfo::new("character varying(20)"));
        let remote = model(ColumnInfo::new("character varying(10)"));
        let renames = RenameMap::new();
        let ctx = GenerationContext::new(&local, &remote, &renames, false);

        let changeset = data_type(&ctx, "app", "users", "name").unwrap();
        assert_eq!(
            changeset.up,
            vec![
                "ALTER TABLE \"app\".\"users\" ALTER COLUMN \"name\" TYPE character varying(20) USING \"name\"::character varying(20)"
                    .to_string()
            ]
        );
        assert!(changeset.warnings.is_empty());
    }

    #[test]
    fn test_narrow_varchar_blocks() {
        let local = model(ColumnInfo::new("character varying(10)"));
        let remote = model(ColumnInfo::new("character varying(20)"));
        let renames = RenameMap::new();
        let ctx = GenerationContext::new(&local, &remote, &renames, false);

        let changeset = data_type(&ctx, "app", "users", "name").unwrap();
        assert_eq!(changeset.warnings[0].code, WarningCode::B001);
    }

    #[test]
    fn test_set_not_null_uses_check() {
        let local = model(ColumnInfo::new("text").not_null());
        let remote = model(ColumnInfo::new("text"));
        let renames = RenameMap::new();
        let ctx = GenerationContext::new(&local, &remote, &renames, false);

        let changeset = nullable(&ctx, "app", "users", "name").unwrap().unwrap();
        assert_eq!(changeset.up.len(), 4);
        assert!(changeset.up[0].ends_with("CHECK (\"name\" IS NOT NULL) NOT VALID"));
        assert!(changeset.up[1].contains("VALIDATE CONSTRAINT \"users_name_not_null\""));
        assert_eq!(
            changeset.down,
            vec!["ALTER TABLE \"app\".\"users\" ALTER COLUMN \"name\" DROP NOT NULL".to_string()]
        );
        assert_eq!(changeset.warnings[0].code, WarningCode::MF001);
    }

    #[test]
    fn test_default_change_is_inverse() {
        let with = model(ColumnInfo::new("text").default_sql("'anon'"));
        let without = model(ColumnInfo::new("text"));
        let renames = RenameMap::new();

        let set = default(&GenerationContext::new(&with, &without, &renames, false), "app", "users", "name").unwrap();
        let unset = default(&GenerationContext::new(&without, &with, &renames, false), "app", "users", "name").unwrap();

        assert_eq!(set.up, unset.down);
        assert_eq!(set.down, unset.up);
        assert!(set.up[0].ends_with("SET DEFAULT 'anon'"));
        assert!(set.down[1].ends_with("IS NULL"));
    }

    #[test]
    fn test_identity_change() {
        let local = model(ColumnInfo::new("bigint").not_null().identity(Identity::Always));
        let remote = model(ColumnInfo::new("bigint").not_null());
        let renames = RenameMap::new();
        let ctx = GenerationContext::new(&local, &remote, &renames, false);

        let changeset = identity(&ctx, "app", "users", "name").unwrap();
        assert!(changeset.up[0].ends_with("ADD GENERATED ALWAYS AS IDENTITY"));
        assert!(changeset.down[0].ends_with("DROP IDENTITY"));
    }

    #[test]
    fn test_identity_on_nullable_column_sets_not_null_first() {
        let local = model(ColumnInfo::new("integer").not_null().identity(Identity::ByDefault));
        let remote = model(ColumnInfo::new("integer"));
        let renames = RenameMap::new();
        let ctx = GenerationContext::new(&local, &remote, &renames, false);

        let changeset = identity(&ctx, "app", "users", "name").unwrap();
        assert_eq!(
            changeset.up,
            vec![
                "ALTER TABLE \"app\".\"users\" ALTER COLUMN \"name\" SET NOT NULL".to_string(),
                "ALTER TABLE \"app\".\"users\" ALTER COLUMN \"name\" ADD GENERATED BY DEFAULT AS IDENTITY".to_string(),
            ]
        );
        assert_eq!(
            changeset.down,
            vec![
                "ALTER TABLE \"app\".\"users\" ALTER COLUMN \"name\" DROP IDENTITY".to_string(),
                "ALTER TABLE \"app\".\"users\" ALTER COLUMN \"name\" DROP NOT NULL".to_string(),
            ]
        );
        assert_eq!(changeset.warnings[0].code, WarningCode::MF001);
        assert!(nullable(&ctx, "app", "users", "name").unwrap().is_none());
    }

    #[test]
    fn test_dropping_identity_releases_not_null_last() {
        let local = model(ColumnInfo::new("integer"));
        let remote = model(ColumnInfo::new("integer").not_null().identity(Identity::Always));
        let renames = RenameMap::new();
        let ctx = GenerationContext::new(&local, &remote, &renames, false);

        let changeset = identity(&ctx, "app", "users", "name").unwrap();
        assert!(changeset.up[0].ends_with("DROP IDENTITY"));
        assert!(changeset.up[1].ends_with("DROP NOT NULL"));
        assert!(changeset.down[0].ends_with("SET NOT NULL"));
        assert!(changeset.down[1].ends_with("ADD GENERATED ALWAYS AS IDENTITY"));
        assert!(nullable(&ctx, "app", "users", "name").unwrap().is_none());
    }
}
