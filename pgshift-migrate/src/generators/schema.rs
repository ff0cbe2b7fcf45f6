//! Schema (namespace) generators.

use pgshift_schema::naming::{SCHEMA_COMMENT, quote_ident, quote_literal};

use crate::changeset::{Changeset, ChangesetType, Warning, WarningCode};

fn create_sql(schema: &str) -> Vec<String> {
    vec![
        format!("CREATE SCHEMA {}", quote_ident(schema)),
        format!(
            "COMMENT ON SCHEMA {} IS {}",
            quote_ident(schema),
            quote_literal(SCHEMA_COMMENT)
        ),
    ]
}

fn drop_sql(schema: &str) -> String {
    format!("DROP SCHEMA {} CASCADE", quote_ident(schema))
}

/// Create a managed schema.
pub fn create(schema: &str) -> Changeset {
    Changeset::new(ChangesetType::CreateSchema, schema)
        .up_all(create_sql(schema))
        .down(drop_sql(schema))
}

/// Drop a managed schema and whatever is left in it.
pub fn drop(schema: &str) -> Changeset {
    Changeset::new(ChangesetType::DropSchema, schema)
        .up(drop_sql(schema))
        .down_all(create_sql(schema))
        .warn(Warning::new(WarningCode::D001, schema))
}
