//! Extension generators.

use pgshift_schema::naming::quote_ident;

use crate::changeset::{Changeset, ChangesetType, Warning, WarningCode};

fn create_sql(name: &str) -> String {
    format!("CREATE EXTENSION IF NOT EXISTS {}", quote_ident(name))
}

fn drop_sql(name: &str) -> String {
    format!("DROP EXTENSION IF EXISTS {}", quote_ident(name))
}

/// Install an extension.
pub fn create(name: &str) -> Changeset {
    Changeset::new(ChangesetType::CreateExtension, "")
        .up(create_sql(name))
        .down(drop_sql(name))
}

/// Remove an extension.
pub fn drop(name: &str) -> Changeset {
    Changeset::new(ChangesetType::DropExtension, "")
        .up(drop_sql(name))
        .down(create_sql(name))
        .warn(Warning::new(WarningCode::D004, name))
}
