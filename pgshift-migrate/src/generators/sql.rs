//! SQL fragments shared by the generators.

use pgshift_schema::hash::split_trigger_value;
use pgshift_schema::naming::{
    MAX_IDENTIFIER_LEN, ObjectKind, object_name, qualified, quote_ident, quote_literal,
};
use pgshift_schema::{ColumnInfo, TableInfo};

/// Type of a column as written in DDL. Enum types are schema-qualified.
pub fn column_type(schema: &str, column: &ColumnInfo) -> String {
    if column.is_enum {
        qualified(schema, &column.data_type)
    } else {
        column.data_type.clone()
    }
}

/// Inline column definition for `CREATE TABLE` and `ADD COLUMN`.
pub fn column_definition(schema: &str, name: &str, column: &ColumnInfo) -> String {
    let mut sql = format!("{} {}", quote_ident(name), column_type(schema, column));
    if let Some(identity) = column.identity {
        sql.push_str(&format!(" GENERATED {} AS IDENTITY", identity.as_sql()));
    }
    if let Some(default) = &column.default_value {
        sql.push_str(&format!(" DEFAULT {}", default.sql));
    }
    if !column.is_nullable {
        sql.push_str(" NOT NULL");
    }
    sql
}

/// `CREATE TABLE` with every column inline.
pub fn create_table(schema: &str, table: &str, info: &TableInfo) -> String {
    let columns: Vec<String> = info
        .columns
        .iter()
        .map(|(name, column)| format!("    {}", column_definition(schema, name, column)))
        .collect();
    if columns.is_empty() {
        format!("CREATE TABLE {} ()", qualified(schema, table))
    } else {
        format!(
            "CREATE TABLE {} (\n{}\n)",
            qualified(schema, table),
            columns.join(",\n")
        )
    }
}

/// `DROP TABLE`.
pub fn drop_table(schema: &str, table: &str) -> String {
    format!("DROP TABLE {}", qualified(schema, table))
}

/// `ALTER TABLE <table> <action>`.
pub fn alter_table(schema: &str, table: &str, action: impl AsRef<str>) -> String {
    format!("ALTER TABLE {} {}", qualified(schema, table), action.as_ref())
}

/// `ALTER TABLE <table> ALTER COLUMN <column> <action>`.
pub fn alter_column(schema: &str, table: &str, column: &str, action: impl AsRef<str>) -> String {
    alter_table(
        schema,
        table,
        format!("ALTER COLUMN {} {}", quote_ident(column), action.as_ref()),
    )
}

/// `COMMENT ON COLUMN` carrying the default hash, or clearing it.
pub fn column_comment(schema: &str, table: &str, column: &str, hash: Option<&str>) -> String {
    format!(
        "COMMENT ON COLUMN {}.{} IS {}",
        qualified(schema, table),
        quote_ident(column),
        hash.map(quote_literal).unwrap_or_else(|| "NULL".to_string())
    )
}

/// Default-hash comments for every column that has a default.
pub fn default_comments(schema: &str, table: &str, info: &TableInfo) -> Vec<String> {
    info.columns
        .iter()
        .filter_map(|(name, column)| {
            column
                .default_value
                .as_ref()
                .map(|d| column_comment(schema, table, name, Some(&d.hash)))
        })
        .collect()
}

/// Name of a constraint or index entry.
pub fn entry_name(table: &str, key: &str, kind: ObjectKind) -> String {
    object_name(table, key, kind)
}

/// `ADD CONSTRAINT`.
pub fn add_constraint(schema: &str, table: &str, name: &str, definition: &str) -> String {
    alter_table(
        schema,
        table,
        format!("ADD CONSTRAINT {} {}", quote_ident(name), definition),
    )
}

/// `ADD CONSTRAINT ... NOT VALID`.
pub fn add_constraint_not_valid(schema: &str, table: &str, name: &str, definition: &str) -> String {
    format!("{} NOT VALID", add_constraint(schema, table, name, definition))
}

/// `VALIDATE CONSTRAINT`.
pub fn validate_constraint(schema: &str, table: &str, name: &str) -> String {
    alter_table(schema, table, format!("VALIDATE CONSTRAINT {}", quote_ident(name)))
}

/// `DROP CONSTRAINT`.
pub fn drop_constraint(schema: &str, table: &str, name: &str) -> String {
    alter_table(schema, table, format!("DROP CONSTRAINT {}", quote_ident(name)))
}

/// Rewrite a `CREATE [UNIQUE] INDEX` statement to build concurrently.
pub fn concurrently(statement: &str) -> String {
    for prefix in ["CREATE UNIQUE INDEX ", "CREATE INDEX "] {
        if let Some(rest) = statement.strip_prefix(prefix) {
            if rest.starts_with("CONCURRENTLY ") {
                return statement.to_string();
            }
            return format!("{}CONCURRENTLY {}", prefix, rest);
        }
    }
    statement.to_string()
}

/// `DROP INDEX`, optionally concurrently.
pub fn drop_index(schema: &str, name: &str, concurrent: bool) -> String {
    if concurrent {
        format!("DROP INDEX CONCURRENTLY {}", qualified(schema, name))
    } else {
        format!("DROP INDEX {}", qualified(schema, name))
    }
}

/// Statements creating a trigger from its stored `hash:sql` value.
pub fn create_trigger(schema: &str, table: &str, name: &str, value: &str) -> Vec<String> {
    match split_trigger_value(value) {
        Some((hash, sql)) => vec![
            sql.to_string(),
            format!(
                "COMMENT ON TRIGGER {} ON {} IS {}",
                quote_ident(name),
                qualified(schema, table),
                quote_literal(hash)
            ),
        ],
        None => vec![value.to_string()],
    }
}

/// `DROP TRIGGER`.
pub fn drop_trigger(schema: &str, table: &str, name: &str) -> String {
    format!("DROP TRIGGER {} ON {}", quote_ident(name), qualified(schema, table))
}

/// Truncate a generated identifier to the PostgreSQL limit.
pub fn identifier(name: String) -> String {
    if name.len() <= MAX_IDENTIFIER_LEN {
        return name;
    }
    let mut end = MAX_IDENTIFIER_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgshift_schema::Identity;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_column_definition() {
        let column = ColumnInfo::new("bigint")
            .identity(Identity::Always)
            .not_null();
        assert_eq!(
            column_definition("app", "id", &column),
            "\"id\" bigint GENERATED ALWAYS AS IDENTITY NOT NULL"
        );

        let column = ColumnInfo::new("text").default_sql("'x'");
        assert_eq!(column_definition("app", "name", &column), "\"name\" text DEFAULT 'x'");

        let column = ColumnInfo::enumeration("mood");
        assert_eq!(column_definition("app", "mood", &column), "\"mood\" \"app\".\"mood\"");
    }

    #[test]
    fn test_create_table() {
        let table = TableInfo::new()
            .with_column("id", ColumnInfo::new("integer").not_null())
            .with_column("title", ColumnInfo::new("text"));
        assert_eq!(
            create_table("app", "books", &table),
            "CREATE TABLE \"app\".\"books\" (\n    \"id\" integer NOT NULL,\n    \"title\" text\n)"
        );
    }

    #[test]
    fn test_concurrently() {
        assert_eq!(
            concurrently("CREATE INDEX \"i\" ON \"app\".\"t\" USING btree (\"a\")"),
            "CREATE INDEX CONCURRENTLY \"i\" ON \"app\".\"t\" USING btree (\"a\")"
        );
        assert_eq!(
            concurrently("CREATE UNIQUE INDEX \"i\" ON \"app\".\"t\" (\"a\")"),
            "CREATE UNIQUE INDEX CONCURRENTLY \"i\" ON \"app\".\"t\" (\"a\")"
        );
    }

    #[test]
    fn test_identifier_truncation() {
        assert_eq!(identifier("x".repeat(70)).len(), MAX_IDENTIFIER_LEN);
        assert_eq!(identifier("short".to_string()), "short");
    }
}
