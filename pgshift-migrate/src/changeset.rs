//! Changesets: the unit of generated DDL.
//!
//! Every generator yields [`Changeset`]s. A changeset's phase and priority are
//! fixed by its [`ChangesetType`], so sorting by
//! `(phase, priority, schema, table, type)` gives one total order no matter
//! which generator produced what.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Migration phase.
///
/// Expand adds things old code can live with, alter changes things in
/// place, contract removes what new code no longer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Additive changes.
    Expand,
    /// In-place changes.
    Alter,
    /// Removals.
    Contract,
}

impl Phase {
    /// Every phase, in execution order.
    pub const ALL: [Phase; 3] = [Phase::Expand, Phase::Alter, Phase::Contract];

    /// Lowercase name, used in directory and table names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expand => "expand",
            Self::Alter => "alter",
            Self::Contract => "contract",
        }
    }

    /// Parse a lowercase name.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == value)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of generated operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub enum ChangesetType {
    CreateSchema,
    CreateExtension,
    CreateEnum,
    RenameTable,
    RenameColumn,
    CreateTable,
    CreateColumn,
    AddEnumValue,
    ChangeColumnDataType,
    ChangeColumnDefault,
    ChangeColumnIdentity,
    ChangeColumnNullable,
    ChangeEnum,
    ChangePrimaryKey,
    CreatePrimaryKey,
    CreateUniqueConstraint,
    CreateCheckConstraint,
    CreateForeignKeyConstraint,
    CreateIndex,
    CreateTrigger,
    ChangeTrigger,
    DropTrigger,
    DropForeignKeyConstraint,
    DropCheckConstraint,
    DropUniqueConstraint,
    DropPrimaryKey,
    DropIndex,
    DropColumn,
    DropTable,
    DropEnum,
    DropExtension,
    DropSchema,
}

impl ChangesetType {
    /// Ordering within a phase; lower runs first.
    pub fn priority(&self) -> u32 {
        match self {
            Self::CreateSchema => 0,
            Self::CreateExtension => 1,
            Self::CreateEnum => 2,
            Self::RenameTable => 3,
            Self::RenameColumn => 4,
            Self::CreateTable => 100,
            Self::CreateColumn => 200,
            Self::AddEnumValue => 250,
            Self::ChangeColumnDataType => 300,
            Self::ChangeColumnDefault => 310,
            Self::ChangeColumnIdentity => 320,
            Self::ChangeColumnNullable => 330,
            Self::ChangeEnum => 340,
            Self::ChangePrimaryKey => 390,
            Self::CreatePrimaryKey => 400,
            Self::CreateUniqueConstraint => 500,
            Self::CreateCheckConstraint => 600,
            Self::CreateForeignKeyConstraint => 700,
            Self::CreateIndex => 750,
            Self::CreateTrigger => 780,
            Self::ChangeTrigger => 790,
            Self::DropTrigger => 800,
            Self::DropForeignKeyConstraint => 810,
            Self::DropCheckConstraint => 900,
            Self::DropUniqueConstraint => 1000,
            Self::DropPrimaryKey => 1004,
            Self::DropIndex => 1005,
            Self::DropColumn => 1010,
            Self::DropTable => 1100,
            Self::DropEnum => 1200,
            Self::DropExtension => 1300,
            Self::DropSchema => 1400,
        }
    }

    /// Phase this kind of operation belongs to.
    pub fn phase(&self) -> Phase {
        match self {
            Self::ChangeColumnDataType
            | Self::ChangeColumnDefault
            | Self::ChangeColumnIdentity
            | Self::ChangeColumnNullable
            | Self::ChangeEnum
            | Self::ChangePrimaryKey
            | Self::ChangeTrigger => Phase::Alter,
            Self::DropTrigger
            | Self::DropForeignKeyConstraint
            | Self::DropCheckConstraint
            | Self::DropUniqueConstraint
            | Self::DropPrimaryKey
            | Self::DropIndex
            | Self::DropColumn
            | Self::DropTable
            | Self::DropEnum
            | Self::DropExtension
            | Self::DropSchema => Phase::Contract,
            _ => Phase::Expand,
        }
    }

    /// camelCase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateSchema => "createSchema",
            Self::CreateExtension => "createExtension",
            Self::CreateEnum => "createEnum",
            Self::RenameTable => "renameTable",
            Self::RenameColumn => "renameColumn",
            Self::CreateTable => "createTable",
            Self::CreateColumn => "createColumn",
            Self::AddEnumValue => "addEnumValue",
            Self::ChangeColumnDataType => "changeColumnDataType",
            Self::ChangeColumnDefault => "changeColumnDefault",
            Self::ChangeColumnIdentity => "changeColumnIdentity",
            Self::ChangeColumnNullable => "changeColumnNullable",
            Self::ChangeEnum => "changeEnum",
            Self::ChangePrimaryKey => "changePrimaryKey",
            Self::CreatePrimaryKey => "createPrimaryKey",
            Self::CreateUniqueConstraint => "createUniqueConstraint",
            Self::CreateCheckConstraint => "createCheckConstraint",
            Self::CreateForeignKeyConstraint => "createForeignKeyConstraint",
            Self::CreateIndex => "createIndex",
            Self::CreateTrigger => "createTrigger",
            Self::ChangeTrigger => "changeTrigger",
            Self::DropTrigger => "dropTrigger",
            Self::DropForeignKeyConstraint => "dropForeignKeyConstraint",
            Self::DropCheckConstraint => "dropCheckConstraint",
            Self::DropUniqueConstraint => "dropUniqueConstraint",
            Self::DropPrimaryKey => "dropPrimaryKey",
            Self::DropIndex => "dropIndex",
            Self::DropColumn => "dropColumn",
            Self::DropTable => "dropTable",
            Self::DropEnum => "dropEnum",
            Self::DropExtension => "dropExtension",
            Self::DropSchema => "dropSchema",
        }
    }
}

impl fmt::Display for ChangesetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Warning category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningKind {
    /// Old application code will break.
    BackwardIncompatible,
    /// Data is removed.
    Destructive,
    /// Takes locks that block reads or writes for a long time.
    Blocking,
    /// May fail against existing data.
    MightFail,
}

/// Stable warning codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningCode {
    /// Table rename.
    BI001,
    /// Column rename.
    BI002,
    /// Schema drop.
    D001,
    /// Table drop.
    D002,
    /// Column drop.
    D003,
    /// Extension drop.
    D004,
    /// Column type change outside the safe set.
    B001,
    /// Enum rebuild.
    B002,
    /// Column set to NOT NULL.
    MF001,
    /// Unique constraint on an existing table.
    MF002,
    /// Primary key on an existing table.
    MF003,
    /// NOT NULL column without default added to an existing table.
    MF004,
}

impl WarningCode {
    /// Category of this code.
    pub fn kind(&self) -> WarningKind {
        match self {
            Self::BI001 | Self::BI002 => WarningKind::BackwardIncompatible,
            Self::D001 | Self::D002 | Self::D003 | Self::D004 => WarningKind::Destructive,
            Self::B001 | Self::B002 => WarningKind::Blocking,
            Self::MF001 | Self::MF002 | Self::MF003 | Self::MF004 => WarningKind::MightFail,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::BI001 => "table renamed",
            Self::BI002 => "column renamed",
            Self::D001 => "schema dropped",
            Self::D002 => "table dropped",
            Self::D003 => "column dropped",
            Self::D004 => "extension dropped",
            Self::B001 => "column type change rewrites the table",
            Self::B002 => "enum rebuild rewrites dependent tables",
            Self::MF001 => "NOT NULL fails if the column holds NULLs",
            Self::MF002 => "unique constraint fails on duplicate rows",
            Self::MF003 => "primary key fails on duplicate or NULL rows",
            Self::MF004 => "NOT NULL column without default fails on a non-empty table",
        }
    }
}

/// A warning attached to a changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    /// Category.
    pub kind: WarningKind,
    /// Stable code.
    pub code: WarningCode,
    /// Schema.
    pub schema: String,
    /// Table, when relevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    /// Column, when relevant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl Warning {
    /// Create a schema-level warning.
    pub fn new(code: WarningCode, schema: impl Into<String>) -> Self {
        Self {
            kind: code.kind(),
            code,
            schema: schema.into(),
            table: None,
            column: None,
        }
    }

    /// Attach a table.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Attach a column.
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.code, self.schema)?;
        if let Some(table) = &self.table {
            write!(f, ".{}", table)?;
        }
        if let Some(column) = &self.column {
            write!(f, ".{}", column)?;
        }
        write!(f, ": {}", self.code.describe())
    }
}

/// One generated operation with its inverse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    /// Operation kind.
    #[serde(rename = "type")]
    pub changeset_type: ChangesetType,
    /// Phase, derived from the type.
    pub phase: Phase,
    /// Priority, derived from the type.
    pub priority: u32,
    /// Schema.
    pub schema_name: String,
    /// Table in the target model.
    pub table_name: Option<String>,
    /// Table name in the current database, when it differs.
    pub current_table_name: Option<String>,
    /// Statements applying the change.
    pub up: Vec<String>,
    /// Statements reverting it.
    pub down: Vec<String>,
    /// Whether the statements may run inside a transaction block.
    pub transaction: bool,
    /// Warnings.
    pub warnings: Vec<Warning>,
}

impl Changeset {
    /// Create an empty changeset.
    pub fn new(changeset_type: ChangesetType, schema: impl Into<String>) -> Self {
        Self {
            changeset_type,
            phase: changeset_type.phase(),
            priority: changeset_type.priority(),
            schema_name: schema.into(),
            table_name: None,
            current_table_name: None,
            up: Vec::new(),
            down: Vec::new(),
            transaction: true,
            warnings: Vec::new(),
        }
    }

    /// Attach a table.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table_name = Some(table.into());
        self
    }

    /// Record the table's current name.
    pub fn current_table(mut self, table: impl Into<String>) -> Self {
        self.current_table_name = Some(table.into());
        self
    }

    /// Append an `up` statement.
    pub fn up(mut self, sql: impl Into<String>) -> Self {
        self.up.push(sql.into());
        self
    }

    /// Append a `down` statement.
    pub fn down(mut self, sql: impl Into<String>) -> Self {
        self.down.push(sql.into());
        self
    }

    /// Append several `up` statements.
    pub fn up_all(mut self, sql: impl IntoIterator<Item = String>) -> Self {
        self.up.extend(sql);
        self
    }

    /// Append several `down` statements.
    pub fn down_all(mut self, sql: impl IntoIterator<Item = String>) -> Self {
        self.down.extend(sql);
        self
    }

    /// Mark the statements as unable to run in a transaction block.
    pub fn non_transactional(mut self) -> Self {
        self.transaction = false;
        self
    }

    /// Attach a warning.
    pub fn warn(mut self, warning: Warning) -> Self {
        self.warnings.push(warning);
        self
    }

    /// Prefix every statement with a `-- <type> <schema>.<table>` comment.
    pub fn annotated(mut self) -> Self {
        let label = match &self.table_name {
            Some(table) => format!("-- {} {}.{}", self.changeset_type, self.schema_name, table),
            None => format!("-- {} {}", self.changeset_type, self.schema_name),
        };
        for statement in self.up.iter_mut().chain(self.down.iter_mut()) {
            *statement = format!("{}\n{}", label, statement);
        }
        self
    }

    /// Key of the total order.
    pub fn sort_key(&self) -> (Phase, u32, &str, &str, &'static str) {
        (
            self.phase,
            self.priority,
            self.schema_name.as_str(),
            self.table_name.as_deref().unwrap_or(""),
            self.changeset_type.as_str(),
        )
    }

    /// Short description for logs and migration names.
    pub fn describe(&self) -> String {
        match &self.table_name {
            Some(table) => format!("{} {}.{}", self.changeset_type, self.schema_name, table),
            None => format!("{} {}", self.changeset_type, self.schema_name),
        }
    }
}

/// Sort changesets into execution order.
pub fn sort_changesets(changesets: &mut [Changeset]) {
    changesets.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_phase_order() {
        assert!(Phase::Expand < Phase::Alter);
        assert!(Phase::Alter < Phase::Contract);
        assert_eq!(Phase::parse("alter"), Some(Phase::Alter));
        assert_eq!(Phase::parse("other"), None);
    }

    #[test]
    fn test_drops_precede_each_other_in_dependency_order() {
        assert!(ChangesetType::DropForeignKeyConstraint.priority() < ChangesetType::DropPrimaryKey.priority());
        assert!(ChangesetType::DropPrimaryKey.priority() < ChangesetType::DropTable.priority());
        assert!(ChangesetType::DropTable.priority() < ChangesetType::DropSchema.priority());
        assert!(ChangesetType::CreateTable.priority() < ChangesetType::CreatePrimaryKey.priority());
        assert_eq!(ChangesetType::DropTable.phase(), Phase::Contract);
        assert_eq!(ChangesetType::ChangeColumnNullable.phase(), Phase::Alter);
        assert_eq!(ChangesetType::CreateIndex.phase(), Phase::Expand);
    }

    #[test]
    fn test_sort_changesets() {
        let mut changesets = vec![
            Changeset::new(ChangesetType::DropTable, "app").table("users"),
            Changeset::new(ChangesetType::CreatePrimaryKey, "app").table("books"),
            Changeset::new(ChangesetType::ChangeColumnNullable, "app").table("books"),
            Changeset::new(ChangesetType::CreateTable, "app").table("books"),
            Changeset::new(ChangesetType::DropPrimaryKey, "app").table("users"),
        ];
        sort_changesets(&mut changesets);

        let order: Vec<_> = changesets.iter().map(|c| c.changeset_type).collect();
        assert_eq!(
            order,
            vec![
                ChangesetType::CreateTable,
                ChangesetType::CreatePrimaryKey,
                ChangesetType::ChangeColumnNullable,
                ChangesetType::DropPrimaryKey,
                ChangesetType::DropTable,
            ]
        );
    }

    #[test]
    fn test_annotated() {
        let changeset = Changeset::new(ChangesetType::CreateTable, "app")
            .table("books")
            .up("CREATE TABLE x ()")
            .down("DROP TABLE x")
            .annotated();
        assert_eq!(changeset.up[0], "-- createTable app.books\nCREATE TABLE x ()");
        assert_eq!(changeset.down[0], "-- createTable app.books\nDROP TABLE x");
    }

    #[test]
    fn test_warning_display() {
        let warning = Warning::new(WarningCode::D003, "app").table("users").column("age");
        assert_eq!(warning.kind, WarningKind::Destructive);
        assert_eq!(warning.to_string(), "D003 app.users.age: column dropped");
    }
}
