//! End-to-end scenarios: declare a schema, plan against a current model,
//! write migrations and run them against an in-memory database.

mod common;

use pgshift::migrate::{ChangesetPlan, ChangesetType, NoRenames, Phase, WarningCode};
use pgshift::schema::{
    ColumnDef, DatabaseDefinition, DatabaseInfo, ForeignKeyDef, IndexDef, SchemaDef, TableDef,
};
use pretty_assertions::assert_eq;

fn books(title_type: &str) -> TableDef {
    TableDef::new("books")
        .column(ColumnDef::new("id", "bigint").not_null())
        .column(ColumnDef::new("title", title_type))
        .primary_key(["id"])
}

fn users() -> TableDef {
    TableDef::new("users")
        .column(ColumnDef::new("id", "bigint").not_null())
        .column(ColumnDef::new("favorite_book_id", "bigint"))
        .primary_key(["id"])
        .foreign_key(ForeignKeyDef::new(["favorite_book_id"], "books", ["id"]))
}

fn app(tables: impl IntoIterator<Item = TableDef>) -> DatabaseDefinition {
    let schema = tables
        .into_iter()
        .fold(SchemaDef::new("app"), |schema, table| schema.table(table));
    DatabaseDefinition::new().schema(schema)
}

fn types(plan: &ChangesetPlan) -> Vec<ChangesetType> {
    plan.changesets.iter().map(|c| c.changeset_type).collect()
}

/// Test creating a table in an empty database
#[tokio::test]
async fn test_add_books_table() {
    let dir = tempfile::tempdir().unwrap();
    let engine = common::engine(dir.path());
    engine.initialize().await.unwrap();

    let plan = engine
        .plan(&app([books("text")]), &DatabaseInfo::new(), &NoRenames)
        .unwrap();
    assert_eq!(
        types(&plan),
        vec![
            ChangesetType::CreateSchema,
            ChangesetType::CreateTable,
            ChangesetType::CreatePrimaryKey,
        ]
    );
    assert!(plan.changesets.iter().all(|c| c.phase == Phase::Expand));
    assert!(plan.warnings().is_empty());

    let paths = engine.generate(&plan).await.unwrap();
    assert_eq!(paths.len(), 1);

    let result = engine.migrate().await.unwrap();
    assert!(result.success);
    assert_eq!(result.applied_migration_names.len(), 1);

    let executed = engine.database().executed();
    assert_eq!(executed[0], "CREATE SCHEMA \"app\"");
    assert!(executed.iter().any(|s| s.starts_with("CREATE TABLE \"app\".\"books\"")));
    assert!(
        executed
            .last()
            .is_some_and(|s| s.contains("ADD CONSTRAINT") && s.contains("PRIMARY KEY"))
    );
    assert!(!engine.database().is_locked());
}

/// Test dropping two related tables orders key drops before table drops
#[tokio::test]
async fn test_drop_books_and_users() {
    let dir = tempfile::tempdir().unwrap();
    let engine = common::engine(dir.path());

    let remote = app([books("text"), users()]).to_info().unwrap();
    let target = DatabaseDefinition::new().schema(SchemaDef::new("app"));
    let plan = engine.plan(&target, &remote, &NoRenames).unwrap();

    assert_eq!(
        types(&plan),
        vec![
            ChangesetType::DropForeignKeyConstraint,
            ChangesetType::DropPrimaryKey,
            ChangesetType::DropPrimaryKey,
            ChangesetType::DropTable,
            ChangesetType::DropTable,
        ]
    );
    assert!(plan.changesets.iter().all(|c| c.phase == Phase::Contract));

    let codes: Vec<WarningCode> = plan.warnings().iter().map(|w| w.code).collect();
    assert_eq!(codes, vec![WarningCode::D002, WarningCode::D002]);

    // Each drop restores what it removed.
    let drop_books = &plan.changesets[3];
    assert_eq!(drop_books.up, vec!["DROP TABLE \"app\".\"books\"".to_string()]);
    assert!(drop_books.down[0].starts_with("CREATE TABLE \"app\".\"books\""));
}

/// Test widening a varchar is a safe in-place change
#[tokio::test]
async fn test_widen_varchar() {
    let dir = tempfile::tempdir().unwrap();
    let engine = common::engine(dir.path());

    let remote = app([books("varchar(10)")]).to_info().unwrap();
    let plan = engine
        .plan(&app([books("varchar(20)")]), &remote, &NoRenames)
        .unwrap();

    assert_eq!(types(&plan), vec![ChangesetType::ChangeColumnDataType]);
    assert_eq!(plan.changesets[0].phase, Phase::Alter);
    assert!(plan.warnings().is_empty());
    assert!(plan.changesets[0].up[0].contains("TYPE character varying(20)"));
    assert!(plan.changesets[0].down[0].contains("TYPE character varying(10)"));
}

/// Test narrowing a varchar warns about a blocking rewrite
#[tokio::test]
async fn test_narrow_varchar() {
    let dir = tempfile::tempdir().unwrap();
    let engine = common::engine(dir.path());

    let remote = app([books("varchar(20)")]).to_info().unwrap();
    let plan = engine
        .plan(&app([books("varchar(10)")]), &remote, &NoRenames)
        .unwrap();

    assert_eq!(types(&plan), vec![ChangesetType::ChangeColumnDataType]);
    let warnings = plan.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].code, WarningCode::B001);
    assert_eq!(warnings[0].column.as_deref(), Some("title"));
}

/// Test a failing migration rolls back the ones applied before it
#[tokio::test]
async fn test_rollback_on_mid_run_failure() {
    let dir = tempfile::tempdir().unwrap();
    let engine = common::engine(dir.path());
    engine.initialize().await.unwrap();

    let remote = app([books("text")]).to_info().unwrap();
    let target = app([books("text")
        .column(ColumnDef::new("isbn", "text"))
        .index(IndexDef::new(["isbn"]))]);
    let plan = engine.plan(&target, &remote, &NoRenames).unwrap();
    assert_eq!(
        types(&plan),
        vec![ChangesetType::CreateColumn, ChangesetType::CreateIndex]
    );

    let paths = engine.generate(&plan).await.unwrap();
    assert_eq!(paths.len(), 2);

    let mut names: Vec<String> = engine
        .file_manager()
        .list_migrations()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.name)
        .collect();
    names.sort();

    engine.database().fail_up_on("CONCURRENTLY");
    let result = engine.migrate().await.unwrap();

    assert!(!result.success);
    assert_eq!(result.applied_migration_names, vec![names[0].clone()]);
    assert_eq!(result.rolled_back_migration_names, vec![names[0].clone()]);

    let error = result.error.unwrap();
    assert_eq!(error.migration, names[1]);
    assert!(!error.requires_manual_intervention());

    assert!(engine.database().applied_names().is_empty());
    assert!(!engine.database().is_locked());

    let executed = engine.database().executed();
    assert_eq!(executed.len(), 2);
    assert!(executed[0].contains("ADD COLUMN \"isbn\""));
    assert!(executed[1].contains("DROP COLUMN \"isbn\""));
}

/// Test a failure in the middle of a run never reaches the migrations after it
#[tokio::test]
async fn test_failure_stops_before_later_migrations() {
    let dir = tempfile::tempdir().unwrap();
    let engine = common::engine(dir.path());
    engine.initialize().await.unwrap();

    let legacy = TableDef::new("legacy").column(ColumnDef::new("id", "bigint").not_null());
    let remote = app([books("text"), legacy]).to_info().unwrap();
    let target = app([books("text")
        .column(ColumnDef::new("isbn", "text"))
        .index(IndexDef::new(["isbn"]))]);
    let plan = engine.plan(&target, &remote, &NoRenames).unwrap();
    assert_eq!(
        types(&plan),
        vec![
            ChangesetType::CreateColumn,
            ChangesetType::CreateIndex,
            ChangesetType::DropTable,
        ]
    );

    let paths = engine.generate(&plan).await.unwrap();
    assert_eq!(paths.len(), 3);
    let mut names: Vec<String> = engine
        .file_manager()
        .list_migrations()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.name)
        .collect();
    names.sort();

    engine.database().fail_up_on("CONCURRENTLY");
    let result = engine.migrate().await.unwrap();

    assert!(!result.success);
    assert_eq!(result.error.unwrap().migration, names[1]);
    assert_eq!(result.rolled_back_migration_names, vec![names[0].clone()]);
    assert!(!result.applied_migration_names.contains(&names[2]));
    assert!(engine.database().applied_names().is_empty());
    assert!(
        engine
            .database()
            .executed()
            .iter()
            .all(|statement| !statement.contains("DROP TABLE"))
    );
}
