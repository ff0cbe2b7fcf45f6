//! # pgshift
//!
//! Phased, reversible schema migrations for PostgreSQL.
//!
//! pgshift provides:
//! - A declarative schema definition, built in Rust or loaded from TOML
//! - A structural differ between the declared schema and the live catalog
//! - One changeset generator per kind of difference, each with an exact `down`
//! - Expand, alter and contract phases so deployments stay backward compatible
//! - Locked execution with automatic rollback of a failed run
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pgshift::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let definition = DatabaseDefinition::new().schema(
//!         SchemaDef::new("app").table(
//!             TableDef::new("books")
//!                 .column(ColumnDef::new("id", "bigint").not_null())
//!                 .column(ColumnDef::new("title", "text"))
//!                 .primary_key(["id"]),
//!         ),
//!     );
//!
//!     let config = MigrationConfig::new().database_url("postgres://localhost/library");
//!     let (database, introspector) = pgshift::postgres::connect(&config)?;
//!
//!     let engine = MigrationEngine::new(config, database);
//!     engine.initialize().await?;
//!
//!     let plan = engine.plan_from_database(&definition, &introspector, &NoRenames).await?;
//!     engine.generate(&plan).await?;
//!
//!     let result = engine.migrate().await?;
//!     println!("{}", result.summary());
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// Information model and declarative definitions.
pub mod schema {
    pub use pgshift_schema::*;
}

/// Diffing, changeset generation and execution.
pub mod migrate {
    pub use pgshift_migrate::*;
}

/// PostgreSQL catalog introspection and execution.
#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod postgres {
    pub use pgshift_postgres::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::migrate::{
        ChangesetPlan, Granularity, MigrationConfig, MigrationEngine, MigrationError, NoRenames,
        Phase, RecordedRenames, RenameMap, RenameResolver,
    };
    pub use crate::schema::{
        ColumnDef, DatabaseDefinition, DatabaseInfo, SchemaDef, SchemaError, TableDef,
    };

    #[cfg(feature = "postgres")]
    pub use crate::postgres::{PgIntrospector, PgMigrationDatabase};
}

// Re-export key types at the crate root
pub use migrate::{MigrateResult, MigrationEngine, MigrationError};
pub use schema::{DatabaseDefinition, SchemaError};
