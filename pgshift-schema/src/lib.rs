//! # pgshift-schema
//!
//! Schema information model and declarative definitions for pgshift.
//!
//! This crate provides:
//! - The information model ([`DatabaseInfo`]) shared by declared and introspected schemas
//! - Declarative definitions, built in Rust or loaded from TOML
//! - Canonical content hashing for constraints, indexes, defaults and triggers
//! - Managed object naming (`<table>_<hash>_pgshift_<suffix>`)
//! - Canonical column type names
//!
//! ## Example
//!
//! ```rust,ignore
//! use pgshift_schema::{ColumnDef, DatabaseDefinition, SchemaDef, TableDef};
//!
//! let definition = DatabaseDefinition::new().schema(
//!     SchemaDef::new("app").table(
//!         TableDef::new("books")
//!             .column(ColumnDef::new("id", "bigint").not_null())
//!             .column(ColumnDef::new("title", "text"))
//!             .primary_key(["id"]),
//!     ),
//! );
//!
//! let info = definition.to_info()?;
//! ```

pub mod definition;
pub mod error;
pub mod hash;
pub mod model;
pub mod naming;
pub mod types;

pub use definition::{
    CheckDef, ColumnDef, DatabaseDefinition, EnumDef, ForeignKeyDef, IndexDef, ReferentialAction,
    SchemaDef, TableDef, TriggerDef, TriggerEvent, TriggerTiming, UniqueDef,
};
pub use error::{SchemaError, SchemaResult};
pub use model::{
    ColumnInfo, DatabaseInfo, DefaultValue, EntryKind, Identity, SchemaInfo, TableEntries,
    TableInfo,
};
pub use naming::{ManagedName, ObjectKind};
