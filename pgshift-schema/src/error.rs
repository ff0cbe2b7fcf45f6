//! Error types for schema definitions and the information model.

// These warnings are false positives - the fields are used by derive macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Result type for schema operations.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised while building or reading an information model.
#[derive(Error, Debug, Diagnostic)]
pub enum SchemaError {
    /// Error reading a definition or structure file.
    #[error("failed to read file: {path}")]
    #[diagnostic(code(pgshift::schema::io_error))]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Two declared schemas share one name.
    #[error("schema `{name}` is declared more than once")]
    #[diagnostic(
        code(pgshift::schema::duplicate_schema),
        help("merge the declarations or rename one of the schemas")
    )]
    DuplicateSchema { name: String },

    /// Duplicate definition inside one schema.
    #[error("duplicate {kind} `{name}` in schema `{schema}`")]
    #[diagnostic(code(pgshift::schema::duplicate))]
    Duplicate {
        schema: String,
        kind: String,
        name: String,
    },

    /// A constraint, index or trigger names a column the table does not declare.
    #[error("unknown column `{column}` on `{schema}.{table}` referenced by {context}")]
    #[diagnostic(code(pgshift::schema::unknown_column))]
    UnknownColumn {
        schema: String,
        table: String,
        column: String,
        context: String,
    },

    /// Invalid table definition.
    #[error("invalid table `{schema}.{table}`: {message}")]
    #[diagnostic(code(pgshift::schema::invalid_table))]
    InvalidTable {
        schema: String,
        table: String,
        message: String,
    },

    /// Invalid enum definition.
    #[error("invalid enum `{schema}.{name}`: {message}")]
    #[diagnostic(code(pgshift::schema::invalid_enum))]
    InvalidEnum {
        schema: String,
        name: String,
        message: String,
    },

    /// A name carries the managed marker but its hash cannot be recovered.
    #[error("managed {kind} `{name}` has a malformed name")]
    #[diagnostic(
        code(pgshift::schema::malformed_managed_name),
        help(
            "the object was renamed outside pgshift; rename it back or drop it before generating migrations"
        )
    )]
    MalformedManagedName { kind: String, name: String },

    /// TOML parsing error.
    #[error("failed to parse TOML")]
    #[diagnostic(code(pgshift::schema::toml_error))]
    TomlError {
        #[source]
        source: toml::de::Error,
    },

    /// JSON structure dump error.
    #[error("failed to read structure dump")]
    #[diagnostic(code(pgshift::schema::structure_error))]
    StructureError {
        #[source]
        source: serde_json::Error,
    },

    /// Internal invariant broken.
    #[error("internal error: {message}")]
    #[diagnostic(code(pgshift::schema::internal))]
    Internal { message: String },

    /// Validation error with multiple issues.
    #[error("schema validation failed with {count} error(s)")]
    #[diagnostic(code(pgshift::schema::validation_failed))]
    ValidationFailed {
        count: usize,
        #[related]
        errors: Vec<SchemaError>,
    },
}

impl SchemaError {
    /// Create a duplicate definition error.
    pub fn duplicate(
        schema: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::Duplicate {
            schema: schema.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an unknown column error.
    pub fn unknown_column(
        schema: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self::UnknownColumn {
            schema: schema.into(),
            table: table.into(),
            column: column.into(),
            context: context.into(),
        }
    }

    /// Create an invalid table error.
    pub fn invalid_table(
        schema: impl Into<String>,
        table: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidTable {
            schema: schema.into(),
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an invalid enum error.
    pub fn invalid_enum(
        schema: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidEnum {
            schema: schema.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a malformed managed name error.
    pub fn malformed(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::MalformedManagedName {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Collapse a list of errors, keeping a single error as-is.
    pub fn collect(mut errors: Vec<SchemaError>) -> SchemaResult<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            count => Err(Self::ValidationFailed { count, errors }),
        }
    }
}
