//! Managed object naming and SQL identifier quoting.
//!
//! Constraints and indexes created by pgshift are named
//! `<table>_<hash>_pgshift_<suffix>`, so the content hash can be read back
//! from the catalog. Triggers keep their declared name with a `_pgshift_trg`
//! suffix and store their hash in a comment instead.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{SchemaError, SchemaResult};
use crate::hash::HASH_LEN;

/// Marker that identifies managed names.
pub const MANAGED_MARKER: &str = "_pgshift_";

/// Comment written on schemas owned by pgshift.
pub const SCHEMA_COMMENT: &str = "pgshift";

/// Suffix of managed trigger names.
pub const TRIGGER_SUFFIX: &str = "_pgshift_trg";

/// PostgreSQL truncates identifiers beyond this many bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

static MANAGED_NAME: LazyLock<Result<Regex, regex_lite::Error>> =
    LazyLock::new(|| Regex::new(r"^(.*)_([0-9a-f]{8})_pgshift_(pk|key|fk|chk|idx)$"));

/// Kind of hash-named object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Primary key constraint.
    PrimaryKey,
    /// Unique constraint.
    Unique,
    /// Foreign key constraint.
    ForeignKey,
    /// Check constraint.
    Check,
    /// Index.
    Index,
}

impl ObjectKind {
    /// Name suffix for this kind.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::PrimaryKey => "pk",
            Self::Unique => "key",
            Self::ForeignKey => "fk",
            Self::Check => "chk",
            Self::Index => "idx",
        }
    }

    /// Parse a name suffix.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "pk" => Some(Self::PrimaryKey),
            "key" => Some(Self::Unique),
            "fk" => Some(Self::ForeignKey),
            "chk" => Some(Self::Check),
            "idx" => Some(Self::Index),
            _ => None,
        }
    }

    /// Human readable description.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::PrimaryKey => "primary key",
            Self::Unique => "unique constraint",
            Self::ForeignKey => "foreign key",
            Self::Check => "check constraint",
            Self::Index => "index",
        }
    }
}

/// A parsed managed name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedName {
    /// Table segment (possibly truncated).
    pub table: String,
    /// Content hash.
    pub hash: String,
    /// Object kind.
    pub kind: ObjectKind,
}

/// Build the managed name for an object on `table` with the given hash.
pub fn managed_name(table: &str, hash: &str, kind: ObjectKind) -> String {
    let suffix = format!("_{}{}{}", hash, MANAGED_MARKER, kind.suffix());
    let budget = MAX_IDENTIFIER_LEN.saturating_sub(suffix.len());
    format!("{}{}", truncate_bytes(table, budget), suffix)
}

/// Resolve the SQL name of an entry keyed by `key`.
///
/// Managed entries are keyed by content hash; external entries keep the
/// catalog name as their key.
pub fn object_name(table: &str, key: &str, kind: ObjectKind) -> String {
    if crate::hash::is_content_hash(key) {
        managed_name(table, key, kind)
    } else {
        key.to_string()
    }
}

/// Parse a constraint or index name.
///
/// Returns `Ok(None)` for unmanaged names and an error when the name carries
/// the managed marker but does not follow the convention.
pub fn parse_managed_name(name: &str) -> SchemaResult<Option<ManagedName>> {
    match name.rsplit_once(MANAGED_MARKER) {
        Some((_, suffix)) if !suffix.contains('_') => {}
        _ => return Ok(None),
    }

    let pattern = MANAGED_NAME
        .as_ref()
        .map_err(|e| SchemaError::internal(format!("managed name pattern: {}", e)))?;

    let caps = pattern
        .captures(name)
        .ok_or_else(|| SchemaError::malformed("object", name))?;

    let kind = ObjectKind::from_suffix(&caps[3])
        .ok_or_else(|| SchemaError::malformed("object", name))?;
    debug_assert_eq!(caps[2].len(), HASH_LEN);

    Ok(Some(ManagedName {
        table: caps[1].to_string(),
        hash: caps[2].to_string(),
        kind,
    }))
}

/// Managed trigger name for a declared trigger.
pub fn trigger_name(name: &str) -> String {
    if name.ends_with(TRIGGER_SUFFIX) {
        truncate_bytes(name, MAX_IDENTIFIER_LEN).to_string()
    } else {
        let budget = MAX_IDENTIFIER_LEN - TRIGGER_SUFFIX.len();
        format!("{}{}", truncate_bytes(name, budget), TRIGGER_SUFFIX)
    }
}

/// Whether a trigger name follows the managed convention.
pub fn is_managed_trigger(name: &str) -> bool {
    name.ends_with(TRIGGER_SUFFIX)
}

/// Quote an SQL identifier.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote an SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Schema-qualified, quoted name.
pub fn qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(name))
}

/// A lexical piece of an SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    /// Bare or quoted identifier, with its folded name.
    Ident { raw: &'a str, name: String },
    /// Anything else, including string literals.
    Other(&'a str),
}

/// Split SQL into identifiers and everything else.
///
/// Bare words fold to lower case and quoted identifiers keep their case.
/// String literals and numbers are never identifiers.
fn tokenize(sql: &str) -> Vec<Token<'_>> {
    let bytes = sql.as_bytes();
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'\'' {
                    i += 1;
                }
                i += 1;
            }
            b'"' => {
                flush(&mut tokens, sql, start, i);
                let open = i;
                i += 1;
                loop {
                    match bytes.get(i) {
                        None => break,
                        Some(b'"') if bytes.get(i + 1) == Some(&b'"') => i += 2,
                        Some(b'"') => {
                            i += 1;
                            break;
                        }
                        Some(_) => i += 1,
                    }
                }
                let raw = &sql[open..i.min(bytes.len())];
                let inner = &raw[1..];
                let inner = inner.strip_suffix('"').unwrap_or(inner);
                tokens.push(Token::Ident {
                    raw,
                    name: inner.replace("\"\"", "\""),
                });
                start = i;
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                flush(&mut tokens, sql, start, i);
                let open = i;
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_' || bytes[i] == b'$') {
                    i += 1;
                }
                let raw = &sql[open..i];
                tokens.push(Token::Ident {
                    raw,
                    name: raw.to_ascii_lowercase(),
                });
                start = i;
            }
            b if b.is_ascii_digit() => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    flush(&mut tokens, sql, start, bytes.len());
    tokens
}

fn flush<'a>(tokens: &mut Vec<Token<'a>>, sql: &'a str, from: usize, to: usize) {
    if from < to {
        tokens.push(Token::Other(&sql[from..to]));
    }
}

/// Identifiers of an SQL text, in order.
pub fn identifiers(sql: &str) -> Vec<String> {
    tokenize(sql)
        .into_iter()
        .filter_map(|token| match token {
            Token::Ident { name, .. } => Some(name),
            Token::Other(_) => None,
        })
        .collect()
}

/// Rewrite identifiers of an SQL text.
///
/// Every identifier `rename` maps to a new name is replaced by the quoted
/// new name. String literals are left alone.
pub fn rename_identifiers(sql: &str, rename: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(sql.len());
    for token in tokenize(sql) {
        match token {
            Token::Ident { raw, name } => match rename(&name) {
                Some(to) => out.push_str(&quote_ident(&to)),
                None => out.push_str(raw),
            },
            Token::Other(text) => out.push_str(text),
        }
    }
    out
}

fn truncate_bytes(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_managed_name_roundtrip() {
        let name = managed_name("users", "0a1b2c3d", ObjectKind::ForeignKey);
        assert_eq!(name, "users_0a1b2c3d_pgshift_fk");

        let parsed = parse_managed_name(&name).unwrap().unwrap();
        assert_eq!(parsed.table, "users");
        assert_eq!(parsed.hash, "0a1b2c3d");
        assert_eq!(parsed.kind, ObjectKind::ForeignKey);
    }

    #[test]
    fn test_managed_name_truncates_table() {
        let table = "t".repeat(80);
        let name = managed_name(&table, "0a1b2c3d", ObjectKind::Index);
        assert_eq!(name.len(), MAX_IDENTIFIER_LEN);
        assert!(name.ends_with("_0a1b2c3d_pgshift_idx"));

        let parsed = parse_managed_name(&name).unwrap().unwrap();
        assert_eq!(parsed.hash, "0a1b2c3d");
    }

    #[test]
    fn test_unmanaged_name() {
        assert_eq!(parse_managed_name("users_pkey").unwrap(), None);
        assert_eq!(parse_managed_name("my_pgshift_things_pkey").unwrap(), None);
    }

    #[test]
    fn test_malformed_managed_name() {
        let err = parse_managed_name("users_XYZ_pgshift_pk").unwrap_err();
        assert!(matches!(err, SchemaError::MalformedManagedName { .. }));

        let err = parse_managed_name("users_0a1b2c3d_pgshift_zz").unwrap_err();
        assert!(matches!(err, SchemaError::MalformedManagedName { .. }));
    }

    #[test]
    fn test_object_name() {
        assert_eq!(
            object_name("users", "0a1b2c3d", ObjectKind::Check),
            "users_0a1b2c3d_pgshift_chk"
        );
        assert_eq!(
            object_name("users", "users_email_idx", ObjectKind::Index),
            "users_email_idx"
        );
    }

    #[test]
    fn test_rename_identifiers() {
        let rename = |name: &str| (name == "email").then(|| "email_address".to_string());
        assert_eq!(
            rename_identifiers("UNIQUE (\"email\", name)", rename),
            "UNIQUE (\"email_address\", name)"
        );
        assert_eq!(
            rename_identifiers("CHECK (Email <> 'email')", rename),
            "CHECK (\"email_address\" <> 'email')"
        );
        assert_eq!(
            rename_identifiers("CHECK (\"Email\" <> '')", rename),
            "CHECK (\"Email\" <> '')"
        );
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(
            identifiers("REFERENCES \"app\".Books (id) WHERE x > 1.5e3"),
            vec!["references", "app", "books", "id", "where", "x"]
        );
        assert_eq!(identifiers("'it''s' \"a\"\"b\""), vec!["a\"b"]);
    }

    #[test]
    fn test_trigger_name() {
        assert_eq!(trigger_name("touch"), "touch_pgshift_trg");
        assert_eq!(trigger_name("touch_pgshift_trg"), "touch_pgshift_trg");
        assert!(is_managed_trigger("touch_pgshift_trg"));
        assert!(!is_managed_trigger("audit"));
        assert!(!is_managed_trigger("audit_trg"));
    }

    #[test]
    fn test_quoting() {
        assert_eq!(quote_ident("user"), "\"user\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(quote_literal("it's"), "'it''s'");
        assert_eq!(qualified("app", "users"), "\"app\".\"users\"");
    }
}
