//! Canonical content hashing.
//!
//! Every hash-keyed entry in the information model is derived here, from the
//! semantic content of the object and never from its name. Both the
//! declarative builder and anything that needs to recompute a key go through
//! [`Canonical`], so equal semantics always produce the same key.
//!
//! A canonical form is a kind tag followed by named fields. Column sets that
//! carry no ordering meaning (primary keys, unique constraints) are sorted
//! before they are written; ordered lists (index columns) are kept as given.

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the SHA-256 digest.
pub const HASH_LEN: usize = 8;

/// Builder for a canonical form.
#[derive(Debug, Clone)]
pub struct Canonical {
    parts: Vec<String>,
}

impl Canonical {
    /// Start a canonical form for the given object kind.
    pub fn new(kind: &str) -> Self {
        Self {
            parts: vec![kind.to_string()],
        }
    }

    /// Append a scalar field.
    pub fn field(mut self, name: &str, value: impl std::fmt::Display) -> Self {
        self.parts.push(format!("{}={}", name, value));
        self
    }

    /// Append a column set; order does not matter.
    pub fn column_set<S: AsRef<str>>(mut self, name: &str, columns: &[S]) -> Self {
        let mut sorted: Vec<&str> = columns.iter().map(AsRef::as_ref).collect();
        sorted.sort_unstable();
        self.parts.push(format!("{}=[{}]", name, sorted.join(",")));
        self
    }

    /// Append an ordered list.
    pub fn list<S: AsRef<str>>(mut self, name: &str, items: &[S]) -> Self {
        let items: Vec<&str> = items.iter().map(AsRef::as_ref).collect();
        self.parts.push(format!("{}=[{}]", name, items.join(",")));
        self
    }

    /// Append a SQL fragment with insignificant whitespace collapsed.
    pub fn sql(self, name: &str, sql: &str) -> Self {
        let collapsed = collapse_whitespace(sql);
        self.field(name, collapsed)
    }

    /// The canonical text that gets hashed.
    pub fn text(&self) -> String {
        self.parts.join("|")
    }

    /// Finish into a short content hash.
    pub fn finish(&self) -> String {
        content_hash(&self.text())
    }
}

/// Hash arbitrary text into the short hex form used for keys.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..HASH_LEN].to_string()
}

/// Whether a string looks like a short content hash.
pub fn is_content_hash(value: &str) -> bool {
    value.len() == HASH_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Hash for a column default expression.
pub fn default_hash(sql: &str) -> String {
    Canonical::new("default").sql("expr", sql).finish()
}

/// Split a `hash:sql` trigger value into its parts.
pub fn split_trigger_value(value: &str) -> Option<(&str, &str)> {
    let (hash, sql) = value.split_once(':')?;
    is_content_hash(hash).then_some((hash, sql))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_column_set_is_order_independent() {
        let a = Canonical::new("unique").column_set("columns", &["b", "a"]).finish();
        let b = Canonical::new("unique").column_set("columns", &["a", "b"]).finish();
        assert_eq!(a, b);
    }

    #[test]
    fn test_list_is_order_dependent() {
        let a = Canonical::new("index").list("columns", &["b", "a"]).finish();
        let b = Canonical::new("index").list("columns", &["a", "b"]).finish();
        assert_ne!(a, b);
    }

    #[test]
    fn test_fields_change_hash() {
        let distinct = Canonical::new("unique")
            .column_set("columns", &["email"])
            .field("nulls_distinct", true)
            .finish();
        let not_distinct = Canonical::new("unique")
            .column_set("columns", &["email"])
            .field("nulls_distinct", false)
            .finish();
        assert_ne!(distinct, not_distinct);
    }

    #[test]
    fn test_sql_whitespace_is_insignificant() {
        let a = Canonical::new("check").sql("expr", "price  >\n 0").finish();
        let b = Canonical::new("check").sql("expr", "price > 0").finish();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_shape() {
        let hash = content_hash("anything");
        assert_eq!(hash.len(), HASH_LEN);
        assert!(is_content_hash(&hash));
        assert!(!is_content_hash("ABCDEF12"));
        assert!(!is_content_hash("abc"));
    }

    #[test]
    fn test_split_trigger_value() {
        let hash = content_hash("t");
        let value = format!("{}:CREATE TRIGGER x", hash);
        assert_eq!(
            split_trigger_value(&value),
            Some((hash.as_str(), "CREATE TRIGGER x"))
        );
        assert_eq!(split_trigger_value("nohash"), None);
        assert_eq!(split_trigger_value("zzzzzzzz:sql"), None);
    }
}
