//! Structural diffing of information models.
//!
//! Both models are lowered into a plain [`Node`] tree and compared key by
//! key. The differ knows nothing about tables or constraints; it only
//! reports which paths were created, removed or changed. Giving those paths
//! meaning is the job of [`crate::change`].
//!
//! ```text
//! root
//! ├── extensions/<name>                     true
//! ├── schemas/<name>                        true
//! └── schema/<name>
//!     ├── tables/<table>/columns/<column>
//!     │   ├── dataType                      "character varying(255)"
//!     │   ├── isNullable                    false
//!     │   ├── defaultValue                  "<hash>" | null
//!     │   └── identity                      "ALWAYS" | null
//!     ├── primaryKey|unique|foreignKey|check|index|trigger
//!     │   └── <table>/<key>                 "<definition>"
//!     └── enums/<name>                      "a,b,c"
//! ```

use std::collections::{BTreeMap, BTreeSet};

use pgshift_schema::{ColumnInfo, DatabaseInfo, EntryKind, SchemaInfo};

/// A leaf value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// String.
    Str(String),
    /// Boolean.
    Bool(bool),
    /// Explicit absence.
    Null,
}

impl Value {
    /// The string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// A node of the lowered tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Keyed children.
    Branch(BTreeMap<String, Node>),
    /// Scalar value.
    Leaf(Value),
}

impl Node {
    fn str(value: impl Into<String>) -> Self {
        Self::Leaf(Value::Str(value.into()))
    }

    fn bool(value: bool) -> Self {
        Self::Leaf(Value::Bool(value))
    }

    fn opt(value: Option<impl Into<String>>) -> Self {
        match value {
            Some(v) => Self::str(v),
            None => Self::Leaf(Value::Null),
        }
    }

    /// Children of a branch; empty for leaves.
    pub fn children(&self) -> impl Iterator<Item = (&String, &Node)> {
        let map = match self {
            Self::Branch(map) => Some(map),
            Self::Leaf(_) => None,
        };
        map.into_iter().flat_map(|m| m.iter())
    }

    /// Leaf value, if this is a leaf.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Leaf(v) => Some(v),
            Self::Branch(_) => None,
        }
    }
}

/// What happened at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    /// Present locally only.
    Create,
    /// Present remotely only.
    Remove,
    /// Present on both sides with different values.
    Change,
}

/// One raw difference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDiff {
    /// Kind of difference.
    pub kind: DiffKind,
    /// Path from the root.
    pub path: Vec<String>,
    /// Local value (create, change).
    pub value: Option<Node>,
    /// Remote value (remove, change).
    pub old_value: Option<Node>,
}

impl RawDiff {
    /// Path segments as string slices.
    pub fn segments(&self) -> Vec<&str> {
        self.path.iter().map(String::as_str).collect()
    }
}

/// Lower a model into a tree, giving every schema in `schema_names` a
/// subtree even when the model does not contain it.
pub fn lower(info: &DatabaseInfo, schema_names: &BTreeSet<String>) -> Node {
    let mut root = BTreeMap::new();

    root.insert(
        "extensions".to_string(),
        Node::Branch(
            info.extensions
                .iter()
                .map(|e| (e.clone(), Node::bool(true)))
                .collect(),
        ),
    );
    root.insert(
        "schemas".to_string(),
        Node::Branch(
            info.schemas
                .keys()
                .map(|s| (s.clone(), Node::bool(true)))
                .collect(),
        ),
    );

    let empty = SchemaInfo::default();
    let schemas = schema_names
        .iter()
        .map(|name| {
            let schema = info.schemas.get(name).unwrap_or(&empty);
            (name.clone(), lower_schema(schema))
        })
        .collect();
    root.insert("schema".to_string(), Node::Branch(schemas));

    Node::Branch(root)
}

fn lower_schema(schema: &SchemaInfo) -> Node {
    let mut map = BTreeMap::new();

    let tables = schema
        .tables
        .iter()
        .map(|(name, table)| {
            let columns = table
                .columns
                .iter()
                .map(|(c, info)| (c.clone(), lower_column(info)))
                .collect();
            let mut node = BTreeMap::new();
            node.insert("columns".to_string(), Node::Branch(columns));
            (name.clone(), Node::Branch(node))
        })
        .collect();
    map.insert("tables".to_string(), Node::Branch(tables));

    for kind in EntryKind::ALL {
        let per_table = schema
            .entries(kind)
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(table, entries)| {
                let entries = entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Node::str(v.clone())))
                    .collect();
                (table.clone(), Node::Branch(entries))
            })
            .collect();
        map.insert(kind.tree_key().to_string(), Node::Branch(per_table));
    }

    map.insert(
        "enums".to_string(),
        Node::Branch(
            schema
                .enums
                .iter()
                .map(|(name, values)| (name.clone(), Node::str(values.clone())))
                .collect(),
        ),
    );

    Node::Branch(map)
}

fn lower_column(column: &ColumnInfo) -> Node {
    let mut map = BTreeMap::new();
    map.insert("dataType".to_string(), Node::str(column.data_type.clone()));
    map.insert("isNullable".to_string(), Node::bool(column.is_nullable));
    map.insert(
        "defaultValue".to_string(),
        Node::opt(column.default_value.as_ref().map(|d| d.hash.clone())),
    );
    map.insert(
        "identity".to_string(),
        Node::opt(column.identity.map(|i| i.as_sql())),
    );
    Node::Branch(map)
}

/// Diff two trees.
pub fn diff_nodes(local: &Node, remote: &Node) -> Vec<RawDiff> {
    let mut out = Vec::new();
    let mut path = Vec::new();
    walk(local, remote, &mut path, &mut out);
    out
}

fn walk(local: &Node, remote: &Node, path: &mut Vec<String>, out: &mut Vec<RawDiff>) {
    match (local, remote) {
        (Node::Branch(l), Node::Branch(r)) => {
            let keys: BTreeSet<&String> = l.keys().chain(r.keys()).collect();
            for key in keys {
                path.push(key.clone());
                match (l.get(key), r.get(key)) {
                    (Some(lv), Some(rv)) => walk(lv, rv, path, out),
                    (Some(lv), None) => out.push(RawDiff {
                        kind: DiffKind::Create,
                        path: path.clone(),
                        value: Some(lv.clone()),
                        old_value: None,
                    }),
                    (None, Some(rv)) => out.push(RawDiff {
                        kind: DiffKind::Remove,
                        path: path.clone(),
                        value: None,
                        old_value: Some(rv.clone()),
                    }),
                    (None, None) => {}
                }
                path.pop();
            }
        }
        (l, r) if l == r => {}
        (l, r) => out.push(RawDiff {
            kind: DiffKind::Change,
            path: path.clone(),
            value: Some(l.clone()),
            old_value: Some(r.clone()),
        }),
    }
}

/// Compares a target model with the current one.
#[derive(Debug)]
pub struct SchemaDiffer<'a> {
    local: &'a DatabaseInfo,
    remote: &'a DatabaseInfo,
}

impl<'a> SchemaDiffer<'a> {
    /// Create a differ.
    pub fn new(local: &'a DatabaseInfo, remote: &'a DatabaseInfo) -> Self {
        Self { local, remote }
    }

    /// Compute the raw differences, in sorted path order.
    pub fn diff(&self) -> Vec<RawDiff> {
        let names: BTreeSet<String> = self
            .local
            .schemas
            .keys()
            .chain(self.remote.schemas.keys())
            .cloned()
            .collect();
        diff_nodes(&lower(self.local, &names), &lower(self.remote, &names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgshift_schema::{TableInfo, model::ColumnInfo as Column};
    use pretty_assertions::assert_eq;

    fn users() -> DatabaseInfo {
        DatabaseInfo::new().with_schema(
            SchemaInfo::new("app")
                .with_table(
                    "users",
                    TableInfo::new()
                        .with_column("id", Column::new("integer").not_null())
                        .with_column("name", Column::new("text")),
                )
                .with_entry(EntryKind::PrimaryKey, "users", "0a1b2c3d", "PRIMARY KEY (\"id\")"),
        )
    }

    fn paths(diffs: &[RawDiff]) -> Vec<(DiffKind, String)> {
        diffs.iter().map(|d| (d.kind, d.path.join("/"))).collect()
    }

    #[test]
    fn test_self_diff_is_empty() {
        let db = users();
        assert!(SchemaDiffer::new(&db, &db).diff().is_empty());
    }

    #[test]
    fn test_new_schema_diffs_per_table() {
        let local = users();
        let remote = DatabaseInfo::new();
        let diffs = SchemaDiffer::new(&local, &remote).diff();

        assert_eq!(
            paths(&diffs),
            vec![
                (DiffKind::Create, "schema/app/primaryKey/users".to_string()),
                (DiffKind::Create, "schema/app/tables/users".to_string()),
                (DiffKind::Create, "schemas/app".to_string()),
            ]
        );
    }

    #[test]
    fn test_column_changes() {
        let local = users();
        let mut remote = users();
        remote
            .schema_mut("app")
            .tables
            .get_mut("users")
            .unwrap()
            .columns
            .insert("name".to_string(), Column::new("text").not_null().default_sql("''"));

        let diffs = SchemaDiffer::new(&local, &remote).diff();
        assert_eq!(
            paths(&diffs),
            vec![
                (
                    DiffKind::Change,
                    "schema/app/tables/users/columns/name/defaultValue".to_string()
                ),
                (
                    DiffKind::Change,
                    "schema/app/tables/users/columns/name/isNullable".to_string()
                ),
            ]
        );
        assert_eq!(diffs[0].value, Some(Node::Leaf(Value::Null)));
    }

    #[test]
    fn test_entry_changes() {
        let local = users();
        let mut remote = users();
        remote
            .schema_mut("app")
            .primary_keys
            .get_mut("users")
            .unwrap()
            .insert("ffffffff".to_string(), "PRIMARY KEY (\"name\")".to_string());

        let diffs = SchemaDiffer::new(&local, &remote).diff();
        assert_eq!(
            paths(&diffs),
            vec![(
                DiffKind::Remove,
                "schema/app/primaryKey/users/ffffffff".to_string()
            )]
        );
    }
}
