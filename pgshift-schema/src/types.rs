//! Canonical column type names.
//!
//! Declared types are normalized to the spelling `format_type()` reports in
//! the catalog (`varchar(20)` becomes `character varying(20)`, `timestamptz`
//! becomes `timestamp with time zone`), so declarative and introspected
//! columns compare as plain strings.

use serde::{Deserialize, Serialize};

/// Normalize a declared type name into its canonical catalog spelling.
pub fn normalize_type(raw: &str) -> String {
    let lowered = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();

    let (body, array) = match lowered.strip_suffix("[]") {
        Some(body) => (body.trim_end().to_string(), true),
        None => (lowered, false),
    };

    let normalized = normalize_scalar(&body);
    if array {
        format!("{}[]", normalized)
    } else {
        normalized
    }
}

fn normalize_scalar(body: &str) -> String {
    let (head, args, tail) = split_modifiers(body);
    let args = args.map(|a| {
        a.split(',')
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(",")
    });
    let with_args = |base: &str| match &args {
        Some(a) => format!("{}({})", base, a),
        None => base.to_string(),
    };

    match (head.as_str(), tail.as_str()) {
        ("int" | "int4" | "integer", "") => "integer".into(),
        ("int2" | "smallint", "") => "smallint".into(),
        ("int8" | "bigint", "") => "bigint".into(),
        ("serial" | "serial4", "") => "serial".into(),
        ("bigserial" | "serial8", "") => "bigserial".into(),
        ("smallserial" | "serial2", "") => "smallserial".into(),
        ("float8" | "double precision", "") => "double precision".into(),
        ("float4" | "real", "") => "real".into(),
        ("bool" | "boolean", "") => "boolean".into(),
        ("varchar" | "character varying", "") => with_args("character varying"),
        ("char" | "character" | "bpchar", "") => match &args {
            Some(a) => format!("character({})", a),
            None => "character(1)".into(),
        },
        ("decimal" | "numeric", "") => with_args("numeric"),
        ("varbit" | "bit varying", "") => with_args("bit varying"),
        ("timestamptz", "") => time_type("timestamp", &args, true),
        ("timestamp", "" | "without time zone") => time_type("timestamp", &args, false),
        ("timestamp", "with time zone") => time_type("timestamp", &args, true),
        ("timetz", "") => time_type("time", &args, true),
        ("time", "" | "without time zone") => time_type("time", &args, false),
        ("time", "with time zone") => time_type("time", &args, true),
        (head, "") => with_args(head),
        (head, tail) => format!("{} {}", with_args(head), tail),
    }
}

fn time_type(base: &str, args: &Option<String>, with_tz: bool) -> String {
    let zone = if with_tz {
        "with time zone"
    } else {
        "without time zone"
    };
    match args {
        Some(a) => format!("{}({}) {}", base, a, zone),
        None => format!("{} {}", base, zone),
    }
}

/// Split `name(args) tail` into its three parts.
fn split_modifiers(body: &str) -> (String, Option<String>, String) {
    match (body.find('('), body.find(')')) {
        (Some(open), Some(close)) if close > open => (
            body[..open].trim().to_string(),
            Some(body[open + 1..close].to_string()),
            body[close + 1..].trim().to_string(),
        ),
        _ => {
            // Multi-word types without modifiers ("timestamp with time zone").
            for base in ["timestamp", "time"] {
                if let Some(rest) = body.strip_prefix(base) {
                    if rest.starts_with(' ') {
                        return (base.to_string(), None, rest.trim().to_string());
                    }
                }
            }
            (body.trim().to_string(), None, String::new())
        }
    }
}

/// A parsed canonical type name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataType {
    /// Base type name without modifiers (`character varying`, `numeric`).
    pub base: String,
    /// Numeric type modifiers, in declaration order.
    pub args: Vec<u32>,
    /// Time zone awareness for `time` and `timestamp`.
    pub time_zone: Option<bool>,
    /// Whether this is an array type.
    pub array: bool,
}

impl DataType {
    /// Parse a canonical type name.
    pub fn parse(canonical: &str) -> Self {
        let normalized = normalize_type(canonical);
        let (body, array) = match normalized.strip_suffix("[]") {
            Some(body) => (body.to_string(), true),
            None => (normalized, false),
        };
        let (base, args, tail) = split_modifiers(&body);
        let args = args
            .map(|a| a.split(',').filter_map(|p| p.trim().parse().ok()).collect())
            .unwrap_or_default();
        let time_zone = match tail.as_str() {
            "with time zone" => Some(true),
            "without time zone" => Some(false),
            _ => None,
        };

        Self {
            base,
            args,
            time_zone,
            array,
        }
    }

    /// Whether this is a character string type with a length modifier slot.
    pub fn is_character(&self) -> bool {
        matches!(self.base.as_str(), "character varying" | "character")
    }

    /// Whether this is `time` or `timestamp`.
    pub fn is_temporal(&self) -> bool {
        matches!(self.base.as_str(), "time" | "timestamp")
    }

    /// Length modifier of character and bit string types.
    pub fn length(&self) -> Option<u32> {
        match self.base.as_str() {
            "character varying" | "character" | "bit varying" | "bit" => self.args.first().copied(),
            _ => None,
        }
    }

    /// Precision of numeric and temporal types.
    pub fn precision(&self) -> Option<u32> {
        match self.base.as_str() {
            "numeric" | "time" | "timestamp" | "interval" => self.args.first().copied(),
            _ => None,
        }
    }

    /// Scale of numeric types.
    pub fn scale(&self) -> Option<u32> {
        if self.base == "numeric" {
            // numeric(p) means numeric(p,0)
            match self.args.as_slice() {
                [_, scale] => Some(*scale),
                [_] => Some(0),
                _ => None,
            }
        } else {
            None
        }
    }
}
