//! Type changes that never rewrite the table or take a long lock.
//!
//! The list is deliberately short. Anything not matched here is treated as
//! blocking.

use pgshift_schema::types::DataType;

/// Whether altering a column from `from` to `to` is known to be cheap.
pub fn is_safe_type_change(from: &str, to: &str) -> bool {
    let from = DataType::parse(from);
    let to = DataType::parse(to);

    if from == to {
        return true;
    }
    if from.array != to.array {
        return false;
    }

    match (from.base.as_str(), to.base.as_str()) {
        ("character varying", "character varying") => widens(from.length(), to.length()),
        ("character varying" | "character", "text") => true,
        ("numeric", "numeric") => match (from.args.as_slice(), to.args.as_slice()) {
            (_, []) => true,
            ([], _) => false,
            _ => from.scale() == to.scale() && widens(from.precision(), to.precision()),
        },
        ("timestamp", "timestamp") | ("time", "time") => {
            if from.time_zone != to.time_zone {
                // Zone conversion only; the stored value is not rewritten when
                // precision stays the same.
                from.precision() == to.precision()
            } else {
                widens(from.precision(), to.precision())
            }
        }
        ("cidr", "inet") => true,
        ("bit varying", "bit varying") => widens(from.length(), to.length()),
        _ => false,
    }
}

/// `None` means unlimited.
fn widens(from: Option<u32>, to: Option<u32>) -> bool {
    match (from, to) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(a), Some(b)) => b >= a,
    }
}
