//! Generic record shape shared by every backend

use serde_json::Value;
use std::collections::HashMap;

/// A single row/document/entry: field name to dynamically-typed value.
pub type Record = HashMap<String, Value>;

/// Result set returned by every connector's `query`.
pub type Records = Vec<Record>;

/// Field name used for the affected-count record returned by mutations.
pub const AFFECTED_FIELD: &str = "affected";

/// Build the single-record result set reporting an affected-item count.
pub fn affected_record(count: u64) -> Records {
    let mut row = Record::new();
    row.insert(AFFECTED_FIELD.to_string(), Value::from(count));
    vec![row]
}

/// Convert a JSON object into a record. Non-objects yield `None`.
pub fn record_from_value(value: Value) -> Option<Record> {
    match value {
        Value::Object(map) => Some(map.into_iter().collect()),
        _ => None,
    }
}
