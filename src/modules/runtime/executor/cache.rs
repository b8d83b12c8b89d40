//! Generic query to cache GET / SET / DEL

use serde_json::Value;
use unibase_core::{GenericQuery, Operation, Result, UnibaseError};

use super::Plan;

pub(super) fn translate(query: &GenericQuery) -> Result<Plan> {
    let key = query.collection().trim();
    if key.is_empty() {
        return Err(UnibaseError::query("cache query requires a key"));
    }

    match query.operation() {
        Operation::Select => Ok(Plan::query(key, Vec::new())),
        Operation::Insert | Operation::Update => {
            let payload = serde_json::to_string(query.require_data()?)?;
            Ok(Plan::execute(
                "SET",
                vec![Value::String(key.to_string()), Value::String(payload)],
            ))
        }
        Operation::Delete => Ok(Plan::execute("DEL", vec![Value::String(key.to_string())])),
    }
}
