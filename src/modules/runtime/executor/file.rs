//! Generic query to a file read, with in-memory row filtering

use serde_json::Value;
use std::collections::BTreeMap;
use unibase_core::{GenericQuery, Operation, Result, UnibaseError};
use unibase_types::{Record, Records};

use super::Plan;

/// Row filtering the file backend cannot do natively
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowFilter {
    conditions: BTreeMap<String, Value>,
    fields: Vec<String>,
    offset: Option<u64>,
    limit: Option<u64>,
}

impl RowFilter {
    fn from_query(query: &GenericQuery) -> Option<Self> {
        let filter = Self {
            conditions: query.conditions().clone(),
            fields: query.fields().to_vec(),
            offset: query.offset(),
            limit: query.limit(),
        };
        (filter != Self::default()).then_some(filter)
    }

    /// Keep matching rows, skip `offset`, take `limit`, then project `fields`
    pub fn apply(&self, rows: Records) -> Records {
        let skip = self.offset.map_or(0, saturating_usize);
        let take = self.limit.map_or(usize::MAX, saturating_usize);

        rows.into_iter()
            .filter(|row| self.matches(row))
            .skip(skip)
            .take(take)
            .map(|row| self.project(row))
            .collect()
    }

    fn matches(&self, row: &Record) -> bool {
        self.conditions
            .iter()
            .all(|(field, wanted)| field_equals(row.get(field), wanted))
    }

    fn project(&self, row: Record) -> Record {
        if self.fields.is_empty() {
            return row;
        }
        row.into_iter()
            .filter(|(key, _)| self.fields.contains(key))
            .collect()
    }
}

/// Offsets and limits beyond the address space mean "all of them"
fn saturating_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

/// CSV cells are strings, so a string cell also matches the condition's text form
fn field_equals(actual: Option<&Value>, wanted: &Value) -> bool {
    match (actual, wanted) {
        (None, Value::Null) => true,
        (None, _) => false,
        (Some(actual), wanted) if actual == wanted => true,
        (Some(Value::String(text)), Value::Number(n)) => text.trim() == n.to_string(),
        (Some(Value::String(text)), Value::Bool(b)) => text.trim().eq_ignore_ascii_case(&b.to_string()),
        _ => false,
    }
}

pub(super) fn translate(query: &GenericQuery) -> Result<Plan> {
    if query.operation() != Operation::Select {
        return Err(UnibaseError::unsupported(format!(
            "file connector does not support {}",
            query.operation()
        )));
    }
    let mut plan = Plan::query(query.collection(), Vec::new());
    plan.filter = RowFilter::from_query(query);
    Ok(plan)
}
