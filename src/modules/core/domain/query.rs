//! Backend-agnostic query model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, UnibaseError};

/// Kind of operation a query performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

impl Operation {
    /// Returns true for insert/update/delete
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Operation::Select)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Select => "select",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend-agnostic description of one operation
///
/// Built once through the constructors and `with_*` builders, then only read.
/// Serializes to the wire shape
/// `{type, collection, fields, conditions, data, limit, offset}` with absent
/// optional fields omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericQuery {
    #[serde(rename = "type")]
    operation: Operation,

    /// Table, collection, cache key, file path, or API endpoint
    collection: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    fields: Vec<String>,

    /// Equality predicates, combined with AND
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    conditions: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    limit: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    offset: Option<u64>,
}

impl GenericQuery {
    /// Create a query of the given operation against a target
    pub fn new(operation: Operation, collection: impl Into<String>) -> Self {
        Self {
            operation,
            collection: collection.into(),
            fields: Vec::new(),
            conditions: BTreeMap::new(),
            data: None,
            limit: None,
            offset: None,
        }
    }

    pub fn select(collection: impl Into<String>) -> Self {
        Self::new(Operation::Select, collection)
    }

    pub fn insert(collection: impl Into<String>) -> Self {
        Self::new(Operation::Insert, collection)
    }

    pub fn update(collection: impl Into<String>) -> Self {
        Self::new(Operation::Update, collection)
    }

    pub fn delete(collection: impl Into<String>) -> Self {
        Self::new(Operation::Delete, collection)
    }

    /// Parse the JSON wire shape
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            UnibaseError::wrap(crate::ErrorKind::Query, "malformed generic query", e)
        })
    }

    /// Add a projected field
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    /// Add an equality condition
    pub fn with_condition(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(field.into(), value.into());
        self
    }

    /// Set one payload field
    pub fn with_value(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data
            .get_or_insert_with(Map::new)
            .insert(field.into(), value.into());
        self
    }

    /// Replace the whole payload
    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn conditions(&self) -> &BTreeMap<String, Value> {
        &self.conditions
    }

    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.data.as_ref()
    }

    /// Payload that must be present and non-empty (insert/update)
    pub fn require_data(&self) -> Result<&Map<String, Value>> {
        match &self.data {
            Some(data) if !data.is_empty() => Ok(data),
            _ => Err(UnibaseError::query(format!(
                "{} on '{}' requires a non-empty data payload",
                self.operation, self.collection
            ))),
        }
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// Conditions as a JSON object, the shape filter-based backends expect
    pub fn conditions_object(&self) -> Value {
        Value::Object(
            self.conditions
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}
