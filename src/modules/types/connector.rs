//! Connector kind definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported backend kinds
///
/// This is a closed set: every connector the runtime can build is exactly one
/// of these, and query translation dispatches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ConnectorKind {
    /// Relational database (PostgreSQL, MySQL, SQLite)
    Sql,
    /// Document store (MongoDB)
    Document,
    /// Key-value cache (Redis)
    Cache,
    /// Flat files (JSON, CSV) under a base directory
    File,
    /// Remote HTTP / WebSocket API
    Api,
}

impl fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectorKind::Sql => write!(f, "sql"),
            ConnectorKind::Document => write!(f, "document"),
            ConnectorKind::Cache => write!(f, "cache"),
            ConnectorKind::File => write!(f, "file"),
            ConnectorKind::Api => write!(f, "api"),
        }
    }
}

impl FromStr for ConnectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sql" | "postgres" | "postgresql" | "mysql" | "sqlite" => Ok(ConnectorKind::Sql),
            "document" | "mongodb" | "mongo" => Ok(ConnectorKind::Document),
            "cache" | "redis" => Ok(ConnectorKind::Cache),
            "file" => Ok(ConnectorKind::File),
            "api" | "http" | "websocket" => Ok(ConnectorKind::Api),
            _ => Err(format!("unsupported connector type: {}", s)),
        }
    }
}

impl TryFrom<String> for ConnectorKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl ConnectorKind {
    /// Returns all supported connector kinds
    pub fn all() -> &'static [ConnectorKind] {
        &[
            ConnectorKind::Sql,
            ConnectorKind::Document,
            ConnectorKind::Cache,
            ConnectorKind::File,
            ConnectorKind::Api,
        ]
    }

    /// Returns true if this backend has any notion of a transaction
    pub fn supports_transactions(&self) -> bool {
        matches!(
            self,
            ConnectorKind::Sql | ConnectorKind::Document | ConnectorKind::Cache
        )
    }

    /// Returns true if this backend accepts mutations
    pub fn is_writable(&self) -> bool {
        !matches!(self, ConnectorKind::File)
    }
}
