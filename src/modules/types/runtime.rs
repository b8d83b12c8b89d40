//! Runtime type definitions for request/response handling

use serde::{Deserialize, Serialize};

use crate::record::Records;

/// Query execution response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Whether the query succeeded
    pub success: bool,
    /// Error message if the query failed
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    /// Query results
    #[serde(default)]
    pub results: Records,
}

impl QueryResponse {
    /// Create a successful response with results
    pub fn success(results: Records) -> Self {
        Self {
            success: true,
            error: String::new(),
            results,
        }
    }

    /// Create an error response
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
            results: Vec::new(),
        }
    }
}

/// Health of a single named connector, as reported by status checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorStatus {
    /// Registered connector name
    pub name: String,
    /// Connector kind (`sql`, `document`, ...)
    pub kind: String,
    /// Whether the last ping succeeded
    pub healthy: bool,
    /// Failure detail when unhealthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_query_response_success() {
        let results = vec![{
            let mut map = HashMap::new();
            map.insert("id".to_string(), serde_json::json!(1));
            map.insert("name".to_string(), serde_json::json!("test"));
            map
        }];

        let response = QueryResponse::success(results.clone());
        assert!(response.success);
        assert!(response.error.is_empty());
        assert_eq!(response.results, results);
    }

    #[test]
    fn test_query_response_error() {
        let response = QueryResponse::error("Something went wrong");
        assert!(!response.success);
        assert_eq!(response.error, "Something went wrong");
        assert!(response.results.is_empty());

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"], "Something went wrong");
    }

    #[test]
    fn test_connector_status_omits_empty_detail() {
        let status = ConnectorStatus {
            name: "main".to_string(),
            kind: "sql".to_string(),
            healthy: true,
            detail: None,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(!json.contains("detail"));
    }
}
