//! Root model configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ConnectorConfig;

fn default_name() -> String {
    "unibase".to_string()
}

/// Root configuration model: the set of named connectors to register
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Name of this deployment, used in logs
    #[serde(default = "default_name")]
    pub name: String,

    /// Connector configurations keyed by logical name
    #[serde(default)]
    pub connectors: BTreeMap<String, ConnectorConfig>,
}

impl Model {
    /// Create a new empty model with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connectors: BTreeMap::new(),
        }
    }

    /// Add a connector configuration
    pub fn with_connector(mut self, name: impl Into<String>, config: ConnectorConfig) -> Self {
        self.connectors.insert(name.into(), config);
        self
    }

    /// Find a connector configuration by name
    pub fn find_connector(&self, name: &str) -> Option<&ConnectorConfig> {
        self.connectors.get(name)
    }

    /// Names of all configured connectors, sorted
    pub fn connector_names(&self) -> Vec<&str> {
        self.connectors.keys().map(String::as_str).collect()
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new(default_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unibase_types::ConnectorKind;

    #[test]
    fn test_model_new() {
        let model = Model::new("orders");
        assert_eq!(model.name, "orders");
        assert!(model.connectors.is_empty());
    }

    #[test]
    fn test_model_find_connector() {
        let model = Model::default()
            .with_connector("files", ConnectorConfig::new(ConnectorKind::File))
            .with_connector("cache", ConnectorConfig::new(ConnectorKind::Cache));

        assert_eq!(model.name, "unibase");
        assert_eq!(model.connector_names(), vec!["cache", "files"]);
        assert_eq!(
            model.find_connector("files").map(|c| c.kind),
            Some(ConnectorKind::File)
        );
        assert!(model.find_connector("missing").is_none());
    }
}
