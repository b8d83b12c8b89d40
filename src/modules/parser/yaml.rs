//! YAML configuration parser

use serde::Deserialize;
use std::collections::BTreeMap;
use unibase_core::{ConnectorConfig, Model, UnibaseError};

use crate::env::EnvSubstitutor;

/// YAML parser for Unibase configuration files
pub struct YamlParser;

/// List-style schema: `connectors: [{ name: ..., kind: ... }]`.
///
/// Accepted alongside the map form so configs generated by other tools load.
#[derive(Debug, Deserialize)]
struct ListConfig {
    #[serde(default)]
    name: Option<String>,

    #[serde(default)]
    connectors: Vec<NamedConnector>,
}

#[derive(Debug, Deserialize)]
struct NamedConnector {
    name: String,

    #[serde(flatten)]
    config: ConnectorConfig,
}

impl YamlParser {
    /// Parse a YAML string into a Model
    pub fn parse(content: &str) -> Result<Model, UnibaseError> {
        // Substitute environment variables before parsing so credentials
        // never have to live in the file
        let substitutor = EnvSubstitutor::new();
        let substituted = substitutor.substitute(content)?;

        Self::parse_raw(&substituted)
    }

    /// Parse a YAML string without environment variable substitution
    pub fn parse_raw(content: &str) -> Result<Model, UnibaseError> {
        let map_err = match serde_yaml::from_str::<Model>(content) {
            Ok(model) => return Ok(model),
            Err(e) => e,
        };

        // Fall back to the list schema; report the map-schema error if both fail,
        // since that is the documented form
        match serde_yaml::from_str::<ListConfig>(content) {
            Ok(list) => list_to_model(list),
            Err(_) => Err(UnibaseError::wrap(
                unibase_core::ErrorKind::Configuration,
                "YAML parse error",
                map_err,
            )),
        }
    }
}

fn list_to_model(cfg: ListConfig) -> Result<Model, UnibaseError> {
    let mut connectors = BTreeMap::new();
    for entry in cfg.connectors {
        if connectors.contains_key(&entry.name) {
            return Err(UnibaseError::configuration(format!(
                "Duplicate connector name: '{}'",
                entry.name
            )));
        }
        connectors.insert(entry.name, entry.config);
    }

    let mut model = Model::default();
    if let Some(name) = cfg.name {
        model.name = name;
    }
    model.connectors = connectors;
    Ok(model)
}
