//! Configuration parsing for Unibase
//!
//! This crate handles parsing of YAML connector configuration files,
//! validation, and environment variable substitution.

pub mod env;
pub mod validator;
pub mod yaml;

pub use validator::ConfigValidator;
pub use yaml::YamlParser;

use unibase_core::{Model, UnibaseError};

/// Parse a configuration file from a path
pub fn parse_file(path: &str) -> Result<Model, UnibaseError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        UnibaseError::configuration(format!("Failed to read file '{}': {}", path, e))
    })?;

    parse_string(&content)
}

/// Parse a configuration from a string
pub fn parse_string(content: &str) -> Result<Model, UnibaseError> {
    // Parse YAML
    let model = YamlParser::parse(content)?;

    // Validate configuration
    let validator = ConfigValidator::new();
    validator.validate(&model)?;

    tracing::debug!(
        name = %model.name,
        connectors = model.connectors.len(),
        "configuration loaded"
    );
    Ok(model)
}
