//! Configuration validation

use once_cell::sync::Lazy;
use regex::Regex;
use unibase_core::{Model, UnibaseError};

/// Regex pattern for valid names (lower-kebab-case or lower_snake_case)
static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z][a-z0-9]*(?:[-_][a-z0-9]+)*$").expect("name pattern is valid")
});

/// Configuration validator
pub struct ConfigValidator {
    /// Whether to validate names strictly
    strict_names: bool,
}

impl ConfigValidator {
    /// Create a new validator with default settings
    pub fn new() -> Self {
        Self { strict_names: true }
    }

    /// Create a validator with lenient name checking
    pub fn lenient() -> Self {
        Self {
            strict_names: false,
        }
    }

    /// Validate the entire model configuration
    pub fn validate(&self, model: &Model) -> Result<(), UnibaseError> {
        if model.name.trim().is_empty() {
            return Err(UnibaseError::configuration("Model name cannot be empty"));
        }

        for (name, config) in &model.connectors {
            self.validate_connector_name(name)?;
            config
                .validate()
                .map_err(|e| e.with_context("connector", name))?;
        }

        Ok(())
    }

    /// Validate a connector name
    fn validate_connector_name(&self, name: &str) -> Result<(), UnibaseError> {
        if name.is_empty() {
            return Err(UnibaseError::configuration(
                "Connector name cannot be empty",
            ));
        }

        if self.strict_names && !NAME_PATTERN.is_match(name) {
            return Err(UnibaseError::configuration(format!(
                "Invalid connector name '{}': must be lower-kebab-case or lower_snake_case",
                name
            )));
        }

        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use unibase_core::{ConnectorConfig, ErrorKind};
    use unibase_types::ConnectorKind;

    fn file_config() -> ConnectorConfig {
        let mut config = ConnectorConfig::new(ConnectorKind::File);
        config.base_path = Some(PathBuf::from("/srv/data"));
        config
    }

    #[test]
    fn test_valid_model() {
        let model = Model::new("test-api").with_connector("exports", file_config());
        assert!(ConfigValidator::new().validate(&model).is_ok());
    }

    #[test]
    fn test_invalid_connector_name() {
        let model = Model::new("test-api").with_connector("Main DB", file_config());

        assert!(ConfigValidator::new().validate(&model).is_err());
        assert!(ConfigValidator::lenient().validate(&model).is_ok());
    }

    #[test]
    fn test_invalid_connector_config_names_connector() {
        let model = Model::new("test-api")
            .with_connector("cache", ConnectorConfig::new(ConnectorKind::Cache));

        let err = ConfigValidator::new().validate(&model).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.context_value("connector"), Some("cache"));
    }

    #[test]
    fn test_empty_model_name() {
        let model = Model::new("  ");
        assert!(ConfigValidator::new().validate(&model).is_err());
    }
}
