//! Environment variable substitution

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use unibase_core::UnibaseError;

/// Placeholder pattern: `{{ env.VAR_NAME }}` or `{{ env.VAR_NAME | fallback }}`
static ENV_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*env\.([A-Za-z_][A-Za-z0-9_]*)\s*(?:\|\s*([^}]*?)\s*)?\}\}")
        .expect("env placeholder pattern is valid")
});

/// Environment variable substitutor
pub struct EnvSubstitutor {
    /// Whether to fail on missing environment variables without a fallback
    strict: bool,
}

impl EnvSubstitutor {
    /// Create a new substitutor with strict mode (fails on missing vars)
    pub fn new() -> Self {
        Self { strict: true }
    }

    /// Create a new substitutor with lenient mode (leaves placeholders for missing vars)
    pub fn lenient() -> Self {
        Self { strict: false }
    }

    /// Substitute environment variables in the given content
    pub fn substitute(&self, content: &str) -> Result<String, UnibaseError> {
        // A missing .env file is not an error
        let _ = dotenvy::dotenv();

        let mut missing: Vec<String> = Vec::new();
        let result = ENV_PATTERN.replace_all(content, |cap: &Captures<'_>| {
            let var_name = &cap[1];
            match (std::env::var(var_name), cap.get(2)) {
                (Ok(value), _) => value,
                (Err(_), Some(fallback)) => fallback.as_str().to_string(),
                (Err(_), None) => {
                    if self.strict {
                        missing.push(var_name.to_string());
                    }
                    cap[0].to_string()
                }
            }
        });

        if !missing.is_empty() {
            return Err(UnibaseError::configuration(format!(
                "Environment variable not found: {}",
                missing.join(", ")
            )));
        }

        Ok(result.into_owned())
    }
}

impl Default for EnvSubstitutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_with_env_var() {
        std::env::set_var("UNIBASE_TEST_VAR", "test_value");
        let substitutor = EnvSubstitutor::new();
        let result = substitutor
            .substitute("value: {{ env.UNIBASE_TEST_VAR }}")
            .unwrap();
        assert_eq!(result, "value: test_value");
        std::env::remove_var("UNIBASE_TEST_VAR");
    }

    #[test]
    fn test_substitute_fallback() {
        let substitutor = EnvSubstitutor::new();
        let result = substitutor
            .substitute("port: {{ env.UNIBASE_UNSET_PORT_12345 | 6379 }}")
            .unwrap();
        assert_eq!(result, "port: 6379");
    }

    #[test]
    fn test_substitute_missing_var_strict() {
        let substitutor = EnvSubstitutor::new();
        let err = substitutor
            .substitute("{{ env.NONEXISTENT_VAR_12345 }}")
            .unwrap_err();
        assert!(err.to_string().contains("NONEXISTENT_VAR_12345"));
    }

    #[test]
    fn test_substitute_missing_var_lenient() {
        let substitutor = EnvSubstitutor::lenient();
        let result = substitutor
            .substitute("{{ env.NONEXISTENT_VAR_12345 }}")
            .unwrap();
        assert_eq!(result, "{{ env.NONEXISTENT_VAR_12345 }}");
    }
}
