//! Secret references in provider configuration.
//!
//! Any string value of the form `env:NAME` is replaced with the value of
//! `NAME` from a [`SecretSource`] when the configuration is validated.

use std::collections::HashMap;

use thiserror::Error;

/// Prefix marking a string value as an environment reference.
pub const ENV_PREFIX: &str = "env:";

/// Where secret references are resolved from.
pub trait SecretSource: Send + Sync {
    /// Look up a variable. `None` when it is not set.
    fn get(&self, name: &str) -> Option<String>;
}

/// Resolves references against the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecrets;

impl SecretSource for EnvSecrets {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Resolves references against a fixed map.
#[derive(Debug, Clone, Default)]
pub struct MapSecrets(HashMap<String, String>);

impl MapSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

impl SecretSource for MapSecrets {
    fn get(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}

/// Why a reference could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecretError {
    /// `env:` followed by an empty or malformed name.
    #[error("malformed secret reference '{0}'")]
    Malformed(String),
    /// The variable is not set.
    #[error("environment variable {0} referenced but not set")]
    Unresolved(String),
}

/// Resolve `value` if it is a secret reference, otherwise return it unchanged.
pub fn resolve(value: &str, source: &dyn SecretSource) -> Result<String, SecretError> {
    let Some(name) = value.strip_prefix(ENV_PREFIX) else {
        return Ok(value.to_string());
    };

    let name = name.trim();
    if !is_valid_var_name(name) {
        return Err(SecretError::Malformed(value.to_string()));
    }

    source
        .get(name)
        .ok_or_else(|| SecretError::Unresolved(name.to_string()))
}

fn is_valid_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_values_pass_through() {
        let source = MapSecrets::new();
        assert_eq!(
            resolve("https://hooks.slack.com/x", &source).unwrap(),
            "https://hooks.slack.com/x"
        );
    }

    #[test]
    fn test_resolves_reference() {
        let source = MapSecrets::new().with("MY_VAR", "s3cret");
        assert_eq!(resolve("env:MY_VAR", &source).unwrap(), "s3cret");
    }

    #[test]
    fn test_unresolved_reference_names_variable() {
        let err = resolve("env:MY_VAR", &MapSecrets::new()).unwrap_err();
        assert_eq!(err, SecretError::Unresolved("MY_VAR".to_string()));
        assert!(err.to_string().contains("MY_VAR"));
    }

    #[test]
    fn test_malformed_references() {
        let source = MapSecrets::new();
        assert!(matches!(
            resolve("env:", &source),
            Err(SecretError::Malformed(_))
        ));
        assert!(matches!(
            resolve("env:9LIVES", &source),
            Err(SecretError::Malformed(_))
        ));
        assert!(matches!(
            resolve("env:WITH SPACE", &source),
            Err(SecretError::Malformed(_))
        ));
        assert_eq!(
            resolve("env:9LIVES", &source).unwrap_err().to_string(),
            "malformed secret reference 'env:9LIVES'"
        );
    }

    #[test]
    fn test_env_source_reads_process_environment() {
        // PATH is set in every environment the tests run in.
        assert!(EnvSecrets.get("PATH").is_some());
        assert!(
            EnvSecrets
                .get("STATUS_NOTIFY_SURELY_UNSET_VARIABLE_4711")
                .is_none()
        );
    }
}
