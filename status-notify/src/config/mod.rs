//! Service configuration loading.
//!
//! A service file is a JSON document:
//!
//! ```json
//! {
//!   "loading_strategy": "lazy",
//!   "max_concurrency": 5,
//!   "continue_on_error": true,
//!   "chunk_timeout_ms": 30000,
//!   "default_context": { "organization": "Example Corp" },
//!   "providers": [
//!     { "id": "ops-slack", "type": "slack", "webhook_url": "env:SLACK_WEBHOOK_URL" }
//!   ]
//! }
//! ```
//!
//! A `.env` file next to the service file (or in the working directory) is
//! loaded first so `env:` references resolve.

use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::notification::context::NotificationMetadata;
use crate::notification::service::{DEFAULT_MAX_CONCURRENCY, LoadingStrategy};
use crate::notification::{ConfigValidator, NotificationServiceConfig};
use crate::{Error, Result};

/// Raw shape of a service file. Providers stay untyped until validated.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ServiceFile {
    providers: Vec<Value>,
    loading_strategy: LoadingStrategy,
    max_concurrency: usize,
    continue_on_error: bool,
    default_context: NotificationMetadata,
    chunk_timeout_ms: Option<u64>,
}

impl Default for ServiceFile {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            loading_strategy: LoadingStrategy::default(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            continue_on_error: true,
            default_context: NotificationMetadata::default(),
            chunk_timeout_ms: None,
        }
    }
}

/// Load and validate a service file with the default validator.
pub fn load_service_config(path: impl AsRef<Path>) -> Result<NotificationServiceConfig> {
    load_env(path.as_ref());
    load_service_config_with(path, &ConfigValidator::new())
}

/// Load and validate a service file with a custom validator, e.g. one that
/// accepts the types of a [`ProviderRegistry`](crate::notification::ProviderRegistry).
///
/// No `.env` file is loaded.
pub fn load_service_config_with(
    path: impl AsRef<Path>,
    validator: &ConfigValidator,
) -> Result<NotificationServiceConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let config = parse_service_config(&content, validator)?;

    info!(
        path = %path.display(),
        providers = config.providers.len(),
        "Loaded notification service config"
    );
    Ok(config)
}

/// Parse and validate a service document.
pub fn parse_service_config(
    content: &str,
    validator: &ConfigValidator,
) -> Result<NotificationServiceConfig> {
    let file: ServiceFile = serde_json::from_str(content)?;

    if file.max_concurrency == 0 {
        return Err(Error::config("max_concurrency must be at least 1"));
    }
    if file.chunk_timeout_ms == Some(0) {
        return Err(Error::config("chunk_timeout_ms must be greater than 0"));
    }

    let providers = validator
        .validate_many(&file.providers)
        .map_err(|errors| {
            for (index, error) in &errors {
                warn!(index, error = %error, "Invalid provider configuration");
            }
            Error::InvalidProviderConfigs(errors)
        })?;

    Ok(NotificationServiceConfig {
        providers,
        loading_strategy: file.loading_strategy,
        max_concurrency: file.max_concurrency,
        continue_on_error: file.continue_on_error,
        default_context: file.default_context,
        chunk_timeout_ms: file.chunk_timeout_ms,
    })
}

/// Load `.env` beside the config file, then from the working directory.
/// Variables already set in the process win.
fn load_env(config_path: &Path) {
    if let Some(dir) = config_path.parent() {
        let candidate = dir.join(".env");
        if candidate.is_file() {
            report_env(&candidate, dotenvy::from_path(&candidate));
        }
    }
    report_env(Path::new(".env"), dotenvy::dotenv().map(|_| ()));
}

/// What happened to one `.env` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EnvFile {
    Loaded,
    Absent,
    Invalid,
}

/// Log the outcome of loading `path`. A missing file is not worth a word.
fn report_env(path: &Path, result: dotenvy::Result<()>) -> EnvFile {
    match result {
        Ok(()) => {
            debug!(path = %path.display(), "Loaded .env");
            EnvFile::Loaded
        }
        Err(e) if e.not_found() => EnvFile::Absent,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to load .env");
            EnvFile::Invalid
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{ErrorCode, MapSecrets, ProviderSettings};
    use std::io::Write;

    fn validator() -> ConfigValidator {
        ConfigValidator::new().with_secrets(MapSecrets::new().with(
            "HOOK_URL",
            "https://hooks.slack.com/services/T000/B000/XXXX",
        ))
    }

    #[test]
    fn test_defaults() {
        let config = parse_service_config("{}", &validator()).unwrap();
        assert!(config.providers.is_empty());
        assert_eq!(config.max_concurrency, 5);
        assert!(config.continue_on_error);
        assert_eq!(config.loading_strategy, LoadingStrategy::Lazy);
    }

    #[test]
    fn test_parse_full_document() {
        let content = r#"{
            "loading_strategy": "eager",
            "max_concurrency": 2,
            "continue_on_error": false,
            "chunk_timeout_ms": 5000,
            "default_context": {"organization": "Example Corp"},
            "providers": [
                {"id": "ops", "type": "slack", "webhook_url": "env:HOOK_URL"}
            ]
        }"#;
        let config = parse_service_config(content, &validator()).unwrap();

        assert_eq!(config.loading_strategy, LoadingStrategy::Eager);
        assert_eq!(config.max_concurrency, 2);
        assert!(!config.continue_on_error);
        assert_eq!(config.chunk_timeout_ms, Some(5000));
        assert_eq!(
            config.default_context.organization.as_deref(),
            Some("Example Corp")
        );
        match &config.providers[0].settings {
            ProviderSettings::Slack(slack) => assert_eq!(
                slack.webhook_url,
                "https://hooks.slack.com/services/T000/B000/XXXX"
            ),
            other => panic!("unexpected settings: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_providers_listed_by_index() {
        let content = r#"{
            "providers": [
                {"id": "ok", "type": "slack", "webhook_url": "env:HOOK_URL"},
                {"id": "hook", "type": "webhook"},
                {"id": "mystery", "type": "carrier-pigeon"}
            ]
        }"#;
        let err = parse_service_config(content, &validator()).unwrap_err();
        let Error::InvalidProviderConfigs(errors) = err else {
            panic!("expected invalid provider configs");
        };
        assert_eq!(
            errors.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(errors.iter().all(|(_, e)| e.code == ErrorCode::ConfigurationError));
        assert!(errors[0].1.message.contains("url"));
    }

    #[test]
    fn test_rejects_bad_service_fields() {
        assert!(matches!(
            parse_service_config(r#"{"max_concurrency": 0}"#, &validator()),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            parse_service_config(r#"{"retries": 3}"#, &validator()),
            Err(Error::Serialization(_))
        ));
        assert!(matches!(
            parse_service_config("not json", &validator()),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_load_from_file_with_sibling_env() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "STATUS_NOTIFY_CONFIG_TEST_HOOK=https://example.com/hook\n",
        )
        .unwrap();

        let path = dir.path().join("notify.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"providers": [{{"id": "hook", "type": "webhook", "url": "env:STATUS_NOTIFY_CONFIG_TEST_HOOK"}}]}}"#
        )
        .unwrap();

        let config = load_service_config(&path).unwrap();
        match &config.providers[0].settings {
            ProviderSettings::Webhook(webhook) => {
                assert_eq!(webhook.url, "https://example.com/hook")
            }
            other => panic!("unexpected settings: {:?}", other),
        }
    }

    #[test]
    fn test_env_file_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.env");
        std::fs::write(&broken, "THIS LINE IS NOT AN ASSIGNMENT\n").unwrap();
        assert_eq!(
            report_env(&broken, dotenvy::from_path(&broken)),
            EnvFile::Invalid
        );

        let absent = dir.path().join("absent.env");
        assert_eq!(
            report_env(&absent, dotenvy::from_path(&absent)),
            EnvFile::Absent
        );

        let good = dir.path().join("good.env");
        std::fs::write(&good, "STATUS_NOTIFY_ENV_OUTCOME_TEST=1\n").unwrap();
        assert_eq!(report_env(&good, dotenvy::from_path(&good)), EnvFile::Loaded);
    }

    #[test]
    fn test_malformed_sibling_env_does_not_block_loading() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "THIS LINE IS NOT AN ASSIGNMENT\n").unwrap();
        let path = dir.path().join("notify.json");
        std::fs::write(&path, r#"{"max_concurrency": 3}"#).unwrap();

        let config = load_service_config(&path).unwrap();
        assert_eq!(config.max_concurrency, 3);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_service_config_with(dir.path().join("absent.json"), &validator())
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
