//! Provider configuration validation.
//!
//! Turns untyped JSON provider objects into [`ProviderConfig`]s. Secret
//! references are resolved first, then every field is checked; all problems
//! found for one provider are reported together in a single
//! [`ErrorCode::ConfigurationError`](super::ErrorCode::ConfigurationError).
//!
//! Keys are snake_case; the camelCase spelling of a key is accepted as well.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use super::config::{
    BUILTIN_PROVIDER_TYPES, CustomSettings, DEFAULT_HTTP_TIMEOUT_MS, DEFAULT_PAGERDUTY_API_URL,
    DiscordSettings, EmailSettings, MsTeamsSettings, PagerDutySettings, ProviderConfig,
    ProviderSettings, RateLimitPolicy, RetryPolicy, SlackSettings, SmtpSettings, SmtpTls,
    WebhookAuth, WebhookMethod, WebhookSettings,
};
use super::events::{EventKind, Severity};
use super::registry::ProviderRegistry;
use super::result::{NotificationError, NotificationResult};
use super::secrets::{self, EnvSecrets, SecretSource};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@<>]+@[^\s@<>]+\.[^\s@<>]+$").unwrap());

static PAGERDUTY_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]{32}$").unwrap());

/// Keys belonging to the shared base of every provider config.
const BASE_KEYS: [&str; 8] = [
    "id",
    "type",
    "enabled",
    "event_filter",
    "entity_filter",
    "min_severity",
    "retry",
    "rate_limit",
];

const MAX_RETRY_ATTEMPTS: RangeInclusive<u64> = 1..=10;
const BACKOFF_MULTIPLIER: RangeInclusive<f64> = 1.0..=10.0;
const MAX_DELAY_MS: u64 = 3_600_000;
const HTTP_TIMEOUT_MS: RangeInclusive<u64> = 1..=300_000;

/// Validates raw provider configuration.
#[derive(Clone)]
pub struct ConfigValidator {
    secrets: Arc<dyn SecretSource>,
    custom_types: BTreeSet<String>,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConfigValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigValidator")
            .field("custom_types", &self.custom_types)
            .finish_non_exhaustive()
    }
}

impl ConfigValidator {
    /// A validator resolving secrets from the process environment and
    /// accepting only the built-in provider types.
    pub fn new() -> Self {
        Self {
            secrets: Arc::new(EnvSecrets),
            custom_types: BTreeSet::new(),
        }
    }

    /// Resolve secret references against `secrets` instead of the environment.
    pub fn with_secrets(mut self, secrets: impl SecretSource + 'static) -> Self {
        self.secrets = Arc::new(secrets);
        self
    }

    /// Accept every type registered in `registry`.
    pub fn with_registry(mut self, registry: &ProviderRegistry) -> Self {
        self.custom_types.extend(
            registry
                .available_types()
                .into_iter()
                .filter(|t| !BUILTIN_PROVIDER_TYPES.contains(&t.as_str())),
        );
        self
    }

    /// Accept a user-registered type.
    pub fn with_custom_type(mut self, provider_type: impl Into<String>) -> Self {
        self.custom_types.insert(provider_type.into());
        self
    }

    /// Validate one raw provider config.
    pub fn validate(&self, raw: &Value) -> NotificationResult<ProviderConfig> {
        let mut issues = Issues::default();

        let Some(object) = raw.as_object() else {
            return Err(NotificationError::configuration(
                "invalid provider configuration: expected a JSON object",
            ));
        };

        let id = required_str(object, "id", "id", &mut issues);
        let resolved = self.resolve_secrets(object, &mut issues);
        let settings = self.validate_settings(&resolved, &mut issues);
        let base = validate_base(&resolved, &mut issues);

        match (id, settings, base, issues.is_empty()) {
            (Some(id), Some(settings), Some(base), true) => {
                debug!(
                    provider_id = %id,
                    provider_type = %settings.provider_type(),
                    "Provider config validated"
                );
                Ok(ProviderConfig {
                    id,
                    enabled: base.enabled,
                    event_filter: base.event_filter,
                    entity_filter: base.entity_filter,
                    min_severity: base.min_severity,
                    retry: base.retry,
                    rate_limit: base.rate_limit,
                    settings,
                })
            }
            (id, _, _, _) => {
                let label = id.as_deref().unwrap_or("<unnamed>");
                let error = NotificationError::configuration(format!(
                    "invalid configuration for provider '{}': {}",
                    label,
                    issues.join()
                ));
                Err(match id {
                    Some(id) => error.with_provider(id),
                    None => error,
                })
            }
        }
    }

    /// Validate a list of raw configs.
    ///
    /// Returns every typed config, or every `(index, error)` pair when at least
    /// one entry is invalid. Duplicate ids are reported against the later entry.
    pub fn validate_many(
        &self,
        raws: &[Value],
    ) -> Result<Vec<ProviderConfig>, Vec<(usize, NotificationError)>> {
        let mut configs = Vec::with_capacity(raws.len());
        let mut errors = Vec::new();
        let mut seen: BTreeMap<String, usize> = BTreeMap::new();

        for (index, raw) in raws.iter().enumerate() {
            match self.validate(raw) {
                Ok(config) => {
                    if let Some(first) = seen.get(&config.id) {
                        errors.push((
                            index,
                            NotificationError::configuration(format!(
                                "duplicate provider id '{}' (first defined at index {})",
                                config.id, first
                            ))
                            .with_provider(config.id.clone()),
                        ));
                        continue;
                    }
                    seen.insert(config.id.clone(), index);
                    configs.push(config);
                }
                Err(error) => errors.push((index, error)),
            }
        }

        if errors.is_empty() {
            Ok(configs)
        } else {
            Err(errors)
        }
    }

    fn available_types(&self) -> Vec<String> {
        let mut types: Vec<String> = BUILTIN_PROVIDER_TYPES
            .iter()
            .map(|t| t.to_string())
            .chain(self.custom_types.iter().cloned())
            .collect();
        types.sort();
        types
    }

    /// Replace every `env:NAME` string, recording unresolvable ones.
    fn resolve_secrets(
        &self,
        object: &Map<String, Value>,
        issues: &mut Issues,
    ) -> Map<String, Value> {
        object
            .iter()
            .map(|(key, value)| {
                let resolved = self.resolve_value(value, key, issues);
                (key.clone(), resolved)
            })
            .collect()
    }

    fn resolve_value(&self, value: &Value, path: &str, issues: &mut Issues) -> Value {
        match value {
            Value::String(s) => match secrets::resolve(s, self.secrets.as_ref()) {
                Ok(resolved) => Value::String(resolved),
                Err(e) => {
                    issues.push_secret(path, e.to_string());
                    Value::Null
                }
            },
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.resolve_value(item, &format!("{}[{}]", path, i), issues))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, item)| {
                        let resolved =
                            self.resolve_value(item, &format!("{}.{}", path, key), issues);
                        (key.clone(), resolved)
                    })
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn validate_settings(
        &self,
        object: &Map<String, Value>,
        issues: &mut Issues,
    ) -> Option<ProviderSettings> {
        let provider_type = required_str(object, "type", "type", issues)?;

        let settings = match provider_type.as_str() {
            "slack" => ProviderSettings::Slack(validate_slack(object, issues)?),
            "email" => ProviderSettings::Email(validate_email(object, issues)?),
            "webhook" => ProviderSettings::Webhook(validate_webhook(object, issues)?),
            "discord" => ProviderSettings::Discord(validate_discord(object, issues)?),
            "pagerduty" => ProviderSettings::PagerDuty(validate_pagerduty(object, issues)?),
            "msteams" => ProviderSettings::MsTeams(validate_msteams(object, issues)?),
            other if self.custom_types.contains(other) => {
                let options = object
                    .iter()
                    .filter(|(key, _)| !is_base_key(key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                ProviderSettings::Custom(CustomSettings {
                    provider_type: other.to_string(),
                    options,
                })
            }
            other => {
                issues.push(
                    "type",
                    format!(
                        "unknown provider type '{}', available: [{}]",
                        other,
                        self.available_types().join(", ")
                    ),
                );
                return None;
            }
        };

        Some(settings)
    }
}

/// Collected `field: problem` messages.
///
/// Fields whose secret reference failed to resolve report only that failure.
#[derive(Debug, Default)]
struct Issues(Vec<String>, BTreeSet<String>);

impl Issues {
    fn push(&mut self, field: &str, message: impl AsRef<str>) {
        if self.1.contains(field) {
            return;
        }
        self.0.push(format!("{}: {}", field, message.as_ref()));
    }

    fn push_secret(&mut self, field: &str, message: impl AsRef<str>) {
        self.push(field, message);
        self.1.insert(field.to_string());
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn join(&self) -> String {
        self.0.join("; ")
    }
}

struct BaseFields {
    enabled: bool,
    event_filter: Vec<EventKind>,
    entity_filter: Vec<String>,
    min_severity: Severity,
    retry: RetryPolicy,
    rate_limit: RateLimitPolicy,
}

fn validate_base(object: &Map<String, Value>, issues: &mut Issues) -> Option<BaseFields> {
    let before = issues.0.len();

    let enabled = optional_bool(object, "enabled", "enabled", issues).unwrap_or(true);

    let event_filter = optional_str_list(object, "event_filter", "event_filter", issues)
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .filter_map(|(i, raw)| match raw.parse::<EventKind>() {
            Ok(kind) => Some(kind),
            Err(e) => {
                issues.push(&format!("event_filter[{}]", i), e);
                None
            }
        })
        .collect();

    let entity_filter =
        optional_str_list(object, "entity_filter", "entity_filter", issues).unwrap_or_default();

    let min_severity = match optional_str(object, "min_severity", "min_severity", issues) {
        Some(raw) => match raw.parse::<Severity>() {
            Ok(severity) => severity,
            Err(e) => {
                issues.push("min_severity", e);
                Severity::Minor
            }
        },
        None => Severity::Minor,
    };

    let retry = match optional_object(object, "retry", "retry", issues) {
        Some(retry) => validate_retry(retry, issues),
        None => RetryPolicy::default(),
    };

    let rate_limit = match optional_object(object, "rate_limit", "rate_limit", issues) {
        Some(rate_limit) => validate_rate_limit(rate_limit, issues),
        None => RateLimitPolicy::default(),
    };

    (issues.0.len() == before).then_some(BaseFields {
        enabled,
        event_filter,
        entity_filter,
        min_severity,
        retry,
        rate_limit,
    })
}

fn validate_retry(object: &Map<String, Value>, issues: &mut Issues) -> RetryPolicy {
    let defaults = RetryPolicy::default();

    let max_attempts = optional_u64_in(
        object,
        "max_attempts",
        "retry.max_attempts",
        MAX_RETRY_ATTEMPTS,
        issues,
    )
    .map(|v| v as u32)
    .unwrap_or(defaults.max_attempts);
    let initial_delay_ms = optional_u64_in(
        object,
        "initial_delay_ms",
        "retry.initial_delay_ms",
        0..=MAX_DELAY_MS,
        issues,
    )
    .unwrap_or(defaults.initial_delay_ms);
    let max_delay_ms = optional_u64_in(
        object,
        "max_delay_ms",
        "retry.max_delay_ms",
        0..=MAX_DELAY_MS,
        issues,
    )
    .unwrap_or(defaults.max_delay_ms);
    let backoff_multiplier = optional_f64_in(
        object,
        "backoff_multiplier",
        "retry.backoff_multiplier",
        BACKOFF_MULTIPLIER,
        issues,
    )
    .unwrap_or(defaults.backoff_multiplier);

    if initial_delay_ms > max_delay_ms {
        issues.push(
            "retry.initial_delay_ms",
            format!(
                "must not exceed retry.max_delay_ms ({} > {})",
                initial_delay_ms, max_delay_ms
            ),
        );
    }

    RetryPolicy {
        max_attempts,
        initial_delay_ms,
        max_delay_ms,
        backoff_multiplier,
    }
}

fn validate_rate_limit(object: &Map<String, Value>, issues: &mut Issues) -> RateLimitPolicy {
    let defaults = RateLimitPolicy::default();

    RateLimitPolicy {
        max_notifications: optional_u64_in(
            object,
            "max_notifications",
            "rate_limit.max_notifications",
            1..=u32::MAX as u64,
            issues,
        )
        .map(|v| v as u32)
        .unwrap_or(defaults.max_notifications),
        period_ms: optional_u64_in(
            object,
            "period_ms",
            "rate_limit.period_ms",
            1..=u64::MAX,
            issues,
        )
        .unwrap_or(defaults.period_ms),
    }
}

fn validate_slack(object: &Map<String, Value>, issues: &mut Issues) -> Option<SlackSettings> {
    let webhook_url = required_url(object, "webhook_url", "webhook_url", true, issues);
    let channel = optional_str(object, "channel", "channel", issues);
    let username = optional_str(object, "username", "username", issues);
    let icon_emoji = optional_str(object, "icon_emoji", "icon_emoji", issues);
    let mention_users =
        optional_str_list(object, "mention_users", "mention_users", issues).unwrap_or_default();

    Some(SlackSettings {
        webhook_url: webhook_url?,
        channel,
        username,
        icon_emoji,
        mention_users,
    })
}

fn validate_discord(object: &Map<String, Value>, issues: &mut Issues) -> Option<DiscordSettings> {
    let webhook_url = required_url(object, "webhook_url", "webhook_url", true, issues);
    let username = optional_str(object, "username", "username", issues);
    let avatar_url = optional_url(object, "avatar_url", "avatar_url", false, issues);

    Some(DiscordSettings {
        webhook_url: webhook_url?,
        username,
        avatar_url,
    })
}

fn validate_msteams(object: &Map<String, Value>, issues: &mut Issues) -> Option<MsTeamsSettings> {
    let webhook_url = required_url(object, "webhook_url", "webhook_url", true, issues)?;
    Some(MsTeamsSettings { webhook_url })
}

fn validate_webhook(object: &Map<String, Value>, issues: &mut Issues) -> Option<WebhookSettings> {
    let url = required_url(object, "url", "url", false, issues);

    let method = match optional_str(object, "method", "method", issues) {
        Some(raw) => match raw.to_ascii_uppercase().as_str() {
            "POST" => Some(WebhookMethod::Post),
            "PUT" => Some(WebhookMethod::Put),
            "PATCH" => Some(WebhookMethod::Patch),
            _ => {
                issues.push("method", format!("must be POST, PUT or PATCH, got '{}'", raw));
                None
            }
        },
        None => Some(WebhookMethod::Post),
    };

    let mut headers = BTreeMap::new();
    if let Some(raw_headers) = optional_object(object, "headers", "headers", issues) {
        for (name, value) in raw_headers {
            match value.as_str() {
                Some(value) => {
                    headers.insert(name.clone(), value.to_string());
                }
                None => issues.push(&format!("headers.{}", name), "must be a string"),
            }
        }
    }

    let auth = optional_object(object, "auth", "auth", issues)
        .and_then(|auth| validate_webhook_auth(auth, issues));

    let timeout_ms = optional_u64_in(object, "timeout_ms", "timeout_ms", HTTP_TIMEOUT_MS, issues)
        .unwrap_or(DEFAULT_HTTP_TIMEOUT_MS);

    Some(WebhookSettings {
        url: url?,
        method: method?,
        headers,
        auth,
        timeout_ms,
    })
}

fn validate_webhook_auth(object: &Map<String, Value>, issues: &mut Issues) -> Option<WebhookAuth> {
    let auth_type = required_str(object, "type", "auth.type", issues)?;
    match auth_type.to_ascii_lowercase().as_str() {
        "bearer" => Some(WebhookAuth::Bearer {
            token: required_str(object, "token", "auth.token", issues)?,
        }),
        "basic" => {
            let username = required_str(object, "username", "auth.username", issues);
            let password = required_str(object, "password", "auth.password", issues);
            Some(WebhookAuth::Basic {
                username: username?,
                password: password?,
            })
        }
        "header" => {
            let name = required_str(object, "name", "auth.name", issues);
            let value = required_str(object, "value", "auth.value", issues);
            Some(WebhookAuth::Header {
                name: name?,
                value: value?,
            })
        }
        other => {
            issues.push(
                "auth.type",
                format!("must be bearer, basic or header, got '{}'", other),
            );
            None
        }
    }
}

fn validate_email(object: &Map<String, Value>, issues: &mut Issues) -> Option<EmailSettings> {
    let smtp = match lookup(object, "smtp") {
        Some(Value::Object(smtp)) => validate_smtp(smtp, issues),
        Some(Value::Null) | None => {
            issues.push("smtp", "is required");
            None
        }
        Some(_) => {
            issues.push("smtp", "must be an object");
            None
        }
    };

    let from = required_email(object, "from", "from", issues);

    let to = match lookup(object, "to") {
        Some(Value::String(single)) => Some(vec![single.clone()]),
        Some(Value::Array(_)) => optional_str_list(object, "to", "to", issues),
        Some(Value::Null) | None => None,
        Some(_) => {
            issues.push("to", "must be a string or a list of strings");
            return None;
        }
    };
    let to = match to {
        Some(list) if !list.is_empty() => {
            let mut valid = true;
            for (i, address) in list.iter().enumerate() {
                if !EMAIL_RE.is_match(address) {
                    issues.push(
                        &format!("to[{}]", i),
                        format!("'{}' is not a valid email address", address),
                    );
                    valid = false;
                }
            }
            valid.then_some(list)
        }
        _ => {
            issues.push("to", "at least one recipient is required");
            None
        }
    };

    let subject_prefix = optional_str(object, "subject_prefix", "subject_prefix", issues);

    Some(EmailSettings {
        smtp: smtp?,
        from: from?,
        to: to?,
        subject_prefix,
    })
}

fn validate_smtp(object: &Map<String, Value>, issues: &mut Issues) -> Option<SmtpSettings> {
    let host = required_str(object, "host", "smtp.host", issues);
    let port = required_u64_in(object, "port", "smtp.port", 1..=65_535, issues).map(|p| p as u16);
    // Unauthenticated relays take neither credential.
    let username = optional_str(object, "username", "smtp.username", issues);
    let password = optional_str(object, "password", "smtp.password", issues);
    match (&username, &password) {
        (Some(_), None) => {
            issues.push("smtp.password", "is required when smtp.username is set")
        }
        (None, Some(_)) => {
            issues.push("smtp.username", "is required when smtp.password is set")
        }
        _ => {}
    }
    let timeout_ms = optional_u64_in(object, "timeout_ms", "smtp.timeout_ms", HTTP_TIMEOUT_MS, issues)
        .unwrap_or(DEFAULT_HTTP_TIMEOUT_MS);

    let explicit_tls = match optional_str(object, "tls", "smtp.tls", issues) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "none" => Some(SmtpTls::None),
            "starttls" | "start_tls" => Some(SmtpTls::StartTls),
            "implicit" | "tls" => Some(SmtpTls::Implicit),
            _ => {
                issues.push(
                    "smtp.tls",
                    format!("must be none, starttls or implicit, got '{}'", raw),
                );
                None
            }
        },
        None => None,
    };
    let secure = optional_bool(object, "secure", "smtp.secure", issues);

    let port = port?;
    let tls = match (explicit_tls, secure) {
        (Some(tls), _) => tls,
        (None, Some(true)) => SmtpTls::Implicit,
        (None, _) => SmtpTls::for_port(port),
    };

    Some(SmtpSettings {
        host: host?,
        port,
        tls,
        username,
        password,
        timeout_ms,
    })
}

fn validate_pagerduty(
    object: &Map<String, Value>,
    issues: &mut Issues,
) -> Option<PagerDutySettings> {
    let integration_key = required_str(object, "integration_key", "integration_key", issues)
        .and_then(|key| {
            if PAGERDUTY_KEY_RE.is_match(&key) {
                Some(key)
            } else {
                issues.push("integration_key", "must be 32 alphanumeric characters");
                None
            }
        });
    let api_url = optional_url(object, "api_url", "api_url", true, issues)
        .unwrap_or_else(|| DEFAULT_PAGERDUTY_API_URL.to_string());

    Some(PagerDutySettings {
        integration_key: integration_key?,
        api_url,
    })
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn is_base_key(key: &str) -> bool {
    BASE_KEYS
        .iter()
        .any(|base| *base == key || camel_case(base) == key)
}

fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Look up `key`, falling back to its camelCase spelling.
fn lookup<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).or_else(|| {
        if key.contains('_') {
            object.get(&camel_case(key))
        } else {
            None
        }
    })
}

fn present<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    lookup(object, key).filter(|v| !v.is_null())
}

fn required_str(
    object: &Map<String, Value>,
    key: &str,
    path: &str,
    issues: &mut Issues,
) -> Option<String> {
    match present(object, key) {
        None => {
            issues.push(path, "is required");
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            issues.push(path, "must not be empty");
            None
        }
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(_) => {
            issues.push(path, "must be a string");
            None
        }
    }
}

fn optional_str(
    object: &Map<String, Value>,
    key: &str,
    path: &str,
    issues: &mut Issues,
) -> Option<String> {
    match present(object, key) {
        None => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(_) => {
            issues.push(path, "must be a string");
            None
        }
    }
}

fn optional_bool(
    object: &Map<String, Value>,
    key: &str,
    path: &str,
    issues: &mut Issues,
) -> Option<bool> {
    match present(object, key) {
        None => None,
        Some(Value::Bool(b)) => Some(*b),
        Some(_) => {
            issues.push(path, "must be a boolean");
            None
        }
    }
}

fn optional_object<'a>(
    object: &'a Map<String, Value>,
    key: &str,
    path: &str,
    issues: &mut Issues,
) -> Option<&'a Map<String, Value>> {
    match present(object, key) {
        None => None,
        Some(Value::Object(map)) => Some(map),
        Some(_) => {
            issues.push(path, "must be an object");
            None
        }
    }
}

fn optional_str_list(
    object: &Map<String, Value>,
    key: &str,
    path: &str,
    issues: &mut Issues,
) -> Option<Vec<String>> {
    match present(object, key) {
        None => None,
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item.as_str() {
                    Some(s) if !s.trim().is_empty() => out.push(s.trim().to_string()),
                    _ => issues.push(&format!("{}[{}]", path, i), "must be a non-empty string"),
                }
            }
            Some(out)
        }
        Some(_) => {
            issues.push(path, "must be a list of strings");
            None
        }
    }
}

fn required_u64_in(
    object: &Map<String, Value>,
    key: &str,
    path: &str,
    range: RangeInclusive<u64>,
    issues: &mut Issues,
) -> Option<u64> {
    if present(object, key).is_none() {
        issues.push(path, "is required");
        return None;
    }
    optional_u64_in(object, key, path, range, issues)
}

fn optional_u64_in(
    object: &Map<String, Value>,
    key: &str,
    path: &str,
    range: RangeInclusive<u64>,
    issues: &mut Issues,
) -> Option<u64> {
    let value = present(object, key)?;
    let number = match value {
        Value::Number(n) => n.as_u64(),
        // Ports and delays often arrive as strings from env references.
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };

    match number {
        Some(n) if range.contains(&n) => Some(n),
        Some(n) => {
            issues.push(
                path,
                format!(
                    "must be between {} and {}, got {}",
                    range.start(),
                    range.end(),
                    n
                ),
            );
            None
        }
        None => {
            issues.push(path, "must be a non-negative integer");
            None
        }
    }
}

fn optional_f64_in(
    object: &Map<String, Value>,
    key: &str,
    path: &str,
    range: RangeInclusive<f64>,
    issues: &mut Issues,
) -> Option<f64> {
    let value = present(object, key)?;
    match value.as_f64() {
        Some(n) if range.contains(&n) => Some(n),
        Some(n) => {
            issues.push(
                path,
                format!(
                    "must be between {} and {}, got {}",
                    range.start(),
                    range.end(),
                    n
                ),
            );
            None
        }
        None => {
            issues.push(path, "must be a number");
            None
        }
    }
}

fn check_url(raw: &str, https_only: bool) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| format!("'{}' is not a valid URL ({})", raw, e))?;
    match url.scheme() {
        "https" => {}
        "http" if !https_only => {}
        "http" => return Err(format!("'{}' must use https", raw)),
        other => return Err(format!("unsupported URL scheme '{}'", other)),
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(format!("'{}' has no host", raw));
    }
    Ok(())
}

fn required_url(
    object: &Map<String, Value>,
    key: &str,
    path: &str,
    https_only: bool,
    issues: &mut Issues,
) -> Option<String> {
    let raw = required_str(object, key, path, issues)?;
    match check_url(&raw, https_only) {
        Ok(()) => Some(raw),
        Err(e) => {
            issues.push(path, e);
            None
        }
    }
}

fn optional_url(
    object: &Map<String, Value>,
    key: &str,
    path: &str,
    https_only: bool,
    issues: &mut Issues,
) -> Option<String> {
    let raw = optional_str(object, key, path, issues)?;
    match check_url(&raw, https_only) {
        Ok(()) => Some(raw),
        Err(e) => {
            issues.push(path, e);
            None
        }
    }
}

fn required_email(
    object: &Map<String, Value>,
    key: &str,
    path: &str,
    issues: &mut Issues,
) -> Option<String> {
    let raw = required_str(object, key, path, issues)?;
    if EMAIL_RE.is_match(&raw) {
        Some(raw)
    } else {
        issues.push(path, format!("'{}' is not a valid email address", raw));
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::ErrorCode;
    use crate::notification::secrets::MapSecrets;
    use serde_json::json;

    fn validator() -> ConfigValidator {
        ConfigValidator::new().with_secrets(MapSecrets::new().with("MY_VAR", "resolved-token"))
    }

    #[test]
    fn test_valid_webhook_gets_defaults() {
        let config = validator()
            .validate(&json!({
                "id": "ops-hook",
                "type": "webhook",
                "url": "https://hooks.example.com/status",
                "headers": { "X-Team": "sre" }
            }))
            .unwrap();

        assert_eq!(config.id, "ops-hook");
        assert_eq!(config.provider_type(), "webhook");
        assert!(config.enabled);
        assert!(config.event_filter.is_empty());
        assert!(config.entity_filter.is_empty());
        assert_eq!(config.min_severity, Severity::Minor);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.rate_limit, RateLimitPolicy::default());

        let ProviderSettings::Webhook(settings) = config.settings else {
            panic!("expected webhook settings");
        };
        assert_eq!(settings.url, "https://hooks.example.com/status");
        assert_eq!(settings.method, WebhookMethod::Post);
        assert_eq!(settings.timeout_ms, DEFAULT_HTTP_TIMEOUT_MS);
        assert_eq!(settings.headers.get("X-Team").map(String::as_str), Some("sre"));
    }

    #[test]
    fn test_webhook_missing_url_names_field() {
        let err = validator()
            .validate(&json!({ "id": "hook", "type": "webhook" }))
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::ConfigurationError);
        assert!(!err.retryable);
        assert_eq!(err.provider_id.as_deref(), Some("hook"));
        assert!(err.message.contains("url: is required"), "{}", err.message);
    }

    #[test]
    fn test_base_fields_are_parsed() {
        let config = validator()
            .validate(&json!({
                "id": "slack-ops",
                "type": "slack",
                "webhookUrl": "https://hooks.slack.com/services/T/B/X",
                "enabled": false,
                "eventFilter": ["incident.opened", "system.down"],
                "entity_filter": ["api"],
                "min_severity": "major",
                "retry": { "max_attempts": 5, "initial_delay_ms": 100, "max_delay_ms": 1000, "backoff_multiplier": 3 },
                "rate_limit": { "max_notifications": 2, "period_ms": 5000 }
            }))
            .unwrap();

        assert!(!config.enabled);
        assert_eq!(
            config.event_filter,
            vec![EventKind::IncidentOpened, EventKind::SystemDown]
        );
        assert_eq!(config.entity_filter, vec!["api".to_string()]);
        assert_eq!(config.min_severity, Severity::Major);
        assert_eq!(
            config.retry,
            RetryPolicy {
                max_attempts: 5,
                initial_delay_ms: 100,
                max_delay_ms: 1000,
                backoff_multiplier: 3.0,
            }
        );
        assert_eq!(
            config.rate_limit,
            RateLimitPolicy {
                max_notifications: 2,
                period_ms: 5000,
            }
        );
    }

    #[test]
    fn test_reports_every_problem() {
        let err = validator()
            .validate(&json!({
                "id": "bad",
                "type": "email",
                "smtp": { "host": "smtp.example.com", "port": 70000, "username": "bot" },
                "from": "not-an-address",
                "to": [],
                "min_severity": "apocalyptic",
                "retry": { "max_attempts": 0 }
            }))
            .unwrap_err();

        for expected in [
            "smtp.port",
            "smtp.password: is required when smtp.username is set",
            "from:",
            "to: at least one recipient",
            "min_severity",
            "retry.max_attempts",
        ] {
            assert!(err.message.contains(expected), "missing '{}' in {}", expected, err.message);
        }
    }

    #[test]
    fn test_env_reference_resolves() {
        let config = validator()
            .validate(&json!({
                "id": "hook",
                "type": "webhook",
                "url": "https://hooks.example.com/x",
                "auth": { "type": "bearer", "token": "env:MY_VAR" }
            }))
            .unwrap();

        let ProviderSettings::Webhook(settings) = config.settings else {
            panic!("expected webhook settings");
        };
        assert_eq!(
            settings.auth,
            Some(WebhookAuth::Bearer {
                token: "resolved-token".to_string()
            })
        );
    }

    #[test]
    fn test_unresolved_env_reference_names_variable() {
        let err = ConfigValidator::new()
            .with_secrets(MapSecrets::new())
            .validate(&json!({
                "id": "pd",
                "type": "pagerduty",
                "integration_key": "env:MY_VAR"
            }))
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::ConfigurationError);
        assert!(err.message.contains("MY_VAR"), "{}", err.message);
        assert!(!err.message.contains("is required"), "{}", err.message);
    }

    #[test]
    fn test_https_required_for_chat_webhooks() {
        let err = validator()
            .validate(&json!({
                "id": "discord",
                "type": "discord",
                "webhook_url": "http://discord.com/api/webhooks/1/abc"
            }))
            .unwrap_err();
        assert!(err.message.contains("must use https"), "{}", err.message);

        // The generic webhook accepts plain http.
        assert!(
            validator()
                .validate(&json!({ "id": "h", "type": "webhook", "url": "http://localhost:8080/hook" }))
                .is_ok()
        );
    }

    #[test]
    fn test_email_config() {
        let config = validator()
            .validate(&json!({
                "id": "mail",
                "type": "email",
                "smtp": { "host": "smtp.example.com", "port": "465", "username": "bot", "password": "env:MY_VAR" },
                "from": "status@example.com",
                "to": "oncall@example.com"
            }))
            .unwrap();

        let ProviderSettings::Email(settings) = config.settings else {
            panic!("expected email settings");
        };
        assert_eq!(settings.smtp.port, 465);
        assert_eq!(settings.smtp.tls, SmtpTls::Implicit);
        assert_eq!(settings.smtp.password.as_deref(), Some("resolved-token"));
        assert_eq!(settings.to, vec!["oncall@example.com".to_string()]);
    }

    #[test]
    fn test_email_relay_without_credentials() {
        let config = validator()
            .validate(&json!({
                "id": "relay",
                "type": "email",
                "smtp": { "host": "relay.internal", "port": 25 },
                "from": "status@example.com",
                "to": ["oncall@example.com"]
            }))
            .unwrap();

        let ProviderSettings::Email(settings) = config.settings else {
            panic!("expected email settings");
        };
        assert_eq!(settings.smtp.host, "relay.internal");
        assert_eq!(settings.smtp.tls, SmtpTls::StartTls);
        assert!(settings.smtp.username.is_none());
        assert!(settings.smtp.password.is_none());
    }

    #[test]
    fn test_email_credentials_come_in_pairs() {
        let email = |smtp: Value| {
            json!({
                "id": "mail",
                "type": "email",
                "smtp": smtp,
                "from": "status@example.com",
                "to": ["oncall@example.com"]
            })
        };

        let err = validator()
            .validate(&email(json!({ "host": "smtp.example.com", "port": 587, "username": "bot" })))
            .unwrap_err();
        assert!(
            err.message
                .contains("smtp.password: is required when smtp.username is set"),
            "{}",
            err.message
        );
        assert!(!err.message.contains("smtp.username: "), "{}", err.message);

        let err = validator()
            .validate(&email(json!({ "host": "smtp.example.com", "port": 587, "password": "hunter2" })))
            .unwrap_err();
        assert!(
            err.message
                .contains("smtp.username: is required when smtp.password is set"),
            "{}",
            err.message
        );
    }

    #[test]
    fn test_pagerduty_key_shape_and_default_url() {
        let config = validator()
            .validate(&json!({
                "id": "pd",
                "type": "pagerduty",
                "integration_key": "0123456789abcdef0123456789abcdef"
            }))
            .unwrap();
        let ProviderSettings::PagerDuty(settings) = config.settings else {
            panic!("expected pagerduty settings");
        };
        assert_eq!(settings.api_url, DEFAULT_PAGERDUTY_API_URL);

        let err = validator()
            .validate(&json!({ "id": "pd", "type": "pagerduty", "integration_key": "short" }))
            .unwrap_err();
        assert!(err.message.contains("integration_key"));
    }

    #[test]
    fn test_unknown_type_lists_available() {
        let err = validator()
            .validate(&json!({ "id": "x", "type": "sms" }))
            .unwrap_err();
        assert!(err.message.contains("unknown provider type 'sms'"));
        assert!(err.message.contains("slack"));

        let config = validator()
            .with_custom_type("sms")
            .validate(&json!({ "id": "x", "type": "sms", "number": "env:MY_VAR", "enabled": true }))
            .unwrap();
        let ProviderSettings::Custom(settings) = config.settings else {
            panic!("expected custom settings");
        };
        assert_eq!(settings.provider_type, "sms");
        assert_eq!(settings.options.get("number"), Some(&json!("resolved-token")));
        assert!(!settings.options.contains_key("enabled"));
    }

    #[test]
    fn test_retry_delay_bounds_are_cross_checked() {
        let err = validator()
            .validate(&json!({
                "id": "h",
                "type": "webhook",
                "url": "https://example.com",
                "retry": { "initial_delay_ms": 5000, "max_delay_ms": 100 }
            }))
            .unwrap_err();
        assert!(err.message.contains("must not exceed retry.max_delay_ms"));
    }

    #[test]
    fn test_validate_many_collects_indexed_errors() {
        let raws = vec![
            json!({ "id": "a", "type": "webhook", "url": "https://example.com/a" }),
            json!({ "id": "b", "type": "webhook" }),
            json!({ "id": "a", "type": "webhook", "url": "https://example.com/c" }),
            json!("not an object"),
        ];

        let errors = validator().validate_many(&raws).unwrap_err();
        let indices: Vec<usize> = errors.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert!(errors[1].1.message.contains("duplicate provider id 'a'"));
    }

    #[test]
    fn test_validate_many_returns_all_configs() {
        let raws = vec![
            json!({ "id": "a", "type": "msteams", "webhook_url": "https://example.webhook.office.com/a" }),
            json!({ "id": "b", "type": "discord", "webhook_url": "https://discord.com/api/webhooks/1/x" }),
        ];
        let configs = validator().validate_many(&raws).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[1].provider_type(), "discord");
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("webhook_url"), "webhookUrl");
        assert_eq!(camel_case("max_notifications"), "maxNotifications");
        assert_eq!(camel_case("id"), "id");
    }
}
