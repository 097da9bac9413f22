//! Typed provider configuration.
//!
//! A [`ProviderConfig`] is the shared base every provider has (id, filters,
//! retry and rate-limit policies) plus [`ProviderSettings`], the part keyed by
//! provider type. Configs are produced by the
//! [`ConfigValidator`](super::validation::ConfigValidator), which applies all
//! defaults, so nothing downstream has to handle "unset".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::events::{EventKind, Severity};

/// Default HTTP timeout for webhook-style providers.
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

/// Default PagerDuty Events API v2 endpoint.
pub const DEFAULT_PAGERDUTY_API_URL: &str = "https://events.pagerduty.com/v2/enqueue";

/// Retry behaviour of the delivery pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of channel calls, including the first one.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Rolling-window rate limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    /// Maximum notifications admitted within `period_ms`.
    pub max_notifications: u32,
    pub period_ms: u64,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_notifications: 10,
            period_ms: 60_000,
        }
    }
}

/// Validated configuration of one provider instance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderConfig {
    /// Unique id within a service.
    pub id: String,
    pub enabled: bool,
    /// Event kinds this provider handles. Empty means all.
    pub event_filter: Vec<EventKind>,
    /// Affected entity names this provider handles. Empty means all.
    pub entity_filter: Vec<String>,
    pub min_severity: Severity,
    pub retry: RetryPolicy,
    pub rate_limit: RateLimitPolicy,
    #[serde(flatten)]
    pub settings: ProviderSettings,
}

impl ProviderConfig {
    /// Build a config with default base fields.
    pub fn new(id: impl Into<String>, settings: ProviderSettings) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            event_filter: Vec::new(),
            entity_filter: Vec::new(),
            min_severity: Severity::Minor,
            retry: RetryPolicy::default(),
            rate_limit: RateLimitPolicy::default(),
            settings,
        }
    }

    /// Get the provider type name.
    pub fn provider_type(&self) -> &str {
        self.settings.provider_type()
    }
}

/// Provider-specific settings, keyed by provider type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderSettings {
    Slack(SlackSettings),
    Email(EmailSettings),
    Webhook(WebhookSettings),
    Discord(DiscordSettings),
    PagerDuty(PagerDutySettings),
    MsTeams(MsTeamsSettings),
    /// A user-registered provider type.
    Custom(CustomSettings),
}

impl ProviderSettings {
    pub fn provider_type(&self) -> &str {
        match self {
            Self::Slack(_) => "slack",
            Self::Email(_) => "email",
            Self::Webhook(_) => "webhook",
            Self::Discord(_) => "discord",
            Self::PagerDuty(_) => "pagerduty",
            Self::MsTeams(_) => "msteams",
            Self::Custom(c) => &c.provider_type,
        }
    }

    /// An option of a custom provider. Always `None` for built-in types.
    pub fn custom_option(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Custom(c) => c.options.get(key),
            _ => None,
        }
    }
}

/// Built-in provider type names.
pub const BUILTIN_PROVIDER_TYPES: [&str; 6] = [
    "slack",
    "email",
    "webhook",
    "discord",
    "pagerduty",
    "msteams",
];

/// Slack incoming-webhook settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackSettings {
    pub webhook_url: String,
    /// Channel override, e.g. `#ops`.
    pub channel: Option<String>,
    pub username: Option<String>,
    pub icon_emoji: Option<String>,
    /// Slack user ids mentioned on critical events.
    pub mention_users: Vec<String>,
}

/// Discord webhook settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscordSettings {
    pub webhook_url: String,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

/// Microsoft Teams incoming-webhook settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsTeamsSettings {
    pub webhook_url: String,
}

/// HTTP method for the generic webhook.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WebhookMethod {
    #[default]
    Post,
    Put,
    Patch,
}

/// Webhook authentication configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WebhookAuth {
    /// Bearer token authentication.
    Bearer { token: String },
    /// Basic authentication.
    Basic { username: String, password: String },
    /// Custom header authentication.
    Header { name: String, value: String },
}

/// Generic webhook settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookSettings {
    pub url: String,
    pub method: WebhookMethod,
    pub headers: BTreeMap<String, String>,
    pub auth: Option<WebhookAuth>,
    pub timeout_ms: u64,
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmtpTls {
    /// Plain connection. Only sensible for local relays.
    None,
    /// Upgrade with `STARTTLS` after the greeting.
    StartTls,
    /// TLS from the first byte (usually port 465).
    Implicit,
}

impl SmtpTls {
    /// The conventional mode for a port.
    pub fn for_port(port: u16) -> Self {
        if port == 465 {
            Self::Implicit
        } else {
            Self::StartTls
        }
    }
}

/// SMTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub tls: SmtpTls,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_ms: u64,
}

/// Email settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailSettings {
    pub smtp: SmtpSettings,
    pub from: String,
    pub to: Vec<String>,
    pub subject_prefix: Option<String>,
}

/// PagerDuty Events API v2 settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagerDutySettings {
    pub integration_key: String,
    pub api_url: String,
}

/// Settings of a user-registered provider type.
///
/// `options` holds every non-base field of the raw config, with secret
/// references already resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomSettings {
    #[serde(skip)]
    pub provider_type: String,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}
