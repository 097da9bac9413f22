//! Notification system module.
//!
//! Delivers status events (outages, degradations, incidents, maintenance,
//! SLO breaches) to external channels such as Slack, Discord, Microsoft
//! Teams, PagerDuty, generic webhooks and email.
//!
//! # Features
//!
//! - Pluggable provider types through a [`ProviderRegistry`]
//! - Per-provider event, entity and severity filters
//! - Sliding-window rate limiting
//! - Retry with exponential backoff
//! - Bounded concurrent fan-out with failure isolation
//! - Per-provider delivery statistics
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use status_notify::notification::{
//!     NotificationService, NotificationServiceConfig, ProviderRegistry,
//! };
//!
//! let registry = Arc::new(ProviderRegistry::with_builtins());
//! let service = NotificationService::new(NotificationServiceConfig::default(), registry);
//! service.initialize().await?;
//! let results = service.notify(event, None).await?;
//! ```

pub mod config;
pub mod context;
pub mod events;
pub mod provider;
pub mod providers;
pub mod rate_limit;
pub mod registry;
pub mod result;
pub mod secrets;
pub mod service;
pub mod stats;
pub mod validation;

pub use config::{
    CustomSettings, DiscordSettings, EmailSettings, MsTeamsSettings, PagerDutySettings,
    ProviderConfig, ProviderSettings, RateLimitPolicy, RetryPolicy, SlackSettings, SmtpSettings,
    SmtpTls, WebhookAuth, WebhookMethod, WebhookSettings,
};
pub use context::{NotificationContext, NotificationMetadata};
pub use events::{EventKind, NotificationEvent, Severity};
pub use provider::{BaseProvider, NotificationProvider};
pub use registry::{ProviderConstructor, ProviderLoader, ProviderRegistry};
pub use result::{
    DeliveryOutcome, DeliveryReceipt, ErrorCode, NotificationError, NotificationResult, SkipReason,
};
pub use secrets::{EnvSecrets, MapSecrets, SecretSource};
pub use service::{
    BatchReport, DispatchResults, EventReport, LoadingStrategy, NotificationService,
    NotificationServiceConfig, ProviderInfo,
};
pub use stats::NotificationStats;
pub use validation::ConfigValidator;
