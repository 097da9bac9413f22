//! Built-in providers.
//!
//! Each renders an event with a small fixed layout (title, summary, link) and
//! makes exactly one protocol call per attempt; retries and filtering are the
//! pipeline's job.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{Instrument, Span, debug};

use super::config::ProviderConfig;
use super::context::NotificationContext;
use super::events::{NotificationEvent, Severity};
use super::provider::NotificationProvider;
use super::registry::{ProviderConstructor, ProviderLoader};
use super::result::{DeliveryReceipt, NotificationError, NotificationResult};

pub mod discord;
pub mod email;
pub mod msteams;
pub mod pagerduty;
pub mod slack;
pub mod smtp;
pub mod webhook;

mod http;

pub use discord::DiscordProvider;
pub use email::EmailProvider;
pub use msteams::MsTeamsProvider;
pub use pagerduty::PagerDutyProvider;
pub use slack::SlackProvider;
pub use webhook::WebhookProvider;

/// Wrap a typed constructor into a registry loader.
fn loader<P>(build: fn(&ProviderConfig) -> NotificationResult<P>) -> ProviderLoader
where
    P: NotificationProvider + 'static,
{
    Box::new(move || -> ProviderConstructor {
        Arc::new(
            move |config: &ProviderConfig,
                  span: &Span|
                  -> NotificationResult<Arc<dyn NotificationProvider>> {
                let inner = build(config)?;
                debug!(parent: span, "Provider constructed");
                Ok(Arc::new(Traced {
                    inner,
                    span: span.clone(),
                }))
            },
        )
    })
}

/// Runs every channel call inside the provider's span, so a channel's own
/// log lines carry the provider id and type.
struct Traced<P> {
    inner: P,
    span: Span,
}

#[async_trait]
impl<P: NotificationProvider> NotificationProvider for Traced<P> {
    async fn send_notification(
        &self,
        context: &NotificationContext,
    ) -> NotificationResult<DeliveryReceipt> {
        self.inner
            .send_notification(context)
            .instrument(self.span.clone())
            .await
    }

    async fn validate_provider_config(&self) -> NotificationResult<()> {
        self.inner
            .validate_provider_config()
            .instrument(self.span.clone())
            .await
    }
}

/// Loaders for the built-in provider types.
pub(crate) fn builtin_loaders() -> Vec<(&'static str, ProviderLoader)> {
    vec![
        ("slack", loader(SlackProvider::from_config)),
        ("email", loader(EmailProvider::from_config)),
        ("webhook", loader(WebhookProvider::from_config)),
        ("discord", loader(DiscordProvider::from_config)),
        ("pagerduty", loader(PagerDutyProvider::from_config)),
        ("msteams", loader(MsTeamsProvider::from_config)),
    ]
}

/// Error for a config whose settings do not belong to the provider type.
pub(crate) fn settings_mismatch(config: &ProviderConfig, expected: &str) -> NotificationError {
    NotificationError::configuration(format!(
        "provider '{}' has '{}' settings, expected '{}'",
        config.id,
        config.provider_type(),
        expected
    ))
}

/// Whether the event reports that a problem is over.
pub(crate) fn is_resolution(event: &NotificationEvent) -> bool {
    matches!(
        event,
        NotificationEvent::IncidentClosed { .. }
            | NotificationEvent::MaintenanceCompleted { .. }
            | NotificationEvent::SystemRecovered { .. }
    )
}

/// RGB accent color for an event.
pub(crate) fn event_color(event: &NotificationEvent) -> u32 {
    if is_resolution(event) {
        return 0x2ecc71; // Green
    }
    match event.severity() {
        Severity::Minor => 0x3498db,    // Blue
        Severity::Major => 0xf39c12,    // Orange
        Severity::Critical => 0xe74c3c, // Red
    }
}

/// Footer line built from organization and environment.
pub(crate) fn footer(context: &NotificationContext) -> String {
    let mut parts = Vec::new();
    if let Some(organization) = &context.metadata.organization {
        parts.push(organization.clone());
    }
    if let Some(environment) = &context.metadata.environment {
        parts.push(environment.clone());
    }
    parts.push(format!("Type: {}", context.event.kind()));
    parts.join(" | ")
}
