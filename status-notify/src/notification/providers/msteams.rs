//! Microsoft Teams incoming-webhook provider.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use super::{event_color, http, settings_mismatch};
use crate::notification::config::{
    DEFAULT_HTTP_TIMEOUT_MS, MsTeamsSettings, ProviderConfig, ProviderSettings,
};
use crate::notification::context::NotificationContext;
use crate::notification::provider::NotificationProvider;
use crate::notification::result::{DeliveryReceipt, NotificationResult};

/// Posts `MessageCard`s to a Teams incoming webhook.
pub struct MsTeamsProvider {
    settings: MsTeamsSettings,
    client: Client,
}

impl MsTeamsProvider {
    pub fn new(settings: MsTeamsSettings) -> NotificationResult<Self> {
        Ok(Self {
            settings,
            client: http::client(DEFAULT_HTTP_TIMEOUT_MS)?,
        })
    }

    pub fn from_config(config: &ProviderConfig) -> NotificationResult<Self> {
        match &config.settings {
            ProviderSettings::MsTeams(settings) => Self::new(settings.clone()),
            _ => Err(settings_mismatch(config, "msteams")),
        }
    }

    fn build_payload(&self, context: &NotificationContext) -> Value {
        let event = &context.event;

        let mut facts = vec![
            json!({ "name": "Severity", "value": event.severity().as_str() }),
            json!({ "name": "Event", "value": event.kind().as_str() }),
        ];
        let entities = event.affected_entities();
        if !entities.is_empty() {
            facts.push(json!({ "name": "Affected", "value": entities.join(", ") }));
        }
        if let Some(environment) = &context.metadata.environment {
            facts.push(json!({ "name": "Environment", "value": environment }));
        }

        let mut card = json!({
            "@type": "MessageCard",
            "@context": "https://schema.org/extensions",
            "themeColor": format!("{:06X}", event_color(event)),
            "summary": event.title(),
            "sections": [{
                "activityTitle": event.title(),
                "activitySubtitle": event.timestamp().to_rfc3339(),
                "text": event.summary(),
                "facts": facts,
            }],
        });

        if let Some(link) = context.link() {
            card["potentialAction"] = json!([{
                "@type": "OpenUri",
                "name": "View details",
                "targets": [{ "os": "default", "uri": link }],
            }]);
        }

        card
    }
}

#[async_trait]
impl NotificationProvider for MsTeamsProvider {
    async fn send_notification(
        &self,
        context: &NotificationContext,
    ) -> NotificationResult<DeliveryReceipt> {
        let payload = self.build_payload(context);
        let request = self.client.post(&self.settings.webhook_url).json(&payload);
        let reply = http::execute("Teams", request).await?;
        Ok(reply.into_receipt())
    }

    async fn validate_provider_config(&self) -> NotificationResult<()> {
        http::check_endpoint("Teams", &self.settings.webhook_url, true)?;
        Ok(())
    }
}
