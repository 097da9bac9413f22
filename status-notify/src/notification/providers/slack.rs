//! Slack incoming-webhook provider.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use super::{event_color, footer, http, settings_mismatch};
use crate::notification::config::{
    DEFAULT_HTTP_TIMEOUT_MS, ProviderConfig, ProviderSettings, SlackSettings,
};
use crate::notification::context::NotificationContext;
use crate::notification::events::Severity;
use crate::notification::provider::NotificationProvider;
use crate::notification::result::{DeliveryReceipt, NotificationResult};

/// Posts Slack attachment messages to an incoming webhook.
pub struct SlackProvider {
    settings: SlackSettings,
    client: Client,
}

impl SlackProvider {
    pub fn new(settings: SlackSettings) -> NotificationResult<Self> {
        Ok(Self {
            settings,
            client: http::client(DEFAULT_HTTP_TIMEOUT_MS)?,
        })
    }

    pub fn from_config(config: &ProviderConfig) -> NotificationResult<Self> {
        match &config.settings {
            ProviderSettings::Slack(settings) => Self::new(settings.clone()),
            _ => Err(settings_mismatch(config, "slack")),
        }
    }

    fn build_payload(&self, context: &NotificationContext) -> Value {
        let event = &context.event;

        let mut text = String::new();
        if event.severity() == Severity::Critical {
            for user in &self.settings.mention_users {
                text.push_str(&format!("<@{}> ", user));
            }
        }
        text.push_str(&format!("*{}*", event.title()));

        let mut fields = vec![json!({
            "title": "Severity",
            "value": event.severity().as_str(),
            "short": true,
        })];
        let entities = event.affected_entities();
        if !entities.is_empty() {
            fields.push(json!({
                "title": "Affected",
                "value": entities.join(", "),
                "short": true,
            }));
        }

        let mut attachment = json!({
            "color": format!("#{:06x}", event_color(event)),
            "title": event.title(),
            "text": event.summary(),
            "fields": fields,
            "footer": footer(context),
            "ts": event.timestamp().timestamp(),
        });
        if let Some(link) = context.link() {
            attachment["title_link"] = json!(link);
        }

        let mut payload = json!({
            "text": text,
            "attachments": [attachment],
        });
        if let Some(channel) = &self.settings.channel {
            payload["channel"] = json!(channel);
        }
        if let Some(username) = &self.settings.username {
            payload["username"] = json!(username);
        }
        if let Some(icon_emoji) = &self.settings.icon_emoji {
            payload["icon_emoji"] = json!(icon_emoji);
        }

        payload
    }
}

#[async_trait]
impl NotificationProvider for SlackProvider {
    async fn send_notification(
        &self,
        context: &NotificationContext,
    ) -> NotificationResult<DeliveryReceipt> {
        let payload = self.build_payload(context);
        let request = self.client.post(&self.settings.webhook_url).json(&payload);
        let reply = http::execute("Slack", request).await?;
        Ok(reply.into_receipt())
    }

    async fn validate_provider_config(&self) -> NotificationResult<()> {
        http::check_endpoint("Slack", &self.settings.webhook_url, true)?;
        Ok(())
    }
}
