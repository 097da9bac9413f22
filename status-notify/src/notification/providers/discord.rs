//! Discord webhook provider.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use super::{event_color, footer, http, settings_mismatch};
use crate::notification::config::{
    DEFAULT_HTTP_TIMEOUT_MS, DiscordSettings, ProviderConfig, ProviderSettings,
};
use crate::notification::context::NotificationContext;
use crate::notification::provider::NotificationProvider;
use crate::notification::result::{DeliveryReceipt, NotificationResult};

/// Discord limits embed descriptions to 4096 characters.
const MAX_DESCRIPTION_CHARS: usize = 4096;

/// Posts embeds to a Discord webhook.
///
/// Rate-limited responses (429) are reported as retryable errors carrying the
/// server's `Retry-After` hint.
pub struct DiscordProvider {
    settings: DiscordSettings,
    client: Client,
}

impl DiscordProvider {
    pub fn new(settings: DiscordSettings) -> NotificationResult<Self> {
        Ok(Self {
            settings,
            client: http::client(DEFAULT_HTTP_TIMEOUT_MS)?,
        })
    }

    pub fn from_config(config: &ProviderConfig) -> NotificationResult<Self> {
        match &config.settings {
            ProviderSettings::Discord(settings) => Self::new(settings.clone()),
            _ => Err(settings_mismatch(config, "discord")),
        }
    }

    /// Build the webhook payload for an event.
    fn build_payload(&self, context: &NotificationContext) -> Value {
        let event = &context.event;
        let description: String = event.summary().chars().take(MAX_DESCRIPTION_CHARS).collect();

        let mut embed = json!({
            "title": event.title(),
            "description": description,
            "color": event_color(event),
            "timestamp": event.timestamp().to_rfc3339(),
            "footer": {
                "text": format!("Severity: {} | {}", event.severity(), footer(context))
            }
        });
        if let Some(link) = context.link() {
            embed["url"] = json!(link);
        }

        let entities = event.affected_entities();
        if !entities.is_empty() {
            embed["fields"] = json!([{
                "name": "Affected",
                "value": entities.join(", "),
                "inline": true,
            }]);
        }

        let mut payload = json!({
            "embeds": [embed]
        });

        if let Some(username) = &self.settings.username {
            payload["username"] = json!(username);
        }
        if let Some(avatar_url) = &self.settings.avatar_url {
            payload["avatar_url"] = json!(avatar_url);
        }

        payload
    }
}

#[async_trait]
impl NotificationProvider for DiscordProvider {
    async fn send_notification(
        &self,
        context: &NotificationContext,
    ) -> NotificationResult<DeliveryReceipt> {
        let payload = self.build_payload(context);
        let request = self.client.post(&self.settings.webhook_url).json(&payload);
        let reply = http::execute("Discord", request).await?;
        Ok(reply.into_receipt())
    }

    async fn validate_provider_config(&self) -> NotificationResult<()> {
        http::check_endpoint("Discord", &self.settings.webhook_url, true)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::providers::http::tests::serve;
    use crate::notification::providers::tests::{context, incident_opened, system_recovered};
    use axum::{Router, http::StatusCode, routing::post};

    fn settings(url: &str) -> DiscordSettings {
        DiscordSettings {
            webhook_url: url.to_string(),
            username: Some("status".to_string()),
            avatar_url: None,
        }
    }

    #[test]
    fn test_build_payload() {
        let provider =
            DiscordProvider::new(settings("https://discord.com/api/webhooks/1/x")).unwrap();
        let payload = provider.build_payload(&context(incident_opened()));

        assert_eq!(payload["username"], "status");
        assert!(payload.get("avatar_url").is_none());

        let embed = &payload["embeds"][0];
        assert_eq!(embed["title"], "Incident opened: Checkout errors");
        assert_eq!(embed["color"], 0xe74c3c);
        assert_eq!(embed["url"], "https://status.example.com/incidents/INC-7");
        assert_eq!(embed["fields"][0]["value"], "checkout, payments");
        assert!(
            embed["footer"]["text"]
                .as_str()
                .unwrap()
                .starts_with("Severity: critical")
        );
    }

    #[test]
    fn test_recovery_is_green() {
        let provider =
            DiscordProvider::new(settings("https://discord.com/api/webhooks/1/x")).unwrap();
        let payload = provider.build_payload(&context(system_recovered()));
        assert_eq!(payload["embeds"][0]["color"], 0x2ecc71);
        assert_eq!(payload["embeds"][0]["description"], "Down for 1h 15m");
    }

    #[tokio::test]
    async fn test_rate_limited_response_is_retryable() {
        let app = Router::new().route(
            "/hook",
            post(|| async {
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [("Retry-After", "0.5")],
                    r#"{"message":"You are being rate limited."}"#,
                )
            }),
        );
        let addr = serve(app).await;

        let provider = DiscordProvider::new(settings(&format!("http://{}/hook", addr))).unwrap();
        let err = provider
            .send_notification(&context(incident_opened()))
            .await
            .unwrap_err();
        assert!(err.retryable);
        assert!(err.message.contains("retry after 0.5s"));
    }

    #[tokio::test]
    async fn test_no_content_is_success() {
        let app = Router::new().route("/hook", post(|| async { StatusCode::NO_CONTENT }));
        let addr = serve(app).await;

        let provider = DiscordProvider::new(settings(&format!("http://{}/hook", addr))).unwrap();
        let receipt = provider
            .send_notification(&context(incident_opened()))
            .await
            .unwrap();
        assert_eq!(receipt.response.unwrap()["status"], 204);
    }
}
