//! Generic webhook provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client,
    header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue},
};
use serde_json::{Value, json};
use tracing::warn;

use super::{http, settings_mismatch};
use crate::notification::config::{
    ProviderConfig, ProviderSettings, WebhookAuth, WebhookMethod, WebhookSettings,
};
use crate::notification::context::NotificationContext;
use crate::notification::provider::NotificationProvider;
use crate::notification::result::{DeliveryReceipt, NotificationError, NotificationResult};

/// Sends the full event as JSON to an arbitrary endpoint.
pub struct WebhookProvider {
    settings: WebhookSettings,
    headers: HeaderMap,
    client: Client,
}

impl WebhookProvider {
    pub fn new(settings: WebhookSettings) -> NotificationResult<Self> {
        let headers = build_headers(&settings)?;
        let client = http::client(settings.timeout_ms)?;
        Ok(Self {
            settings,
            headers,
            client,
        })
    }

    pub fn from_config(config: &ProviderConfig) -> NotificationResult<Self> {
        match &config.settings {
            ProviderSettings::Webhook(settings) => Self::new(settings.clone()),
            _ => Err(settings_mismatch(config, "webhook")),
        }
    }

    /// Build the JSON payload.
    fn build_payload(&self, context: &NotificationContext) -> Value {
        let event = &context.event;
        json!({
            "event_type": event.kind().as_str(),
            "severity": event.severity().as_str(),
            "title": event.title(),
            "summary": event.summary(),
            "timestamp": event.timestamp().to_rfc3339(),
            "affected": event.affected_entities(),
            "url": context.link(),
            "event": event,
            "metadata": &context.metadata,
        })
    }
}

/// Build the static request headers: custom headers first, auth last.
fn build_headers(settings: &WebhookSettings) -> NotificationResult<HeaderMap> {
    let mut headers = HeaderMap::new();

    for (name, value) in &settings.headers {
        let (name, value) = parse_header(name, value)?;
        headers.insert(name, value);
    }

    match &settings.auth {
        Some(WebhookAuth::Bearer { token }) => {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| NotificationError::configuration("invalid bearer token").with_cause(e))?;
            headers.insert(AUTHORIZATION, value);
        }
        Some(WebhookAuth::Header { name, value }) => {
            let (name, value) = parse_header(name, value)?;
            headers.insert(name, value);
        }
        // Basic auth is applied on the request builder.
        Some(WebhookAuth::Basic { .. }) | None => {}
    }

    Ok(headers)
}

fn parse_header(name: &str, value: &str) -> NotificationResult<(HeaderName, HeaderValue)> {
    let header_name = name.parse::<HeaderName>().map_err(|e| {
        NotificationError::configuration(format!("invalid header name '{}'", name)).with_cause(e)
    })?;
    let header_value = value.parse::<HeaderValue>().map_err(|e| {
        NotificationError::configuration(format!("invalid value for header '{}'", name))
            .with_cause(e)
    })?;
    Ok((header_name, header_value))
}

#[async_trait]
impl NotificationProvider for WebhookProvider {
    async fn send_notification(
        &self,
        context: &NotificationContext,
    ) -> NotificationResult<DeliveryReceipt> {
        let payload = self.build_payload(context);
        let url = &self.settings.url;

        let mut request = match self.settings.method {
            WebhookMethod::Post => self.client.post(url),
            WebhookMethod::Put => self.client.put(url),
            WebhookMethod::Patch => self.client.patch(url),
        };
        request = request.headers(self.headers.clone()).json(&payload);

        if let Some(WebhookAuth::Basic { username, password }) = &self.settings.auth {
            request = request.basic_auth(username, Some(password));
        }

        let reply = http::execute("Webhook", request).await?;
        Ok(reply.into_receipt())
    }

    async fn validate_provider_config(&self) -> NotificationResult<()> {
        let url = http::check_endpoint("Webhook", &self.settings.url, false)?;
        if url.scheme() != "https" && self.settings.auth.is_some() {
            warn!(url = %url, "Webhook credentials will be sent over plain HTTP");
        }
        if Duration::from_millis(self.settings.timeout_ms).is_zero() {
            return Err(NotificationError::validation(
                "webhook timeout must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::providers::http::tests::serve;
    use crate::notification::providers::tests::{context, incident_opened};
    use axum::{
        Json, Router,
        extract::State,
        http::{HeaderMap as AxumHeaders, StatusCode},
        routing::put,
    };
    use parking_lot::Mutex;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn settings(url: &str) -> WebhookSettings {
        WebhookSettings {
            url: url.to_string(),
            method: WebhookMethod::Post,
            headers: BTreeMap::new(),
            auth: None,
            timeout_ms: 5_000,
        }
    }

    #[test]
    fn test_build_headers_with_bearer() {
        let mut settings = settings("https://example.com/webhook");
        settings
            .headers
            .insert("X-Source".to_string(), "status".to_string());
        settings.auth = Some(WebhookAuth::Bearer {
            token: "test-token".to_string(),
        });

        let headers = build_headers(&settings).unwrap();
        assert_eq!(headers.get("authorization").unwrap(), "Bearer test-token");
        assert_eq!(headers.get("x-source").unwrap(), "status");
    }

    #[test]
    fn test_invalid_header_is_configuration_error() {
        let mut settings = settings("https://example.com/webhook");
        settings
            .headers
            .insert("bad header".to_string(), "x".to_string());

        let err = WebhookProvider::new(settings).err().unwrap();
        assert!(err.message.contains("bad header"));
    }

    #[test]
    fn test_build_payload() {
        let provider = WebhookProvider::new(settings("https://example.com/webhook")).unwrap();
        let payload = provider.build_payload(&context(incident_opened()));

        assert_eq!(payload["event_type"], "incident.opened");
        assert_eq!(payload["severity"], "critical");
        assert_eq!(payload["affected"][1], "payments");
        assert_eq!(payload["event"]["incident_id"], "INC-7");
        assert_eq!(payload["metadata"]["organization"], "Example Corp");
    }

    type Captured = Arc<Mutex<Vec<(Option<String>, Value)>>>;

    #[tokio::test]
    async fn test_send_with_method_and_auth() {
        let captured: Captured = Arc::default();
        let app = Router::new()
            .route(
                "/hook",
                put(
                    |State(captured): State<Captured>, headers: AxumHeaders, Json(body): Json<Value>| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        captured.lock().push((auth, body));
                        (StatusCode::ACCEPTED, Json(json!({ "queued": true })))
                    },
                ),
            )
            .with_state(captured.clone());
        let addr = serve(app).await;

        let mut settings = settings(&format!("http://{}/hook", addr));
        settings.method = WebhookMethod::Put;
        settings.auth = Some(WebhookAuth::Basic {
            username: "user".to_string(),
            password: "pass".to_string(),
        });
        let provider = WebhookProvider::new(settings).unwrap();

        let receipt = provider
            .send_notification(&context(incident_opened()))
            .await
            .unwrap();
        let response = receipt.response.unwrap();
        assert_eq!(response["status"], 202);
        assert_eq!(response["body"]["queued"], true);

        let captured = captured.lock();
        assert_eq!(captured.len(), 1);
        // base64("user:pass")
        assert_eq!(captured[0].0.as_deref(), Some("Basic dXNlcjpwYXNz"));
        assert_eq!(captured[0].1["title"], "Incident opened: Checkout errors");
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let app = Router::new().route(
            "/hook",
            axum::routing::post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "maintenance") }),
        );
        let addr = serve(app).await;

        let provider = WebhookProvider::new(settings(&format!("http://{}/hook", addr))).unwrap();
        let err = provider
            .send_notification(&context(incident_opened()))
            .await
            .unwrap_err();
        assert!(err.retryable);
        assert!(err.message.contains("503"));
    }
}
