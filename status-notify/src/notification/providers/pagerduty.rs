//! PagerDuty Events API v2 provider.
//!
//! Problem events trigger an alert, resolution events resolve it. Both use a
//! dedup key derived from the incident id or system name so a later
//! resolution closes the alert opened for the same subject.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};

use super::{footer, http, is_resolution, settings_mismatch};
use crate::notification::config::{
    DEFAULT_HTTP_TIMEOUT_MS, PagerDutySettings, ProviderConfig, ProviderSettings,
};
use crate::notification::context::NotificationContext;
use crate::notification::events::{NotificationEvent, Severity};
use crate::notification::provider::NotificationProvider;
use crate::notification::result::{DeliveryReceipt, NotificationResult};

/// PagerDuty rejects summaries longer than this.
const MAX_SUMMARY_CHARS: usize = 1024;

/// Sends trigger/resolve events to PagerDuty.
pub struct PagerDutyProvider {
    settings: PagerDutySettings,
    client: Client,
}

impl PagerDutyProvider {
    pub fn new(settings: PagerDutySettings) -> NotificationResult<Self> {
        Ok(Self {
            settings,
            client: http::client(DEFAULT_HTTP_TIMEOUT_MS)?,
        })
    }

    pub fn from_config(config: &ProviderConfig) -> NotificationResult<Self> {
        match &config.settings {
            ProviderSettings::PagerDuty(settings) => Self::new(settings.clone()),
            _ => Err(settings_mismatch(config, "pagerduty")),
        }
    }

    fn build_payload(&self, context: &NotificationContext) -> Value {
        let event = &context.event;
        let event_action = if is_resolution(event) {
            "resolve"
        } else {
            "trigger"
        };

        let mut payload = json!({
            "routing_key": self.settings.integration_key,
            "event_action": event_action,
            "dedup_key": dedup_key(event),
        });

        if event_action == "trigger" {
            let summary: String = event.title().chars().take(MAX_SUMMARY_CHARS).collect();
            let source = event
                .affected_entities()
                .first()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "status-notify".to_string());

            payload["payload"] = json!({
                "summary": summary,
                "source": source,
                "severity": pagerduty_severity(event.severity()),
                "timestamp": event.timestamp().to_rfc3339(),
                "component": event.affected_entities().join(", "),
                "class": event.kind().as_str(),
                "custom_details": {
                    "details": event.summary(),
                    "context": footer(context),
                },
            });
            if let Some(link) = context.link() {
                payload["links"] = json!([{ "href": link, "text": "Status page" }]);
            }
        }

        payload
    }
}

/// Stable key linking a trigger to its later resolution.
fn dedup_key(event: &NotificationEvent) -> String {
    match event {
        NotificationEvent::IncidentOpened { incident_id, .. }
        | NotificationEvent::IncidentClosed { incident_id, .. }
        | NotificationEvent::IncidentUpdated { incident_id, .. } => {
            format!("incident-{}", incident_id)
        }
        NotificationEvent::MaintenanceScheduled { maintenance_id, .. }
        | NotificationEvent::MaintenanceStarted { maintenance_id, .. }
        | NotificationEvent::MaintenanceCompleted { maintenance_id, .. } => {
            format!("maintenance-{}", maintenance_id)
        }
        NotificationEvent::SystemDown { system_name, .. }
        | NotificationEvent::SystemDegraded { system_name, .. }
        | NotificationEvent::SystemRecovered { system_name, .. } => {
            format!("system-{}", system_name)
        }
        NotificationEvent::SloBreached {
            system_name,
            slo_name,
            ..
        } => format!("slo-{}-{}", system_name, slo_name),
    }
}

fn pagerduty_severity(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "critical",
        Severity::Major => "error",
        Severity::Minor => "warning",
    }
}

#[async_trait]
impl NotificationProvider for PagerDutyProvider {
    async fn send_notification(
        &self,
        context: &NotificationContext,
    ) -> NotificationResult<DeliveryReceipt> {
        let payload = self.build_payload(context);
        let request = self.client.post(&self.settings.api_url).json(&payload);
        let reply = http::execute("PagerDuty", request).await?;
        Ok(reply.into_receipt())
    }

    async fn validate_provider_config(&self) -> NotificationResult<()> {
        http::check_endpoint("PagerDuty", &self.settings.api_url, true)?;
        Ok(())
    }
}
