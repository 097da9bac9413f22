//! Delivery context: the event plus shared metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::events::NotificationEvent;

/// Metadata shared by every notification sent by a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationMetadata {
    /// Public status page URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    /// Deployment environment (production, staging, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    /// Free-form values for custom providers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, Value>,
}

impl NotificationMetadata {
    /// Merge `overrides` on top of `self`.
    ///
    /// Fields set in `overrides` win; `extra` maps are merged key by key.
    pub fn merged_with(&self, overrides: &NotificationMetadata) -> NotificationMetadata {
        let mut extra = self.extra.clone();
        extra.extend(
            overrides
                .extra
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );

        NotificationMetadata {
            status_page_url: overrides
                .status_page_url
                .clone()
                .or_else(|| self.status_page_url.clone()),
            organization: overrides
                .organization
                .clone()
                .or_else(|| self.organization.clone()),
            environment: overrides
                .environment
                .clone()
                .or_else(|| self.environment.clone()),
            extra,
        }
    }
}

/// Everything a provider needs to deliver one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationContext {
    pub event: NotificationEvent,
    #[serde(flatten)]
    pub metadata: NotificationMetadata,
}

impl NotificationContext {
    pub fn new(event: NotificationEvent, metadata: NotificationMetadata) -> Self {
        Self { event, metadata }
    }

    /// The event link, falling back to the status page.
    pub fn link(&self) -> Option<&str> {
        self.event
            .url()
            .or(self.metadata.status_page_url.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_merge_prefers_overrides() {
        let defaults = NotificationMetadata {
            status_page_url: Some("https://status.example.com".to_string()),
            organization: Some("Example".to_string()),
            environment: Some("production".to_string()),
            extra: BTreeMap::from([
                ("team".to_string(), json!("sre")),
                ("region".to_string(), json!("eu")),
            ]),
        };
        let overrides = NotificationMetadata {
            environment: Some("staging".to_string()),
            extra: BTreeMap::from([("region".to_string(), json!("us"))]),
            ..Default::default()
        };

        let merged = defaults.merged_with(&overrides);
        assert_eq!(merged.status_page_url, defaults.status_page_url);
        assert_eq!(merged.organization.as_deref(), Some("Example"));
        assert_eq!(merged.environment.as_deref(), Some("staging"));
        assert_eq!(merged.extra["team"], json!("sre"));
        assert_eq!(merged.extra["region"], json!("us"));
    }

    #[test]
    fn test_link_falls_back_to_status_page() {
        let event = NotificationEvent::SystemRecovered {
            system_name: "api".to_string(),
            downtime_minutes: None,
            url: None,
            timestamp: Utc::now(),
        };
        let context = NotificationContext::new(
            event,
            NotificationMetadata {
                status_page_url: Some("https://status.example.com".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(context.link(), Some("https://status.example.com"));
    }
}
