//! Email provider using SMTP.

use async_trait::async_trait;
use lettre::Message;
use lettre::message::{Mailbox, MultiPart};
use serde_json::json;
use uuid::Uuid;

use super::smtp;
use super::{event_color, footer, settings_mismatch};
use crate::notification::config::{EmailSettings, ProviderConfig, ProviderSettings};
use crate::notification::context::NotificationContext;
use crate::notification::provider::NotificationProvider;
use crate::notification::result::{DeliveryReceipt, NotificationError, NotificationResult};

/// Default subject prefix.
const DEFAULT_SUBJECT_PREFIX: &str = "[Status]";

/// Sends a multipart (text + HTML) email per event.
pub struct EmailProvider {
    settings: EmailSettings,
}

impl EmailProvider {
    pub fn new(settings: EmailSettings) -> Self {
        Self { settings }
    }

    pub fn from_config(config: &ProviderConfig) -> NotificationResult<Self> {
        match &config.settings {
            ProviderSettings::Email(settings) => Ok(Self::new(settings.clone())),
            _ => Err(settings_mismatch(config, "email")),
        }
    }

    /// Build the email subject. Always a single line.
    fn build_subject(&self, context: &NotificationContext) -> String {
        let prefix = self
            .settings
            .subject_prefix
            .as_deref()
            .unwrap_or(DEFAULT_SUBJECT_PREFIX);
        let subject = if prefix.is_empty() {
            context.event.title()
        } else {
            format!("{} {}", prefix, context.event.title())
        };
        single_line(&subject)
    }

    /// Build the email body (plain text).
    fn build_body_text(&self, context: &NotificationContext) -> String {
        let event = &context.event;
        let mut body = format!(
            "{}\n\n{}\n\nSeverity: {}\nType: {}\nTime: {}",
            event.title(),
            event.summary(),
            event.severity(),
            event.kind(),
            event.timestamp().to_rfc3339()
        );
        let entities = event.affected_entities();
        if !entities.is_empty() {
            body.push_str(&format!("\nAffected: {}", entities.join(", ")));
        }
        if let Some(link) = context.link() {
            body.push_str(&format!("\n\nDetails: {}", link));
        }
        body
    }

    /// Build the email body (HTML).
    fn build_body_html(&self, context: &NotificationContext) -> String {
        let event = &context.event;
        let link = context
            .link()
            .map(|url| {
                format!(
                    r#"<p><a href="{}">View details</a></p>"#,
                    escape_html(url)
                )
            })
            .unwrap_or_default();

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 20px; }}
        .header {{ background-color: #{:06x}; color: white; padding: 15px; border-radius: 5px; }}
        .content {{ padding: 20px; background-color: #f9f9f9; border-radius: 5px; margin-top: 10px; }}
        .footer {{ color: #666; font-size: 12px; margin-top: 20px; }}
    </style>
</head>
<body>
    <div class="header">
        <h2>{}</h2>
    </div>
    <div class="content">
        <p>{}</p>
        {}
    </div>
    <div class="footer">
        <p>Severity: {} | {} | Time: {}</p>
    </div>
</body>
</html>"#,
            event_color(event),
            escape_html(&event.title()),
            escape_html(&event.summary()),
            link,
            event.severity(),
            escape_html(&footer(context)),
            event.timestamp().to_rfc3339()
        )
    }

    /// Assemble the multipart (text + HTML) message.
    fn build_message(
        &self,
        context: &NotificationContext,
        message_id: &str,
    ) -> NotificationResult<Message> {
        let mut builder = Message::builder()
            .from(mailbox(&self.settings.from)?)
            .subject(self.build_subject(context))
            .message_id(Some(message_id.to_string()))
            .date_now();
        for to in &self.settings.to {
            builder = builder.to(mailbox(to)?);
        }

        builder
            .multipart(MultiPart::alternative_plain_html(
                self.build_body_text(context),
                self.build_body_html(context),
            ))
            .map_err(|e| NotificationError::configuration("failed to build email").with_cause(e))
    }

    fn message_id(&self) -> String {
        let domain = self
            .settings
            .from
            .rsplit_once('@')
            .map(|(_, domain)| domain)
            .unwrap_or("localhost");
        format!("<{}@{}>", Uuid::new_v4(), domain)
    }
}

fn mailbox(address: &str) -> NotificationResult<Mailbox> {
    address.parse().map_err(|e| {
        NotificationError::configuration(format!("invalid email address '{}'", address))
            .with_cause(e)
    })
}

/// Collapse line breaks so header values cannot start a new header.
fn single_line(text: &str) -> String {
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[async_trait]
impl NotificationProvider for EmailProvider {
    async fn send_notification(
        &self,
        context: &NotificationContext,
    ) -> NotificationResult<DeliveryReceipt> {
        let message_id = self.message_id();
        let message = self.build_message(context, &message_id)?;

        let response = smtp::send_mail(&self.settings.smtp, message).await?;

        Ok(DeliveryReceipt::with_response(json!({
            "message_id": message_id,
            "recipients": self.settings.to.len(),
            "smtp_code": response.code().to_string(),
        })))
    }

    async fn validate_provider_config(&self) -> NotificationResult<()> {
        smtp::check(&self.settings.smtp).await
    }
}
