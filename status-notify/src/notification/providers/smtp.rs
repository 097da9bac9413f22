//! SMTP submission over `lettre`.
//!
//! Every call opens its own session and closes it afterwards. 4xx replies are
//! transient and 5xx replies are permanent.

use std::time::Duration;

use lettre::transport::smtp::Error as SmtpError;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::response::Response;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use crate::notification::config::{SmtpSettings, SmtpTls};
use crate::notification::result::{NotificationError, NotificationResult};
use crate::utils::http_client::install_rustls_provider;

type Transport = AsyncSmtpTransport<Tokio1Executor>;

/// Submit one message. The envelope is taken from its `From` and `To` headers.
pub async fn send_mail(settings: &SmtpSettings, message: Message) -> NotificationResult<Response> {
    let transport = transport(settings)?;
    let response = with_deadline(settings, transport.send(message))
        .await?
        .map_err(|e| classify("delivery", e))?;

    debug!(
        host = %settings.host,
        port = settings.port,
        code = %response.code(),
        "SMTP message accepted"
    );
    Ok(response)
}

/// Connect, negotiate and authenticate, then check the session with NOOP.
pub async fn check(settings: &SmtpSettings) -> NotificationResult<()> {
    let transport = transport(settings)?;
    let alive = with_deadline(settings, transport.test_connection())
        .await?
        .map_err(|e| classify("readiness check", e))?;

    if alive {
        Ok(())
    } else {
        Err(NotificationError::channel(
            format!(
                "SMTP server {}:{} did not answer NOOP",
                settings.host, settings.port
            ),
            true,
        ))
    }
}

fn transport(settings: &SmtpSettings) -> NotificationResult<Transport> {
    install_rustls_provider();

    let builder = match settings.tls {
        SmtpTls::None => Transport::builder_dangerous(settings.host.as_str()),
        SmtpTls::StartTls => {
            Transport::starttls_relay(&settings.host).map_err(|e| invalid_host(settings, e))?
        }
        SmtpTls::Implicit => {
            Transport::relay(&settings.host).map_err(|e| invalid_host(settings, e))?
        }
    };

    // The outer deadline must fire first so a stalled session is reported as a timeout.
    let mut builder = builder
        .port(settings.port)
        .timeout(Some(Duration::from_millis(settings.timeout_ms) * 2));

    if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
        builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
    }

    Ok(builder.build())
}

async fn with_deadline<F>(settings: &SmtpSettings, session: F) -> NotificationResult<F::Output>
where
    F: Future,
{
    let limit = Duration::from_millis(settings.timeout_ms);
    tokio::time::timeout(limit, session).await.map_err(|_| {
        NotificationError::timeout(format!(
            "SMTP session with {}:{} timed out after {} ms",
            settings.host, settings.port, settings.timeout_ms
        ))
        .retryable(true)
    })
}

/// Map a transport error. Permanent replies and client-side mistakes are
/// final; transient replies, timeouts and network failures may recover.
fn classify(action: &str, error: SmtpError) -> NotificationError {
    let retryable = !(error.is_permanent() || error.is_client());
    let message = match error.status() {
        Some(code) => format!("SMTP {} rejected with {}", action, code),
        None => format!("SMTP {} failed", action),
    };
    NotificationError::channel(message, retryable).with_cause(error)
}

fn invalid_host(settings: &SmtpSettings, error: SmtpError) -> NotificationError {
    NotificationError::configuration(format!("invalid SMTP host '{}'", settings.host))
        .with_cause(error)
}
