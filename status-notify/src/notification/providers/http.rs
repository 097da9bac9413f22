//! Shared HTTP plumbing for webhook-style providers.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use crate::notification::result::{DeliveryReceipt, NotificationError, NotificationResult};
use crate::utils::http_client;

/// Response bodies are cut to this many characters in error messages.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Build the client of one provider instance.
pub(crate) fn client(timeout_ms: u64) -> NotificationResult<Client> {
    http_client::build_client(Duration::from_millis(timeout_ms)).map_err(|e| {
        NotificationError::configuration("failed to build HTTP client").with_cause(e)
    })
}

/// Whether a non-success status is worth another attempt.
pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

/// A successful HTTP exchange.
#[derive(Debug)]
pub(crate) struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

impl HttpReply {
    /// The body as JSON, if it is JSON.
    pub fn json(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }

    pub fn into_receipt(self) -> DeliveryReceipt {
        let body = match self.json() {
            Some(value) => value,
            None if self.body.is_empty() => Value::Null,
            None => Value::String(self.body),
        };
        DeliveryReceipt::with_response(json!({
            "status": self.status.as_u16(),
            "body": body,
        }))
    }
}

/// Send `request` and classify the outcome.
pub(crate) async fn execute(channel: &str, request: RequestBuilder) -> NotificationResult<HttpReply> {
    let response = request.send().await.map_err(|e| transport_error(channel, e))?;
    let status = response.status();

    if status.is_success() {
        let body = response.text().await.unwrap_or_default();
        debug!(%status, "{} request succeeded", channel);
        return Ok(HttpReply { status, body });
    }

    let retry_after = parse_retry_after(&response);
    let body = response.text().await.unwrap_or_default();
    warn!(%status, body = %truncate(&body), "{} request failed", channel);

    let mut message = format!("{} request failed: {}", channel, status);
    if !body.is_empty() {
        message.push_str(" - ");
        message.push_str(&truncate(&body));
    }
    if let Some(wait) = retry_after {
        message.push_str(&format!(" (retry after {:.1}s)", wait.as_secs_f64()));
    }

    Err(NotificationError::channel(message, is_retryable_status(status)))
}

/// Check a configured endpoint before any request is made.
pub(crate) fn check_endpoint(channel: &str, url: &str, require_https: bool) -> NotificationResult<Url> {
    let parsed = Url::parse(url).map_err(|e| {
        NotificationError::validation(format!("{} url is not a valid URL", channel)).with_cause(e)
    })?;
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(NotificationError::validation(format!(
            "{} url has no host",
            channel
        )));
    }
    if require_https && parsed.scheme() != "https" {
        return Err(NotificationError::validation(format!(
            "{} url must use https",
            channel
        )));
    }
    Ok(parsed)
}

/// Parse `Retry-After` (seconds), falling back to Discord's `X-RateLimit-Reset-After`.
fn parse_retry_after(response: &Response) -> Option<Duration> {
    ["Retry-After", "X-RateLimit-Reset-After"]
        .iter()
        .filter_map(|name| response.headers().get(*name))
        .filter_map(|value| value.to_str().ok()?.trim().parse::<f64>().ok())
        .find(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

fn transport_error(channel: &str, error: reqwest::Error) -> NotificationError {
    // A request that could not even be built will not build next time either.
    let retryable = !error.is_builder();
    let message = if error.is_timeout() {
        format!("{} request timed out", channel)
    } else if error.is_connect() {
        format!("{} connection failed", channel)
    } else {
        format!("{} request failed", channel)
    };
    NotificationError::channel(message, retryable).with_cause(error)
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode as AxumStatus;
    use std::net::SocketAddr;

    /// Serve `app` on an ephemeral port.
    pub(crate) async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[test]
    fn test_status_classification() {
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_check_endpoint() {
        assert!(check_endpoint("Slack", "https://hooks.slack.com/services/x", true).is_ok());
        assert!(check_endpoint("Webhook", "http://localhost:8080/hook", false).is_ok());

        let err = check_endpoint("Slack", "http://hooks.slack.com/services/x", true).unwrap_err();
        assert!(err.message.contains("https"));
        assert!(check_endpoint("Webhook", "not a url", false).is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short"), "short");
        let long = "é".repeat(MAX_ERROR_BODY_CHARS + 10);
        let cut = truncate(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), MAX_ERROR_BODY_CHARS + 3);
    }

    #[tokio::test]
    async fn test_execute_classifies_responses() {
        let app = Router::new()
            .route("/ok", axum::routing::post(|| async { r#"{"id":"42"}"# }))
            .route(
                "/busy",
                axum::routing::post(|| async {
                    (
                        AxumStatus::TOO_MANY_REQUESTS,
                        [("Retry-After", "2")],
                        "slow down",
                    )
                }),
            )
            .route(
                "/bad",
                axum::routing::post(|| async { (AxumStatus::BAD_REQUEST, "invalid_payload") }),
            );
        let addr = serve(app).await;
        let client = client(5_000).unwrap();

        let reply = execute("Test", client.post(format!("http://{}/ok", addr)))
            .await
            .unwrap();
        let receipt = reply.into_receipt();
        assert_eq!(receipt.response.unwrap()["body"]["id"], "42");

        let err = execute("Test", client.post(format!("http://{}/busy", addr)))
            .await
            .unwrap_err();
        assert!(err.retryable);
        assert!(err.message.contains("429"));
        assert!(err.message.contains("retry after 2.0s"));

        let err = execute("Test", client.post(format!("http://{}/bad", addr)))
            .await
            .unwrap_err();
        assert!(!err.retryable);
        assert!(err.message.contains("invalid_payload"));
    }

    #[tokio::test]
    async fn test_connection_failure_is_retryable() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client(2_000).unwrap();
        let err = execute("Test", client.post(format!("http://{}/", addr)))
            .await
            .unwrap_err();
        assert!(err.retryable);
        assert!(err.cause.is_some());
    }
}
