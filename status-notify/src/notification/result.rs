//! Delivery results and structured delivery errors.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result of a notification operation. Failures are data, never panics.
pub type NotificationResult<T> = std::result::Result<T, NotificationError>;

/// Classification of a [`NotificationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Missing or invalid field, unresolved secret, duplicate id.
    ConfigurationError,
    /// Provider readiness check failed.
    ValidationError,
    /// The channel call itself failed.
    ChannelError,
    /// The provider's rate-limit window is exhausted.
    RateLimitError,
    /// The provider panicked.
    InternalError,
    /// The delivery did not finish before the dispatch deadline.
    TimeoutError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConfigurationError => "CONFIGURATION_ERROR",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::ChannelError => "CHANNEL_ERROR",
            Self::RateLimitError => "RATE_LIMIT_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
            Self::TimeoutError => "TIMEOUT_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured delivery error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{}{}: {}{}", provider_prefix(.provider_id), .code, .message, cause_suffix(.cause))]
pub struct NotificationError {
    pub code: ErrorCode,
    pub message: String,
    /// Provider the error belongs to, once known.
    pub provider_id: Option<String>,
    /// Whether repeating the same call may succeed.
    pub retryable: bool,
    pub timestamp: DateTime<Utc>,
    /// Underlying cause, rendered as text.
    pub cause: Option<String>,
}

impl NotificationError {
    /// Create a non-retryable error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider_id: None,
            retryable: false,
            timestamp: Utc::now(),
            cause: None,
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// A channel failure; the provider decides whether it is transient.
    pub fn channel(message: impl Into<String>, retryable: bool) -> Self {
        Self::new(ErrorCode::ChannelError, message).retryable(retryable)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RateLimitError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TimeoutError, message)
    }

    pub fn retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }
}

fn provider_prefix(provider_id: &Option<String>) -> String {
    provider_id
        .as_ref()
        .map(|id| format!("[{}] ", id))
        .unwrap_or_default()
}

fn cause_suffix(cause: &Option<String>) -> String {
    cause
        .as_ref()
        .map(|cause| format!(" (caused by: {})", cause))
        .unwrap_or_default()
}

/// What a provider reports after a successful channel call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Number of channel calls made, including the successful one.
    pub attempts: u32,
    /// Wall time of the whole delivery in milliseconds.
    pub latency_ms: u64,
    /// Channel-specific response data (message id, dedup key, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
}

impl DeliveryReceipt {
    pub fn with_response(response: serde_json::Value) -> Self {
        Self {
            response: Some(response),
            ..Default::default()
        }
    }
}

/// Why a provider did not handle an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    EventKindFiltered,
    EntityFiltered,
    BelowMinSeverity,
}

/// Successful outcome of sending one event through one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered(DeliveryReceipt),
    /// The provider's filters excluded the event. Neutral, not a failure.
    Skipped { reason: SkipReason },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_defaults_to_non_retryable() {
        let err = NotificationError::new(ErrorCode::ChannelError, "boom");
        assert!(!err.retryable);
        assert!(err.provider_id.is_none());
        assert!(NotificationError::channel("503", true).retryable);
    }

    #[test]
    fn test_error_display() {
        let err = NotificationError::internal("provider panicked")
            .with_provider("slack-ops")
            .with_cause("index out of bounds");
        assert_eq!(
            err.to_string(),
            "[slack-ops] INTERNAL_ERROR: provider panicked (caused by: index out of bounds)"
        );

        let bare = NotificationError::timeout("chunk deadline exceeded");
        assert_eq!(bare.to_string(), "TIMEOUT_ERROR: chunk deadline exceeded");

        let boxed: Box<dyn std::error::Error> = Box::new(bare);
        assert!(boxed.source().is_none());
    }

    #[test]
    fn test_outcome_serialization() {
        let skipped = DeliveryOutcome::Skipped {
            reason: SkipReason::BelowMinSeverity,
        };
        let json = serde_json::to_value(&skipped).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "below_min_severity");

        let delivered = DeliveryOutcome::Delivered(DeliveryReceipt {
            attempts: 2,
            latency_ms: 40,
            response: None,
        });
        let json = serde_json::to_value(&delivered).unwrap();
        assert_eq!(json["status"], "delivered");
        assert_eq!(json["attempts"], 2);
    }
}
