//! Provider trait and the shared delivery pipeline.
//!
//! Concrete channels only know how to make one protocol call. Everything
//! else (filtering, rate limiting, retries, statistics and panic isolation)
//! lives in [`BaseProvider`], which wraps a channel behind
//! `Arc<dyn NotificationProvider>`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{Instrument, Span, debug, warn};

use super::config::{ProviderConfig, RetryPolicy};
use super::context::NotificationContext;
use super::events::NotificationEvent;
use super::rate_limit::RateLimiter;
use super::result::{
    DeliveryOutcome, DeliveryReceipt, ErrorCode, NotificationError, NotificationResult, SkipReason,
};
use super::stats::NotificationStats;

/// A notification channel.
#[async_trait]
pub trait NotificationProvider: Send + Sync {
    /// Make one delivery attempt.
    ///
    /// Return a retryable error for transient failures; the pipeline decides
    /// whether to call again.
    async fn send_notification(
        &self,
        context: &NotificationContext,
    ) -> NotificationResult<DeliveryReceipt>;

    /// Check that the channel is usable with its configuration.
    async fn validate_provider_config(&self) -> NotificationResult<()>;
}

/// Delay before attempt `retry + 1`, for `retry >= 1`.
pub fn backoff_delay(policy: &RetryPolicy, retry: u32) -> Duration {
    let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
    let delay_ms = policy.initial_delay_ms as f64 * policy.backoff_multiplier.powi(exponent);
    let capped = delay_ms.min(policy.max_delay_ms as f64).max(0.0);
    Duration::from_millis(capped as u64)
}

/// Render a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// A configured provider instance: one channel plus the delivery pipeline.
pub struct BaseProvider {
    config: ProviderConfig,
    channel: Arc<dyn NotificationProvider>,
    enabled: AtomicBool,
    limiter: Mutex<RateLimiter>,
    stats: Mutex<NotificationStats>,
    span: Span,
}

impl std::fmt::Debug for BaseProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseProvider")
            .field("id", &self.config.id)
            .field("provider_type", &self.config.provider_type())
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

impl BaseProvider {
    pub fn new(config: ProviderConfig, channel: Arc<dyn NotificationProvider>, span: Span) -> Self {
        Self {
            enabled: AtomicBool::new(config.enabled),
            limiter: Mutex::new(RateLimiter::new(&config.rate_limit)),
            stats: Mutex::new(NotificationStats::default()),
            config,
            channel,
            span,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn provider_type(&self) -> &str {
        self.config.provider_type()
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn stats(&self) -> NotificationStats {
        self.stats.lock().clone()
    }

    pub fn reset_stats(&self) {
        *self.stats.lock() = NotificationStats::default();
        self.limiter.lock().reset();
    }

    /// Why this provider would skip `event`, or `None` if it handles it.
    pub fn should_handle(&self, event: &NotificationEvent) -> Option<SkipReason> {
        if !self.is_enabled() {
            return Some(SkipReason::Disabled);
        }

        if !self.config.event_filter.is_empty() && !self.config.event_filter.contains(&event.kind())
        {
            return Some(SkipReason::EventKindFiltered);
        }

        if !self.config.entity_filter.is_empty() {
            let matches = event
                .affected_entities()
                .iter()
                .any(|entity| self.config.entity_filter.iter().any(|f| f == entity));
            if !matches {
                return Some(SkipReason::EntityFiltered);
            }
        }

        if event.severity() < self.config.min_severity {
            return Some(SkipReason::BelowMinSeverity);
        }

        None
    }

    /// Run the full pipeline for one event.
    pub async fn send(&self, context: &NotificationContext) -> NotificationResult<DeliveryOutcome> {
        let event = &context.event;

        if let Some(reason) = self.should_handle(event) {
            debug!(
                parent: &self.span,
                event = %event.kind(),
                reason = ?reason,
                "Skipping notification"
            );
            return Ok(DeliveryOutcome::Skipped { reason });
        }

        let rejected = {
            let mut limiter = self.limiter.lock();
            (!limiter.try_acquire()).then(|| limiter.retry_after())
        };
        if let Some(retry_after) = rejected {
            self.stats.lock().record_rate_limited();
            let policy = &self.config.rate_limit;
            let retry_after_ms = retry_after.as_millis();
            warn!(
                parent: &self.span,
                event = %event.kind(),
                max_notifications = policy.max_notifications,
                period_ms = policy.period_ms,
                retry_after_ms = retry_after_ms as u64,
                "Rate limit exceeded, dropping notification"
            );
            return Err(NotificationError::rate_limited(format!(
                "rate limit of {} notifications per {} ms exceeded; retry in {} ms",
                policy.max_notifications, policy.period_ms, retry_after_ms
            ))
            .with_provider(self.id()));
        }

        let started = Instant::now();
        let result = self
            .deliver_with_retry(context)
            .instrument(self.span.clone())
            .await;
        let latency = started.elapsed();

        match result {
            Ok(mut receipt) => {
                receipt.latency_ms = latency.as_millis() as u64;
                self.stats.lock().record_success(latency);
                debug!(
                    parent: &self.span,
                    event = %event.kind(),
                    attempts = receipt.attempts,
                    latency_ms = receipt.latency_ms,
                    "Notification delivered"
                );
                Ok(DeliveryOutcome::Delivered(receipt))
            }
            Err(error) => {
                self.stats.lock().record_failure(latency, &error);
                warn!(
                    parent: &self.span,
                    event = %event.kind(),
                    error = %error,
                    "Notification failed"
                );
                Err(error)
            }
        }
    }

    /// Probe the channel's readiness.
    pub async fn validate(&self) -> NotificationResult<()> {
        let result = AssertUnwindSafe(self.channel.validate_provider_config())
            .catch_unwind()
            .instrument(self.span.clone())
            .await;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(mut error)) => {
                if error.code != ErrorCode::ValidationError {
                    error = NotificationError::validation(error.message.clone())
                        .with_cause(&error);
                }
                Err(error.with_provider(self.id()))
            }
            Err(panic) => Err(NotificationError::validation("provider panicked during validation")
                .with_cause(panic_message(panic.as_ref()))
                .with_provider(self.id())),
        }
    }

    async fn deliver_with_retry(
        &self,
        context: &NotificationContext,
    ) -> NotificationResult<DeliveryReceipt> {
        let policy = &self.config.retry;
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.call_channel(context).await {
                Ok(mut receipt) => {
                    receipt.attempts = attempt;
                    return Ok(receipt);
                }
                Err(error) => {
                    let error = match error.provider_id {
                        Some(_) => error,
                        None => error.with_provider(self.id()),
                    };

                    if !error.retryable {
                        return Err(error);
                    }
                    if attempt >= max_attempts {
                        warn!(attempts = attempt, "Retries exhausted");
                        return Err(error);
                    }

                    let delay = backoff_delay(policy, attempt);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error.message,
                        "Delivery attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn call_channel(&self, context: &NotificationContext) -> NotificationResult<DeliveryReceipt> {
        match AssertUnwindSafe(self.channel.send_notification(context))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(NotificationError::internal("provider panicked during send")
                .with_cause(panic_message(panic.as_ref()))),
        }
    }
}
