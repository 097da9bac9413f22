//! Per-provider delivery statistics.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::result::NotificationError;

/// Counters for one provider instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationStats {
    /// Deliveries that reached a terminal outcome (success or failure).
    pub total_attempts: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Sends rejected by the rate limiter. Not counted in `total_attempts`.
    pub rate_limited_count: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Running mean of delivery latency, retries included.
    pub average_latency_ms: f64,
}

impl NotificationStats {
    pub fn record_success(&mut self, latency: Duration) {
        self.success_count += 1;
        self.last_success_at = Some(Utc::now());
        self.record_attempt(latency);
    }

    pub fn record_failure(&mut self, latency: Duration, error: &NotificationError) {
        self.failure_count += 1;
        self.last_failure_at = Some(Utc::now());
        self.last_error = Some(error.message.clone());
        self.record_attempt(latency);
    }

    pub fn record_rate_limited(&mut self) {
        self.rate_limited_count += 1;
    }

    /// Fraction of successful deliveries, if any were made.
    pub fn success_rate(&self) -> Option<f64> {
        (self.total_attempts > 0).then(|| self.success_count as f64 / self.total_attempts as f64)
    }

    fn record_attempt(&mut self, latency: Duration) {
        self.total_attempts += 1;
        let latency_ms = latency.as_secs_f64() * 1_000.0;
        self.average_latency_ms +=
            (latency_ms - self.average_latency_ms) / self.total_attempts as f64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_average() {
        let mut stats = NotificationStats::default();
        assert_eq!(stats.success_rate(), None);

        stats.record_success(Duration::from_millis(100));
        stats.record_success(Duration::from_millis(300));
        stats.record_failure(
            Duration::from_millis(200),
            &NotificationError::channel("502 Bad Gateway", true),
        );
        stats.record_rate_limited();

        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.success_count, 2);
        assert_eq!(stats.failure_count, 1);
        assert_eq!(stats.rate_limited_count, 1);
        assert!((stats.average_latency_ms - 200.0).abs() < 1e-9);
        assert_eq!(stats.last_error.as_deref(), Some("502 Bad Gateway"));
        assert!(stats.last_success_at.is_some());
        assert!(stats.last_failure_at.is_some());
        assert!((stats.success_rate().unwrap() - 2.0 / 3.0).abs() < 1e-9);
    }
}
