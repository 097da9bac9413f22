//! Sliding-window rate limiter used by the delivery pipeline.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use super::config::RateLimitPolicy;

/// Admits at most `max_notifications` sends within any `period`.
///
/// Keeps the admission instants of the current window; expired entries are
/// evicted lazily on each call.
#[derive(Debug)]
pub struct RateLimiter {
    max_notifications: usize,
    period: Duration,
    admitted: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(policy: &RateLimitPolicy) -> Self {
        Self {
            max_notifications: policy.max_notifications as usize,
            period: Duration::from_millis(policy.period_ms),
            admitted: VecDeque::new(),
        }
    }

    /// Try to admit one send now.
    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&mut self, now: Instant) -> bool {
        self.evict(now);
        if self.admitted.len() < self.max_notifications {
            self.admitted.push_back(now);
            true
        } else {
            false
        }
    }

    /// How long until the next send would be admitted. Zero when one would be now.
    pub fn retry_after(&self) -> Duration {
        if self.admitted.len() < self.max_notifications {
            return Duration::ZERO;
        }
        self.admitted
            .front()
            .map(|oldest| (*oldest + self.period).saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO)
    }

    pub fn reset(&mut self) {
        self.admitted.clear();
    }

    fn evict(&mut self, now: Instant) {
        while let Some(oldest) = self.admitted.front() {
            if now.saturating_duration_since(*oldest) >= self.period {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }
}
