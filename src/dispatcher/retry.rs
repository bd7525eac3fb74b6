//! Retry classification and backoff timing.

use std::time::Duration;

use rand::Rng;

/// How one delivery attempt's result should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptClass {
    /// HTTP status in [200, 400); the delivery is done.
    Success,
    /// Network error, 5xx, or 429: retry per policy.
    Transient,
    /// 4xx other than 429, or an unusable URL: no retry.
    Permanent,
}

/// Classify an HTTP response status.
pub fn classify_status(status: u16) -> AttemptClass {
    match status {
        200..=399 => AttemptClass::Success,
        429 => AttemptClass::Transient,
        400..=499 => AttemptClass::Permanent,
        _ => AttemptClass::Transient,
    }
}

/// Exponential backoff with a cap and jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following `attempt` (1-based):
    /// base * 2^(attempt-1), capped, with ±25% jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let unjittered = self
            .base
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.cap);
        let factor: f64 = rand::rng().random_range(0.75..=1.25);
        Duration::from_secs_f64(unjittered.as_secs_f64() * factor).min(self.cap)
    }

    /// Honor a `Retry-After` header (delta-seconds form), clamped to the cap.
    pub fn retry_after(&self, header_value: &str) -> Option<Duration> {
        let seconds: u64 = header_value.trim().parse().ok()?;
        Some(Duration::from_secs(seconds).min(self.cap))
    }
}
