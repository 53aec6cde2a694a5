//! Reconnect backoff policy.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default delay before the first reconnect attempt.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default cap on the delay between attempts.
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;
/// Default jitter factor (0.0-1.0).
pub const DEFAULT_JITTER: f64 = 0.25;

/// Exponential backoff with jitter between reconnect attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt, in milliseconds.
    pub base_delay_ms: u64,
    /// Cap on the un-jittered delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Up to this fraction of the delay is added at random.
    pub jitter: f64,
    /// Give up after this many consecutive failed attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter: DEFAULT_JITTER,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = duration_ms(delay);
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = duration_ms(delay);
        self
    }

    /// Sets the jitter factor, clamped to 0.0-1.0.
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Sets the attempt cap.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Whether `attempt` (1-based) exceeds the cap.
    #[must_use]
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt > max)
    }

    /// Delay before `attempt` (1-based), with random jitter.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let unit: f64 = rand::rng().random_range(0.0..1.0);
        self.delay_with_unit(attempt, unit)
    }

    /// `min(max, base * 2^(attempt-1)) * (1 + jitter * unit)`.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
    fn delay_with_unit(&self, attempt: u32, unit: f64) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let base = self.base_delay_ms as f64 * 2f64.powi(exponent);
        let capped = base.min(self.max_delay_ms as f64);
        let jittered = capped * self.jitter.clamp(0.0, 1.0).mul_add(unit, 1.0);
        Duration::from_secs_f64(jittered / 1000.0)
    }
}

fn duration_ms(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}
