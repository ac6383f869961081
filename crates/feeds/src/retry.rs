//! Retry policy for outbound provider and webhook calls.
//!
//! Failures are classified by [`ReportError::is_transient`]: rate limiting,
//! server errors, connection failures and timeouts are retried with
//! exponential backoff; everything else fails immediately.
//!
//! ## Example
//!
//! ```rust
//! use stablecoin_feeds::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
//! assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
//! assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(8));
//! ```

use async_trait::async_trait;
use rand::Rng;
use stablecoin_core::ReportError;
use std::time::Duration;

pub use stablecoin_core::is_retryable_status;

/// Exponential backoff policy applied to every outbound request.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one (default: 3)
    max_attempts: u32,
    /// Delay before the first retry (default: 1s)
    initial_delay: Duration,
    /// Cap on any single delay (default: 8s)
    max_delay: Duration,
    /// Growth factor between retries (default: 2)
    multiplier: u32,
    /// Random ±25% jitter on each delay (default: off)
    jitter_enabled: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
            multiplier: 2,
            jitter_enabled: false,
        }
    }

    pub fn with_jitter(mut self) -> Self {
        self.jitter_enabled = true;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn jitter_enabled(&self) -> bool {
        self.jitter_enabled
    }

    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// initial · multiplier^(attempt-1), capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // 2^16 is far past any sane cap
        let power = attempt.saturating_sub(1).min(16);
        let factor = self.multiplier.saturating_pow(power);
        let capped = self.initial_delay.saturating_mul(factor).min(self.max_delay);

        if self.jitter_enabled {
            let spread = rand::thread_rng().gen_range(-0.25..=0.25);
            capped.mul_f64(1.0 + spread)
        } else {
            capped
        }
    }

    /// Whether a failure on `attempt` (1-based) should be retried.
    pub fn should_retry(&self, error: &ReportError, attempt: u32) -> bool {
        attempt < self.max_attempts && error.is_transient()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(8))
    }
}

/// Suspension used between retries and status polls.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
