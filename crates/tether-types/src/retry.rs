//! Exponential backoff shared by the completion client and the tool invoker.

use rand::Rng;

/// Retry behaviour for transient failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Delay in milliseconds before the first retry.
    pub initial_delay_ms: u64,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
    /// Multiplier applied to the delay after each retry.
    pub backoff_factor: f64,
    /// Apply ±25% random jitter to computed delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// The same schedule without jitter: exactly `initial * factor^retry`.
    pub fn exact(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Total attempts this policy allows, the first try included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay in milliseconds before retry number `retry` (0-based: the delay
    /// after the first failed attempt is `delay_ms(0, ..)`).
    ///
    /// A server-provided `retry_after_ms` is used directly, clamped to
    /// `max_delay_ms`.
    pub fn delay_ms(&self, retry: u32, retry_after_ms: Option<u64>) -> u64 {
        if let Some(server_delay) = retry_after_ms {
            return server_delay.min(self.max_delay_ms);
        }

        let base = self.initial_delay_ms as f64 * self.backoff_factor.powi(retry as i32);
        let clamped = base.min(self.max_delay_ms as f64);

        let delay = if self.jitter {
            clamped * rand::rng().random_range(0.75..=1.25)
        } else {
            clamped
        };

        (delay as u64).min(self.max_delay_ms)
    }
}
