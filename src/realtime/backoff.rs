//! Exponential backoff for channel resubscription

use std::time::Duration;

use rand::Rng;

/// Exponential backoff configuration
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay for the first retry in milliseconds
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds (before jitter)
    pub max_delay_ms: u64,
    /// Upper bound (exclusive) of the random jitter added to every delay
    pub max_jitter_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000, // 1 minute
            max_jitter_ms: 1_000,
        }
    }
}

/// Stateless delay calculator.
///
/// The attempt counter lives with the caller; attempt `k` (0-indexed) waits
/// `min(base * 2^k, max)` plus jitter in `[0, max_jitter)`.
#[derive(Debug, Clone, Default)]
pub struct RetryBackoff {
    config: BackoffConfig,
}

impl RetryBackoff {
    /// Create a backoff with the default configuration
    pub fn new() -> Self {
        Self::with_config(BackoffConfig::default())
    }

    /// Create a backoff with custom configuration
    pub fn with_config(config: BackoffConfig) -> Self {
        Self { config }
    }

    /// Deterministic part of the delay for the given attempt
    pub fn base_delay(&self, attempt: u32) -> Duration {
        // 2^k overflows quickly; anything past 63 is far beyond the cap anyway
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self
            .config
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.config.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Full delay for the given attempt, including random jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let jitter = if self.config.max_jitter_ms > 0 {
            rand::rng().random_range(0..self.config.max_jitter_ms)
        } else {
            0
        };
        self.base_delay(attempt) + Duration::from_millis(jitter)
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }
}
