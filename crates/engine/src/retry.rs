//! Retry policy for conflicting transactions
//!
//! A conflicted attempt is re-run immediately after a short backoff. The
//! first few retries only yield the thread; later ones sleep with capped
//! exponential backoff so heavily contended TVars do not burn CPU.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Retry Configuration
// ============================================================================

/// Configuration for transaction retry behavior
///
/// Loaded from the `[retry]` table of `tvar.toml`.
///
/// # Example
/// ```
/// use tvar_engine::RetryConfig;
///
/// let config = RetryConfig::new()
///     .with_max_retries(100)
///     .with_spin_attempts(8);
/// assert_eq!(config.max_retries, Some(100));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (`None` = unbounded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<usize>,
    /// Base delay between retries in microseconds (exponential backoff)
    pub base_delay_us: u64,
    /// Maximum delay between retries in microseconds
    pub max_delay_us: u64,
    /// Retries that only yield the thread before backoff starts sleeping
    pub spin_attempts: usize,
    /// Log a warning once a single call has retried this many times
    pub warn_after: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: None,
            base_delay_us: 1,
            max_delay_us: 1_000,
            spin_attempts: 4,
            warn_after: 1_000,
        }
    }
}

impl RetryConfig {
    /// Create a new RetryConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a RetryConfig that gives up on the first conflict
    pub fn no_retry() -> Self {
        Self {
            max_retries: Some(0),
            ..Default::default()
        }
    }

    /// Set maximum number of retries
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Retry forever
    pub fn unbounded(mut self) -> Self {
        self.max_retries = None;
        self
    }

    /// Set base delay for exponential backoff
    pub fn with_base_delay_us(mut self, base_delay_us: u64) -> Self {
        self.base_delay_us = base_delay_us;
        self
    }

    /// Set maximum delay between retries
    pub fn with_max_delay_us(mut self, max_delay_us: u64) -> Self {
        self.max_delay_us = max_delay_us;
        self
    }

    /// Set number of yield-only retries
    pub fn with_spin_attempts(mut self, spin_attempts: usize) -> Self {
        self.spin_attempts = spin_attempts;
        self
    }

    /// Set retry count after which a warning is logged
    pub fn with_warn_after(mut self, warn_after: usize) -> Self {
        self.warn_after = warn_after;
        self
    }

    /// Check whether retry number `retry` (1-based) is allowed
    pub fn allows(&self, retry: usize) -> bool {
        self.max_retries.map_or(true, |max| retry <= max)
    }

    /// Calculate delay before retry number `retry` (1-based)
    ///
    /// Zero while within `spin_attempts`, then exponential from
    /// `base_delay_us`, capped at `max_delay_us`.
    pub fn calculate_delay(&self, retry: usize) -> Duration {
        if retry <= self.spin_attempts {
            return Duration::ZERO;
        }
        // Cap the shift to prevent overflow (1 << 63 is the max for u64)
        let shift = (retry - self.spin_attempts - 1).min(63);
        let multiplier = 1u64 << shift;
        let delay_us = self.base_delay_us.saturating_mul(multiplier);
        Duration::from_micros(delay_us.min(self.max_delay_us))
    }

    /// Wait before retry number `retry`
    pub(crate) fn backoff(&self, retry: usize) {
        let delay = self.calculate_delay(retry);
        if delay.is_zero() {
            std::thread::yield_now();
        } else {
            std::thread::sleep(delay);
        }
    }
}
