use std::time::Duration;

use crate::error::{MonitorError, MonitorErrorCategory};

/// Multiplicative reconnect backoff, capped at a ceiling.
///
/// Delays are tracked as fractional milliseconds so that repeated growth does
/// not accumulate rounding error; they are rounded only when handed to a timer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    base_delay_ms: u64,
    max_delay_ms: u64,
    factor: f64,
}

impl RetryPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64, factor: f64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            factor,
        }
    }

    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Reject policies that would never grow or never settle.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.base_delay_ms == 0 {
            return Err(invalid_policy("base delay must be at least 1ms"));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(invalid_policy("max delay must not be below base delay"));
        }
        if !self.factor.is_finite() || self.factor <= 1.0 {
            return Err(invalid_policy("growth factor must be a finite value above 1"));
        }
        Ok(())
    }

    /// Delay to use after `delay_ms`: `min(delay_ms * factor, max)`.
    pub fn next(&self, delay_ms: f64) -> f64 {
        (delay_ms * self.factor).min(self.max_delay_ms as f64)
    }

    /// Delay every reconnect sequence starts from.
    pub fn reset(&self) -> f64 {
        self.base_delay_ms as f64
    }

    /// Delay used for the `attempt`-th consecutive reconnect (0-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let mut delay = self.reset();
        for _ in 0..attempt {
            delay = self.next(delay);
            if delay >= self.max_delay_ms as f64 {
                break;
            }
        }
        to_duration(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2_000, 30_000, 1.6)
    }
}

/// Mutable backoff position driven by a [`RetryPolicy`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    policy: RetryPolicy,
    current_ms: f64,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            current_ms: policy.reset(),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Delay the next reconnect timer should wait.
    pub fn current(&self) -> Duration {
        to_duration(self.current_ms)
    }

    /// Grow the delay for the following failure.
    pub fn advance(&mut self) -> Duration {
        self.current_ms = self.policy.next(self.current_ms);
        self.current()
    }

    /// Return to the base delay.
    pub fn reset(&mut self) {
        self.current_ms = self.policy.reset();
    }
}

fn to_duration(delay_ms: f64) -> Duration {
    Duration::from_millis(delay_ms.round().max(0.0) as u64)
}

fn invalid_policy(message: &str) -> MonitorError {
    MonitorError::new(MonitorErrorCategory::Config, "invalid_retry_policy", message)
}
