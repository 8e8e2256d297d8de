use std::time::Duration;

use crate::domain::errors::{RelayError, Result};

/// Bounded exponential backoff for upstream reconnection
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    base_interval: Duration,
    backoff_factor: f64,
    max_interval: Duration,
}

impl ReconnectPolicy {
    pub fn new(
        max_attempts: u32,
        base_interval: Duration,
        backoff_factor: f64,
        max_interval: Duration,
    ) -> Result<Self> {
        if backoff_factor <= 1.0 || !backoff_factor.is_finite() {
            return Err(RelayError::InvalidBackoffFactor);
        }

        if base_interval.is_zero() {
            return Err(RelayError::InvalidReconnectInterval(
                "base interval cannot be 0".to_string(),
            ));
        }

        if max_interval < base_interval {
            return Err(RelayError::InvalidReconnectInterval(format!(
                "max interval {:?} is below base interval {:?}",
                max_interval, base_interval
            )));
        }

        Ok(Self {
            max_attempts,
            base_interval,
            backoff_factor,
            max_interval,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_interval(&self) -> Duration {
        self.base_interval
    }

    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    pub fn max_interval(&self) -> Duration {
        self.max_interval
    }

    /// Delay following `current`, capped at the max interval
    pub fn next_delay(&self, current: Duration) -> Duration {
        let secs = current.as_secs_f64() * self.backoff_factor;
        self.capped(secs)
    }

    /// Delay before reconnect attempt number `attempt` (1-based).
    ///
    /// Attempt 1 waits the base interval, every later attempt multiplies by
    /// the backoff factor. `None` once the attempt budget is spent.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let secs = self.base_interval.as_secs_f64() * self.backoff_factor.powi(exponent);
        Some(self.capped(secs))
    }

    // Compared as f64 so huge factors never reach Duration's overflow panic
    fn capped(&self, secs: f64) -> Duration {
        if !secs.is_finite() || secs >= self.max_interval.as_secs_f64() {
            return self.max_interval;
        }
        Duration::from_secs_f64(secs)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            base_interval: Duration::from_millis(5_000),
            backoff_factor: 1.5,
            max_interval: Duration::from_millis(60_000),
        }
    }
}
