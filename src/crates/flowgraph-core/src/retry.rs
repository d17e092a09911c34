//! Retry policies - exponential backoff for transient node failures
//!
//! A [`RetryPolicy`] bounds how many times a node body is attempted and how
//! long the executor waits between attempts. Delays grow exponentially from
//! `initial_interval` by `backoff_factor`, capped at `max_interval`, with
//! optional jitter to avoid thundering-herd retries against shared upstreams.
//!
//! Interrupts and cancellation are never retried regardless of policy; see
//! [`GraphError::is_retryable`](crate::error::GraphError::is_retryable).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy attached to a graph node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (1 = no retries)
    pub max_attempts: u32,

    /// Initial delay before the first retry, in seconds
    pub initial_interval: f64,

    /// Multiplier applied to the delay after each attempt
    pub backoff_factor: f64,

    /// Upper bound on any single delay, in seconds
    pub max_interval: f64,

    /// Whether to randomize delays (±50%)
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: 0.5,
            backoff_factor: 2.0,
            max_interval: 128.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn with_initial_interval(mut self, seconds: f64) -> Self {
        self.initial_interval = seconds;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_max_interval(mut self, seconds: f64) -> Self {
        self.max_interval = seconds;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Whether another attempt is allowed after `attempts` completed attempts
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let mut seconds = self.initial_interval * self.backoff_factor.powi(attempt as i32);
        seconds = seconds.min(self.max_interval);
        if self.jitter {
            seconds *= 0.5 + rand::random::<f64>();
        }
        Duration::from_secs_f64(seconds.max(0.0))
    }
}

/// Tracks attempts and the last error across retries of one node
#[derive(Debug, Clone, Default)]
pub struct RetryState {
    /// Number of completed (failed) attempts
    pub attempts: u32,

    /// Message of the most recent failure
    pub last_error: Option<String>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed attempt
    pub fn record_attempt(&mut self, error: Option<String>) {
        self.attempts += 1;
        self.last_error = error;
    }

    /// Reset after a success
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry_respects_budget() {
        let policy = RetryPolicy::new(3);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy::new(5)
            .with_initial_interval(1.0)
            .with_backoff_factor(2.0)
            .with_max_interval(3.0)
            .with_jitter(false);

        assert_eq!(policy.calculate_delay(0), Duration::from_secs_f64(1.0));
        assert_eq!(policy.calculate_delay(1), Duration::from_secs_f64(2.0));
        assert_eq!(policy.calculate_delay(2), Duration::from_secs_f64(3.0));
        assert_eq!(policy.calculate_delay(5), Duration::from_secs_f64(3.0));
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let policy = RetryPolicy::new(3)
            .with_initial_interval(2.0)
            .with_jitter(true);
        for _ in 0..32 {
            let delay = policy.calculate_delay(0).as_secs_f64();
            assert!((1.0..=3.0).contains(&delay), "delay {delay} out of band");
        }
    }

    #[test]
    fn test_retry_state_tracking() {
        let mut state = RetryState::new();
        state.record_attempt(Some("rate limit".to_string()));
        state.record_attempt(Some("timeout".to_string()));
        assert_eq!(state.attempts, 2);
        assert_eq!(state.last_error.as_deref(), Some("timeout"));

        state.reset();
        assert_eq!(state.attempts, 0);
        assert!(state.last_error.is_none());
    }
}
