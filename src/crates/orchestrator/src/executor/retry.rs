//! Task-level retry policy and error classification
//!
//! Distinct from graph node retries: these count per plan task and apply only
//! to temporary failures (rate limits, transport errors, upstream 5xx).

use crate::OrchestratorError;
use std::time::Duration;

/// Exponential backoff for task retries
#[derive(Debug, Clone)]
pub struct TaskRetryPolicy {
    pub max_retries: u32,
    pub base_delay: f64,
    pub multiplier: f64,
}

impl Default for TaskRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: 1.0,
            multiplier: 2.0,
        }
    }
}

impl TaskRetryPolicy {
    /// Delay before retry `attempt` (1-based): base * multiplier^(attempt-1)
    pub fn get_delay(&self, attempt: u32) -> Duration {
        let seconds = self.base_delay * self.multiplier.powi(attempt.saturating_sub(1) as i32);
        Duration::from_secs_f64(seconds.max(0.0))
    }
}

/// Whether a task failure is worth retrying
///
/// `Temporary` errors always are; otherwise the message is matched against
/// the usual transient shapes (rate limits, timeouts, 5xx, connectivity).
pub fn is_temporary_error(error: &OrchestratorError) -> bool {
    if error.is_temporary() {
        return true;
    }
    let message = error.to_string().to_lowercase();

    const TRANSIENT_MARKERS: &[&str] = &[
        "rate limit",
        "too many requests",
        "429",
        "timeout",
        "timed out",
        "deadline exceeded",
        "503",
        "service unavailable",
        "502",
        "bad gateway",
        "500",
        "internal server error",
        "connection",
        "network",
        "dns",
    ];
    // Permanent shapes win over transient substrings ("500" inside an id).
    const PERMANENT_MARKERS: &[&str] = &[
        "401",
        "unauthorized",
        "invalid api key",
        "authentication failed",
        "403",
        "forbidden",
        "access denied",
        "404",
        "not found",
        "400",
        "bad request",
        "invalid request",
    ];

    if PERMANENT_MARKERS.iter().any(|marker| message.contains(marker)) {
        return false;
    }
    TRANSIENT_MARKERS.iter().any(|marker| message.contains(marker))
}
