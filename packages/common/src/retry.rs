use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A single failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// 1-based attempt number.
    pub attempt: u8,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl RetryAttempt {
    pub fn new(attempt: u8, error: impl Into<String>) -> Self {
        Self {
            attempt,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Retry budget and backoff bounds for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after the first. `0` runs the job exactly once.
    pub max_retries: u8,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    pub const NONE: RetryPolicy = RetryPolicy {
        max_retries: 0,
        base_delay_ms: 0,
        max_delay_ms: 0,
    };

    pub fn backoff(&self, attempt: u8) -> Duration {
        calculate_backoff(attempt, self.base_delay_ms, self.max_delay_ms)
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry {
        attempt: u8,
        history: Vec<RetryAttempt>,
    },
    Exhausted {
        history: Vec<RetryAttempt>,
    },
}

/// Attempt bookkeeping for a single job execution.
#[derive(Debug, Clone)]
pub struct RetryTracker {
    max_retries: u8,
    history: Vec<RetryAttempt>,
}

impl RetryTracker {
    pub fn new(max_retries: u8) -> Self {
        Self {
            max_retries,
            history: Vec::new(),
        }
    }

    pub fn record_failure(&mut self, error: &str) -> RetryDecision {
        let attempt = (self.history.len() as u8).saturating_add(1);
        self.history.push(RetryAttempt::new(attempt, error));

        if attempt <= self.max_retries {
            RetryDecision::Retry {
                attempt,
                history: self.history.clone(),
            }
        } else {
            RetryDecision::Exhausted {
                history: self.history.clone(),
            }
        }
    }

    /// History recorded so far, oldest first.
    pub fn history(&self) -> &[RetryAttempt] {
        &self.history
    }

    pub fn attempts(&self) -> usize {
        self.history.len()
    }
}

/// Calculate exponential backoff delay with jitter.
///
/// Formula: `min(base_ms * 2^(attempt-1) + jitter, max_ms)` (0-25% jitter)
pub fn calculate_backoff(attempt: u8, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exp_factor = 2u64.saturating_pow((attempt - 1) as u32);
    let delay_ms = base_ms.saturating_mul(exp_factor);

    let jitter = if delay_ms > 0 {
        rand::rng().random_range(0..=delay_ms / 4)
    } else {
        0
    };

    Duration::from_millis(delay_ms.saturating_add(jitter).min(max_ms))
}
