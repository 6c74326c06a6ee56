//! Retry policy with scheduled backoff and per-attempt timeouts.
//!
//! Shared by the transfer manager (which walks domains inside each round)
//! and the processing API client (which retries single calls).

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info_span, warn, Instrument};

/// Default backoff between rounds: 1, 2, 4, 8, 16 seconds.
pub const DEFAULT_BACKOFF_SECS: [u64; 5] = [1, 2, 4, 8, 16];

/// Default per-attempt timeouts: 30, 60, 120, 180, 300 seconds.
pub const DEFAULT_TIMEOUT_SECS: [u64; 5] = [30, 60, 120, 180, 300];

/// Errors that can tell whether another attempt is worthwhile.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for crate::StorageError {
    fn is_retryable(&self) -> bool {
        crate::StorageError::is_retryable(self)
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts (rounds), including the first.
    pub max_attempts: u32,
    /// Delay after failed round `n`; the last entry repeats.
    pub backoff: Vec<Duration>,
    /// Timeout for attempt `n`; the last entry repeats.
    pub timeouts: Vec<Duration>,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: DEFAULT_BACKOFF_SECS.iter().map(|s| Duration::from_secs(*s)).collect(),
            timeouts: DEFAULT_TIMEOUT_SECS.iter().map(|s| Duration::from_secs(*s)).collect(),
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryPolicy {
    /// Create a new policy with the given operation name.
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Vec<Duration>) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Delay after the zero-based round `round` failed.
    pub fn backoff_for(&self, round: u32) -> Duration {
        pick(&self.backoff, round).unwrap_or(Duration::from_secs(1))
    }

    /// Timeout for the zero-based attempt `attempt`.
    pub fn timeout_for(&self, attempt: u32) -> Duration {
        pick(&self.timeouts, attempt).unwrap_or(Duration::from_secs(30))
    }
}

fn pick(schedule: &[Duration], index: u32) -> Option<Duration> {
    let last = schedule.len().checked_sub(1)?;
    schedule.get((index as usize).min(last)).copied()
}

/// Result of a retry operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded.
    Success(T),
    /// Operation failed; `attempts` counts every call made.
    Failed { error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(v) => Ok(v),
            RetryResult::Failed { error, .. } => Err(error),
        }
    }
}

/// Execute an async operation with retry logic.
///
/// The closure receives the zero-based attempt number so callers can pick a
/// per-attempt timeout and re-sign requests. Non-retryable errors return
/// immediately.
pub async fn retry_async<F, Fut, T, E>(policy: &RetryPolicy, operation: F) -> RetryResult<T, E>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + Retryable,
{
    let mut attempt = 0u32;

    loop {
        let span = info_span!("retry", operation = %policy.operation_name, attempt = attempt + 1);
        match operation(attempt).instrument(span).await {
            Ok(value) => return RetryResult::Success(value),
            Err(e) if e.is_retryable() && attempt + 1 < policy.max_attempts => {
                let delay = policy.backoff_for(attempt);
                warn!(
                    operation = %policy.operation_name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Attempt failed, retrying: {}",
                    e
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                debug!(
                    operation = %policy.operation_name,
                    attempts = attempt + 1,
                    "Giving up: {}",
                    e
                );
                return RetryResult::Failed {
                    error: e,
                    attempts: attempt + 1,
                };
            }
        }
    }
}

/// State tracker for repeated operations that may fail intermittently.
///
/// Polling loops use it to suppress log spam after repeated failures.
#[derive(Debug, Default)]
pub struct FailureTracker {
    consecutive_failures: u32,
    max_logged_failures: u32,
    suppressed: bool,
}

impl FailureTracker {
    pub fn new(max_logged_failures: u32) -> Self {
        Self {
            consecutive_failures: 0,
            max_logged_failures,
            suppressed: false,
        }
    }

    /// Record a successful operation (resets failure count).
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 && self.suppressed {
            debug!(
                "Operation recovered after {} consecutive failures",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
        self.suppressed = false;
    }

    /// Record a failed operation.
    ///
    /// Returns `true` if this failure should be logged (not suppressed).
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures += 1;

        if self.consecutive_failures <= self.max_logged_failures {
            true
        } else if self.consecutive_failures == self.max_logged_failures + 1 {
            self.suppressed = true;
            warn!(
                "Suppressing further failure logs after {} consecutive failures",
                self.max_logged_failures
            );
            false
        } else {
            false
        }
    }

    pub fn failure_count(&self) -> u32 {
        self.consecutive_failures
    }
}
