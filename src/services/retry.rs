//! Bounded retry with a fixed delay for backend-mutating calls.
//!
//! Only errors whose [`ErrorKind`] is in the policy's allow-list are retried;
//! everything else is returned on the first failure.

use crate::storage::{ErrorKind, StorageError};
use std::{collections::HashSet, fmt, future::Future, time::Duration};
use tracing::warn;

/// Errors that can be classified for retry decisions.
pub trait Retryable: fmt::Display {
    fn error_kind(&self) -> ErrorKind;
}

impl Retryable for StorageError {
    fn error_kind(&self) -> ErrorKind {
        self.kind()
    }
}

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    retry_on: HashSet<ErrorKind>,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
    pub const DEFAULT_DELAY: Duration = Duration::from_millis(2000);
    pub const DEFAULT_RETRY_ON: [ErrorKind; 4] = [
        ErrorKind::Timeout,
        ErrorKind::Throttled,
        ErrorKind::Connection,
        ErrorKind::Unavailable,
    ];

    /// `max_attempts` counts the first call; values below 1 are raised to 1.
    pub fn new(
        max_attempts: u32,
        delay: Duration,
        retry_on: impl IntoIterator<Item = ErrorKind>,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            retry_on: retry_on.into_iter().collect(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn retries(&self, kind: ErrorKind) -> bool {
        self.retry_on.contains(&kind)
    }

    /// Run `attempt` until it succeeds, returns a non-retryable error, or
    /// the attempt budget is spent. The last error is returned unchanged.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut attempt: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable,
    {
        let mut tries = 0;

        loop {
            tries += 1;

            match attempt().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if tries >= self.max_attempts || !self.retries(err.error_kind()) {
                        return Err(err);
                    }

                    warn!(
                        operation,
                        attempt = tries,
                        max_attempts = self.max_attempts,
                        delay_ms = self.delay.as_millis() as u64,
                        kind = %err.error_kind(),
                        error = %err,
                        "retrying after transient storage error"
                    );

                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_MAX_ATTEMPTS,
            Self::DEFAULT_DELAY,
            Self::DEFAULT_RETRY_ON,
        )
    }
}
