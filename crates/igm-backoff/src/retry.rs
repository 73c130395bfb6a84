//! Bounded predicate retry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::backoff::{BackoffStrategy, FibonacciBackoff};
use crate::error::{BackoffError, BackoffResult};

/// Attempt budget plus delay schedule.
#[derive(Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    backoff: Arc<dyn BackoffStrategy>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// A zero attempt budget is raised to one.
    #[must_use]
    pub fn new(max_attempts: u32, backoff: impl BackoffStrategy + 'static) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Arc::new(backoff),
        }
    }

    /// Delay after the given zero-based failed attempt.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.delay(attempt)
    }
}

impl Default for RetryPolicy {
    /// Ten attempts with one-second Fibonacci steps.
    fn default() -> Self {
        Self::new(10, FibonacciBackoff::default())
    }
}

/// Result of a [`retry_until`] loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    /// The predicate accepted `value` on attempt `attempts`.
    Satisfied { value: T, attempts: u32 },
    /// The budget ran out; `last` is the final rejected value.
    Exhausted { last: T, attempts: u32 },
}

impl<T> RetryOutcome<T> {
    /// Whether the predicate was satisfied.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Satisfied { .. })
    }

    /// Number of attempts made.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Satisfied { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// The last value produced, accepted or not.
    pub fn into_value(self) -> T {
        match self {
            Self::Satisfied { value, .. } => value,
            Self::Exhausted { last, .. } => last,
        }
    }

    /// The accepted value, or [`BackoffError::Exhausted`].
    ///
    /// # Errors
    /// Fails when the budget ran out without the predicate accepting.
    pub fn into_result(self) -> BackoffResult<T> {
        match self {
            Self::Satisfied { value, .. } => Ok(value),
            Self::Exhausted { attempts, .. } => Err(BackoffError::Exhausted { attempts }),
        }
    }
}

/// Call `operation` until `accept` returns true for its output, sleeping
/// per the policy's backoff between attempts.
///
/// Exhaustion is reported through [`RetryOutcome::Exhausted`], never as an
/// error; callers must check the outcome. `operation` receives the
/// zero-based attempt number.
pub async fn retry_until<T, F, Fut, P>(
    policy: RetryPolicy,
    mut operation: F,
    accept: P,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = T>,
    P: Fn(&T) -> bool,
{
    let mut attempt = 0;
    loop {
        let value = operation(attempt).await;
        attempt += 1;

        if accept(&value) {
            return RetryOutcome::Satisfied {
                value,
                attempts: attempt,
            };
        }
        if attempt >= policy.max_attempts {
            return RetryOutcome::Exhausted {
                last: value,
                attempts: attempt,
            };
        }

        let delay = policy.delay(attempt - 1);
        debug!(
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Predicate not satisfied, backing off"
        );
        tokio::time::sleep(delay).await;
    }
}
