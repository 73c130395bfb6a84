//! Retry exhaustion as an error, for callers that want `?`.

use thiserror::Error;

/// Backoff errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffError {
    /// The predicate was never satisfied.
    #[error("Retry budget exhausted after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

/// Result type for retry loops.
pub type BackoffResult<T> = Result<T, BackoffError>;
