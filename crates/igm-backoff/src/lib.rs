//! IGM Backoff - Backoff strategies and bounded retry loops
//!
//! Provides:
//!
//! - **Backoff strategies**: Fibonacci, exponential, constant, none
//! - **Predicate retry**: call an operation until its result satisfies a
//!   predicate or the attempt budget runs out, reporting exhaustion as a
//!   value rather than an error
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use igm_backoff::{FibonacciBackoff, RetryPolicy, retry_until};
//!
//! let policy = RetryPolicy::new(10, FibonacciBackoff::default());
//! let outcome = retry_until(policy, |_| poll_state(), |state| state.ready).await;
//! if !outcome.is_success() { /* not ready */ }
//!
//! // or, to propagate exhaustion:
//! let state = retry_until(policy, |_| poll_state(), |s| s.ready).await.into_result()?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod backoff;
mod error;
mod retry;

pub use backoff::*;
pub use error::*;
pub use retry::*;
