//! Delay schedules between attempts.
//!
//! Schedules are pure functions of the attempt number, so one value can be
//! shared by any number of retry loops.

use std::time::Duration;

use rand::Rng;

/// A delay schedule.
pub trait BackoffStrategy: Send + Sync {
    /// Delay after the given zero-based failed attempt.
    fn delay(&self, attempt: u32) -> Duration;
}

/// How a computed delay is randomized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    /// Use the delay as computed.
    None,
    /// Uniform in `[0, delay]`.
    #[default]
    Full,
    /// Uniform in `[delay / 2, delay * 3 / 2]`.
    Proportional,
}

impl Jitter {
    fn apply(self, delay: Duration) -> Duration {
        if delay.is_zero() {
            return delay;
        }
        let nanos = u64::try_from(delay.as_nanos()).unwrap_or(u64::MAX);
        let mut rng = rand::thread_rng();
        match self {
            Self::None => delay,
            Self::Full => Duration::from_nanos(rng.gen_range(0..=nanos)),
            Self::Proportional => {
                Duration::from_nanos(rng.gen_range(nanos / 2..=nanos.saturating_add(nanos / 2)))
            }
        }
    }
}

/// `unit` times the Fibonacci sequence 1, 1, 2, 3, 5, 8, ... capped at
/// `max`. The schedule the control plane documents for activation polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FibonacciBackoff {
    pub unit: Duration,
    pub max: Duration,
    pub jitter: Jitter,
}

impl FibonacciBackoff {
    #[must_use]
    pub const fn new(unit: Duration, max: Duration) -> Self {
        Self {
            unit,
            max,
            jitter: Jitter::Full,
        }
    }

    #[must_use]
    pub const fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// `fib(n)` with `fib(0) = 0`, saturating at `u32::MAX`.
    fn fib(n: u32) -> u32 {
        let (mut current, mut next) = (0_u32, 1_u32);
        for _ in 0..n {
            (current, next) = (next, current.saturating_add(next));
            if current == u32::MAX {
                break;
            }
        }
        current
    }
}

impl Default for FibonacciBackoff {
    /// One-second steps, one-minute cap.
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl BackoffStrategy for FibonacciBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let steps = Self::fib(attempt.saturating_add(1));
        self.jitter.apply(self.unit.saturating_mul(steps).min(self.max))
    }
}

/// `initial * factor^attempt`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoff {
    pub initial: Duration,
    pub max: Duration,
    pub factor: f64,
    pub jitter: Jitter,
}

impl ExponentialBackoff {
    /// Doubling from `initial`, proportional jitter.
    #[must_use]
    pub const fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            factor: 2.0,
            jitter: Jitter::Proportional,
        }
    }

    #[must_use]
    pub const fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    #[must_use]
    pub const fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.min(64)).unwrap_or(64);
        let secs = (self.initial.as_secs_f64() * self.factor.powi(exponent))
            .min(self.max.as_secs_f64());
        self.jitter.apply(Duration::from_secs_f64(secs.max(0.0)))
    }
}

/// The same delay every time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBackoff(pub Duration);

impl ConstantBackoff {
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self(delay)
    }
}

impl BackoffStrategy for ConstantBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.0
    }
}

/// Retry immediately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoBackoff;

impl BackoffStrategy for NoBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}
