//! Circuit breaker for model endpoint protection
//!
//! After `threshold` consecutive transport failures the breaker opens and
//! calls fail fast with `ApiLimit` until `cooldown` has elapsed. The first
//! call after the cooldown is let through (half-open); a success closes the
//! breaker again.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls allowed
    Closed,
    /// Calls rejected until the cooldown elapses
    Open,
    /// Cooldown elapsed, next call probes the endpoint
    HalfOpen,
}

#[derive(Debug, Default)]
struct Failures {
    consecutive: u32,
    last_at: Option<Instant>,
}

/// Per-caller circuit breaker
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use xagent_model::{CircuitBreaker, CircuitState};
///
/// let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
/// breaker.record_failure();
/// breaker.record_failure();
/// assert_eq!(breaker.state(), CircuitState::Open);
/// assert!(!breaker.can_execute());
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    failures: Mutex<Failures>,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            failures: Mutex::new(Failures::default()),
            threshold,
            cooldown,
        }
    }

    fn with_failures<R>(&self, f: impl FnOnce(&mut Failures) -> R) -> R {
        // A poisoned lock only means a panicking thread held it; the counters stay usable.
        let mut guard = match self.failures.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Current state
    pub fn state(&self) -> CircuitState {
        self.with_failures(|failures| {
            if failures.consecutive < self.threshold {
                return CircuitState::Closed;
            }
            match failures.last_at {
                Some(at) if at.elapsed() < self.cooldown => CircuitState::Open,
                _ => CircuitState::HalfOpen,
            }
        })
    }

    pub fn record_success(&self) {
        self.with_failures(|failures| *failures = Failures::default());
    }

    pub fn record_failure(&self) {
        self.with_failures(|failures| {
            failures.consecutive += 1;
            failures.last_at = Some(Instant::now());
        });
    }

    /// Whether a call may proceed (closed or half-open)
    pub fn can_execute(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn failure_count(&self) -> u32 {
        self.with_failures(|failures| failures.consecutive)
    }

    /// Time left before the breaker half-opens, zero unless open
    pub fn time_until_retry(&self) -> Duration {
        self.with_failures(|failures| {
            if failures.consecutive < self.threshold {
                return Duration::ZERO;
            }
            failures
                .last_at
                .map(|at| self.cooldown.saturating_sub(at.elapsed()))
                .unwrap_or(Duration::ZERO)
        })
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        // 3 failures, 60 second cooldown
        Self::new(3, Duration::from_secs(60))
    }
}
