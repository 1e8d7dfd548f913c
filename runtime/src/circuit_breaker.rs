//! Circuit breaker guarding calls to an optional backend.
//!
//! The fast queue store is a cache: when it fails repeatedly the breaker opens and
//! callers switch to their degraded path (ledger-only admission) instead of paying a
//! timeout on every request.
//!
//! # States
//!
//! - **Closed**: calls pass through; consecutive failures are counted.
//! - **Open**: calls are rejected without touching the backend until `open_for` elapses.
//! - **HalfOpen**: calls pass through as probes; `success_threshold` successes close the
//!   circuit, one failure reopens it.
//!
//! ```rust
//! use fairsale_runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::new(
//!     "fast-store",
//!     CircuitBreakerConfig::builder()
//!         .failure_threshold(3)
//!         .open_for(Duration::from_secs(10))
//!         .build(),
//! );
//!
//! let value = breaker.call(|| async { Ok::<_, String>(7) }).await;
//! assert!(value.is_ok());
//! # }
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    pub failure_threshold: usize,
    /// Time spent open before probing
    pub open_for: Duration,
    /// Probe successes needed to close again
    pub success_threshold: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub const fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder {
            config: CircuitBreakerConfig {
                failure_threshold: 5,
                open_for: Duration::from_secs(30),
                success_threshold: 1,
            },
        }
    }
}

/// Builder for [`CircuitBreakerConfig`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    /// Set the failure threshold.
    #[must_use]
    pub const fn failure_threshold(mut self, threshold: usize) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Set how long the circuit stays open.
    #[must_use]
    pub const fn open_for(mut self, duration: Duration) -> Self {
        self.config.open_for = duration;
        self
    }

    /// Set the number of probe successes that close the circuit.
    #[must_use]
    pub const fn success_threshold(mut self, threshold: usize) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub const fn build(self) -> CircuitBreakerConfig {
        self.config
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Calls pass through
    Closed,
    /// Calls are rejected
    Open,
    /// Calls pass through as probes
    HalfOpen,
}

/// Errors from circuit breaker operations.
#[derive(Error, Debug)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, the operation was not attempted
    #[error("circuit breaker is open")]
    Open,
    /// Operation failed
    #[error("operation failed: {0}")]
    Inner(E),
}

#[derive(Debug)]
struct Inner {
    state: State,
    failures: usize,
    probe_successes: usize,
    opened_at: Option<Instant>,
}

/// Circuit breaker. Cheap to clone; clones share state.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: Arc<CircuitBreakerConfig>,
    inner: Arc<Mutex<Inner>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    #[must_use]
    pub fn new(name: &str, config: CircuitBreakerConfig) -> Self {
        Self {
            name: Arc::from(name),
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(Inner {
                state: State::Closed,
                failures: 0,
                probe_successes: 0,
                opened_at: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state, moving `Open -> HalfOpen` if the open period has elapsed.
    #[must_use]
    pub fn state(&self) -> State {
        let mut inner = self.lock();
        if inner.state == State::Open
            && inner
                .opened_at
                .is_some_and(|at| at.elapsed() >= self.config.open_for)
        {
            tracing::info!(breaker = %self.name, "Circuit breaker OPEN -> HALF_OPEN");
            inner.state = State::HalfOpen;
            inner.probe_successes = 0;
        }
        inner.state
    }

    /// Whether a call would be attempted right now.
    #[must_use]
    pub fn allows_request(&self) -> bool {
        self.state() != State::Open
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        match inner.state {
            State::Closed => inner.failures = 0,
            State::HalfOpen => {
                inner.probe_successes += 1;
                if inner.probe_successes >= self.config.success_threshold {
                    tracing::info!(breaker = %self.name, "Circuit breaker HALF_OPEN -> CLOSED");
                    inner.state = State::Closed;
                    inner.failures = 0;
                    inner.probe_successes = 0;
                    inner.opened_at = None;
                }
            }
            State::Open => {}
        }
    }

    /// Records a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        match inner.state {
            State::Closed => {
                inner.failures += 1;
                if inner.failures >= self.config.failure_threshold {
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.failures,
                        "Circuit breaker CLOSED -> OPEN"
                    );
                    inner.state = State::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            State::HalfOpen => {
                tracing::warn!(breaker = %self.name, "Circuit breaker HALF_OPEN -> OPEN (probe failed)");
                inner.state = State::Open;
                inner.opened_at = Some(Instant::now());
                inner.probe_successes = 0;
            }
            State::Open => inner.opened_at = Some(Instant::now()),
        }
    }

    /// Runs `operation` if the circuit allows it. Every error counts as a failure.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitBreakerError::Open`] without running the operation if the circuit
    /// is open, or [`CircuitBreakerError::Inner`] with the operation's error.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_classified(operation, |_| true).await
    }

    /// Runs `operation` if the circuit allows it; only errors accepted by `is_failure`
    /// count against the backend. Other errors are logical rejections and count as a
    /// healthy response.
    ///
    /// # Errors
    ///
    /// Returns [`CircuitBreakerError::Open`] without running the operation if the circuit
    /// is open, or [`CircuitBreakerError::Inner`] with the operation's error.
    pub async fn call_classified<F, Fut, T, E, P>(
        &self,
        operation: F,
        is_failure: P,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnOnce(&E) -> bool,
    {
        if !self.allows_request() {
            return Err(CircuitBreakerError::Open);
        }
        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                if is_failure(&err) {
                    self.record_failure();
                } else {
                    self.record_success();
                }
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: usize) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig::builder()
                .failure_threshold(threshold)
                .open_for(Duration::from_millis(100))
                .success_threshold(2)
                .build(),
        )
    }

    async fn fail(b: &CircuitBreaker) {
        let _ = b.call(|| async { Err::<(), _>("down") }).await;
    }

    #[tokio::test]
    async fn opens_after_threshold_and_rejects() {
        let b = breaker(2);
        fail(&b).await;
        assert_eq!(b.state(), State::Closed);
        fail(&b).await;
        assert_eq!(b.state(), State::Open);

        let result = b.call(|| async { Ok::<_, String>(1) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open)));
    }

    #[tokio::test]
    async fn logical_errors_do_not_open() {
        let b = breaker(1);
        let _ = b
            .call_classified(|| async { Err::<(), _>("not found") }, |e| *e == "down")
            .await;
        assert_eq!(b.state(), State::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_probes_close_the_circuit() {
        let b = breaker(1);
        fail(&b).await;
        assert_eq!(b.state(), State::Open);

        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(b.state(), State::HalfOpen);

        let _ = b.call(|| async { Ok::<_, String>(()) }).await;
        assert_eq!(b.state(), State::HalfOpen);
        let _ = b.call(|| async { Ok::<_, String>(()) }).await;
        assert_eq!(b.state(), State::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_reopens() {
        let b = breaker(1);
        fail(&b).await;
        tokio::time::advance(Duration::from_millis(150)).await;
        fail(&b).await;
        assert_eq!(b.state(), State::Open);
    }
}
