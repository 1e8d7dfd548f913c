//! Circuit-broken access to the fast queue store.
//!
//! The fast store is a cache: every call through [`QueueMirror::attempt`] returns `None`
//! instead of an error when the store fails or the circuit is open, and callers fall back
//! to the ledger.

use crate::metrics;
use fairsale_core::fast_store::{FastQueueStore, FastResult};
use fairsale_runtime::circuit_breaker::State;
use fairsale_runtime::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Fast store behind a circuit breaker.
#[derive(Clone)]
pub struct QueueMirror {
    store: Arc<dyn FastQueueStore>,
    breaker: CircuitBreaker,
}

impl QueueMirror {
    /// Wraps `store` with the given breaker settings.
    #[must_use]
    pub fn new(store: Arc<dyn FastQueueStore>, config: CircuitBreakerConfig) -> Self {
        Self {
            store,
            breaker: CircuitBreaker::new("fast-store", config),
        }
    }

    /// Wraps `store` with default settings: open after 3 consecutive failures, probe again
    /// after 10 seconds.
    #[must_use]
    pub fn with_defaults(store: Arc<dyn FastQueueStore>) -> Self {
        let config = CircuitBreakerConfig::builder()
            .failure_threshold(3)
            .open_for(Duration::from_secs(10))
            .success_threshold(1)
            .build();
        Self::new(store, config)
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn FastQueueStore {
        self.store.as_ref()
    }

    /// Shared handle to the underlying store.
    #[must_use]
    pub fn shared_store(&self) -> Arc<dyn FastQueueStore> {
        Arc::clone(&self.store)
    }

    /// The circuit is open: admission runs on the ledger alone.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.breaker.state() == State::Open
    }

    /// Runs `call` unless the circuit is open. Failures are logged and yield `None`.
    pub async fn attempt<T, F>(&self, operation: &'static str, call: F) -> Option<T>
    where
        F: Future<Output = FastResult<T>>,
    {
        match self.breaker.call(|| call).await {
            Ok(value) => Some(value),
            Err(CircuitBreakerError::Open) => {
                metrics::record_fast_store_degraded(operation);
                tracing::debug!(operation, "Fast store circuit open, using ledger");
                None
            }
            Err(CircuitBreakerError::Inner(err)) => {
                metrics::record_fast_store_degraded(operation);
                tracing::warn!(operation, error = %err, "Fast store call failed, using ledger");
                None
            }
        }
    }

    /// Connectivity probe that bypasses the breaker.
    ///
    /// # Errors
    ///
    /// Returns the store's error.
    pub async fn ping(&self) -> FastResult<()> {
        self.store.ping().await
    }
}
