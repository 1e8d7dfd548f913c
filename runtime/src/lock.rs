//! Distributed locks with scoped guards.
//!
//! [`DistributedLock`] layers token generation, bounded waiting and guard-based
//! release on top of a [`LockBackend`].
//!
//! Two acquisition modes exist:
//!
//! - [`DistributedLock::lock`] **fails closed**. It waits (with backoff) up to the
//!   configured budget and returns [`LockError::Contention`] or
//!   [`LockError::Unavailable`] otherwise. Used for reservation critical sections.
//! - [`DistributedLock::advisory`] **fails open**. If the backend is down the caller
//!   proceeds unlocked; if another holder has the key the caller is told to skip.
//!   Used for promotion, where the ledger enforces the real bound.
//!
//! A [`LockGuard`] releases its key when [`LockGuard::release`] is awaited or, as a
//! fallback on early return, panic or cancellation, from `Drop` on the current Tokio
//! runtime. Release is compare-and-delete, so a guard whose TTL already lapsed never
//! deletes a lock that a new owner acquired since.

use crate::retry::{RetryPolicy, retry_with_predicate};
use fairsale_core::lock::{LockBackend, LockError};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Outcome of [`DistributedLock::advisory`].
#[derive(Debug)]
pub enum Advisory {
    /// Lock acquired.
    Held(LockGuard),
    /// Someone else holds the lock; skip the work.
    Busy,
    /// Backend unavailable; proceed without the lock.
    Unlocked,
}

/// Lock manager over a shared backend.
#[derive(Clone)]
pub struct DistributedLock {
    backend: Arc<dyn LockBackend>,
    wait: RetryPolicy,
}

impl DistributedLock {
    /// Creates a lock manager that waits according to `wait` in [`lock`](Self::lock).
    #[must_use]
    pub fn new(backend: Arc<dyn LockBackend>, wait: RetryPolicy) -> Self {
        Self { backend, wait }
    }

    /// Lock manager waiting up to `budget` with short jittered backoff.
    #[must_use]
    pub fn with_wait_budget(backend: Arc<dyn LockBackend>, budget: Duration) -> Self {
        let wait = RetryPolicy::builder()
            .max_retries(usize::MAX)
            .initial_delay(Duration::from_millis(20))
            .max_delay(Duration::from_millis(250))
            .multiplier(1.5)
            .jitter(true)
            .budget(budget)
            .build();
        Self::new(backend, wait)
    }

    /// Single attempt. Returns the ownership token if acquired.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Unavailable`] if the backend cannot be reached.
    pub async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<String>, LockError> {
        let token = Uuid::new_v4().to_string();
        let acquired = self.backend.try_acquire(key, &token, ttl).await?;
        Ok(acquired.then_some(token))
    }

    /// Releases `key` if it still holds `token`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Unavailable`] if the backend cannot be reached.
    pub async fn release(&self, key: &str, token: &str) -> Result<bool, LockError> {
        self.backend.release(key, token).await
    }

    /// Extends `key` to `ttl` if it still holds `token`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Unavailable`] if the backend cannot be reached.
    pub async fn extend(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError> {
        self.backend.extend(key, token, ttl).await
    }

    /// Acquires `key`, waiting within the configured budget. Fails closed.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Contention`] if the key stayed held, or
    /// [`LockError::Unavailable`] if the backend cannot be reached.
    pub async fn lock(&self, key: &str, ttl: Duration) -> Result<LockGuard, LockError> {
        let result = retry_with_predicate(
            &self.wait,
            || async move {
                match self.acquire(key, ttl).await? {
                    Some(token) => Ok(token),
                    None => Err(LockError::Contention { key: key.to_string() }),
                }
            },
            |err| matches!(err, LockError::Contention { .. }),
        )
        .await;

        match result {
            Ok(token) => {
                tracing::trace!(key, "Lock acquired");
                Ok(LockGuard::new(Arc::clone(&self.backend), key.to_string(), token))
            }
            Err(err) => {
                if matches!(err, LockError::Contention { .. }) {
                    metrics::counter!("fairsale_lock_contention_total").increment(1);
                }
                tracing::warn!(key, error = %err, "Lock acquisition failed");
                Err(err)
            }
        }
    }

    /// Single attempt that fails open when the backend is unavailable.
    pub async fn advisory(&self, key: &str, ttl: Duration) -> Advisory {
        match self.acquire(key, ttl).await {
            Ok(Some(token)) => Advisory::Held(LockGuard::new(
                Arc::clone(&self.backend),
                key.to_string(),
                token,
            )),
            Ok(None) => Advisory::Busy,
            Err(err) => {
                tracing::warn!(key, error = %err, "Lock backend unavailable, proceeding unlocked");
                Advisory::Unlocked
            }
        }
    }
}

/// Scoped ownership of a lock key.
pub struct LockGuard {
    backend: Arc<dyn LockBackend>,
    key: String,
    token: String,
    released: bool,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl LockGuard {
    fn new(backend: Arc<dyn LockBackend>, key: String, token: String) -> Self {
        Self {
            backend,
            key,
            token,
            released: false,
        }
    }

    /// Locked key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Renews the TTL for long critical sections. Returns `false` if ownership was lost.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Unavailable`] if the backend cannot be reached.
    pub async fn renew(&self, ttl: Duration) -> Result<bool, LockError> {
        let renewed = self.backend.extend(&self.key, &self.token, ttl).await?;
        if !renewed {
            tracing::warn!(key = %self.key, "Lock ownership lost before renewal");
        }
        Ok(renewed)
    }

    /// Releases the lock now. Returns `false` if it had already expired or changed owner.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Unavailable`] if the backend cannot be reached; the key then
    /// expires through its TTL.
    pub async fn release(mut self) -> Result<bool, LockError> {
        self.released = true;
        self.backend.release(&self.key, &self.token).await
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let backend = Arc::clone(&self.backend);
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(err) = backend.release(&key, &token).await {
                    tracing::warn!(key, error = %err, "Deferred lock release failed");
                }
            });
        } else {
            tracing::warn!(key, "No runtime to release lock; relying on TTL");
        }
    }
}
