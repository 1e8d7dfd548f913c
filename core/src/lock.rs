//! Lock backend seam.
//!
//! A backend offers three atomic primitives over a shared store:
//!
//! - `try_acquire`: set-if-absent with expiry. The TTL guarantees eventual release even
//!   if the holder crashes.
//! - `release`: compare-and-delete. Only the holder of `token` can release.
//! - `extend`: compare-and-extend. Only the holder of `token` can renew.
//!
//! Retry, timeouts and scoped guards live in `fairsale-runtime`.

use futures::future::BoxFuture;
use std::time::Duration;
use thiserror::Error;

/// Lock errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The lock is held by someone else and the wait budget ran out.
    #[error("lock contention on {key}")]
    Contention {
        /// Contended key.
        key: String,
    },

    /// The lock backend could not be reached.
    #[error("lock backend unavailable: {0}")]
    Unavailable(String),
}

/// Atomic lock primitives.
pub trait LockBackend: Send + Sync {
    /// Stores `token` under `key` with `ttl` if the key is absent.
    ///
    /// Returns `true` if the lock was acquired.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Unavailable`] if the backend cannot be reached.
    fn try_acquire<'a>(
        &'a self,
        key: &'a str,
        token: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, LockError>>;

    /// Deletes `key` only if it still holds `token`.
    ///
    /// Returns `true` if the lock was released, `false` if it had expired or changed owner.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Unavailable`] if the backend cannot be reached.
    fn release<'a>(&'a self, key: &'a str, token: &'a str) -> BoxFuture<'a, Result<bool, LockError>>;

    /// Resets the expiry of `key` to `ttl` only if it still holds `token`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Unavailable`] if the backend cannot be reached.
    fn extend<'a>(
        &'a self,
        key: &'a str,
        token: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, LockError>>;
}
