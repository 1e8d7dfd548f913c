//! In-memory lock backend.

use crate::{Switch, ready};
use fairsale_core::BoxFuture;
use fairsale_core::lock::{LockBackend, LockError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Held {
    token: String,
    expires_at: Instant,
}

/// Lock backend over a shared map with TTL expiry and an availability switch.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLockBackend {
    locks: Arc<Mutex<HashMap<String, Held>>>,
    available: Switch,
}

impl InMemoryLockBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn locks(&self) -> MutexGuard<'_, HashMap<String, Held>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        locks.retain(|_, held| held.expires_at > now);
        locks
    }

    fn check(&self) -> Result<(), LockError> {
        if self.available.is_on() {
            Ok(())
        } else {
            Err(LockError::Unavailable("lock backend switched off".to_string()))
        }
    }

    /// Simulates an outage.
    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    /// Whether `key` is currently held.
    #[must_use]
    pub fn is_held(&self, key: &str) -> bool {
        self.locks().contains_key(key)
    }

    /// Drops `key` as if its TTL had elapsed.
    pub fn expire(&self, key: &str) {
        self.locks().remove(key);
    }
}

impl LockBackend for InMemoryLockBackend {
    fn try_acquire<'a>(
        &'a self,
        key: &'a str,
        token: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, LockError>> {
        ready(self.check().map(|()| {
            let mut locks = self.locks();
            if locks.contains_key(key) {
                return false;
            }
            locks.insert(
                key.to_string(),
                Held {
                    token: token.to_string(),
                    expires_at: Instant::now() + ttl,
                },
            );
            true
        }))
    }

    fn release<'a>(&'a self, key: &'a str, token: &'a str) -> BoxFuture<'a, Result<bool, LockError>> {
        ready(self.check().map(|()| {
            let mut locks = self.locks();
            if locks.get(key).is_some_and(|held| held.token == token) {
                locks.remove(key);
                true
            } else {
                false
            }
        }))
    }

    fn extend<'a>(
        &'a self,
        key: &'a str,
        token: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, LockError>> {
        ready(self.check().map(|()| {
            match self.locks().get_mut(key) {
                Some(held) if held.token == token => {
                    held.expires_at = Instant::now() + ttl;
                    true
                }
                _ => false,
            }
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ttl_expires_lock() {
        let backend = InMemoryLockBackend::new();
        assert!(backend.try_acquire("k", "a", Duration::from_secs(1)).await.unwrap());
        assert!(!backend.try_acquire("k", "b", Duration::from_secs(1)).await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(backend.try_acquire("k", "b", Duration::from_secs(1)).await.unwrap());
        assert!(!backend.release("k", "a").await.unwrap());
    }
}
