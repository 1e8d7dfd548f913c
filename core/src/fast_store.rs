//! Fast queue store seam.
//!
//! An in-memory mirror of the waiting room used for per-second admission decisions:
//!
//! - an ordered queue per session (lowest score first, see
//!   [`PromotionOrder::score`](crate::queue::PromotionOrder::score)),
//! - a per-user active marker whose TTL equals the remaining slot time,
//! - a per-session sequence counter,
//! - per-user purchase cooldowns.
//!
//! The store is a cache. The ledger is authoritative, every write here is best-effort,
//! and the whole store may be lost and rebuilt.

use crate::error::StoreError;
use crate::ids::{SessionId, UserId};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::time::Duration;

/// Result type for fast-store operations.
pub type FastResult<T> = Result<T, StoreError>;

/// Ephemeral admission state.
pub trait FastQueueStore: Send + Sync {
    /// Adds `user` to the session queue with `score` unless already queued.
    ///
    /// Returns `true` if the user was added.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn enqueue(&self, session: SessionId, user: UserId, score: u64) -> BoxFuture<'_, FastResult<bool>>;

    /// 1-based position of `user` in the session queue.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn position(&self, session: SessionId, user: UserId) -> BoxFuture<'_, FastResult<Option<u64>>>;

    /// Number of queued users.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn queue_length(&self, session: SessionId) -> BoxFuture<'_, FastResult<u64>>;

    /// Removes and returns up to `count` users from the head of the queue, each with the
    /// score it was queued under.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn pop_front(&self, session: SessionId, count: u64) -> BoxFuture<'_, FastResult<Vec<(UserId, u64)>>>;

    /// Removes `user` from the queue. Returns `true` if it was queued.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn remove(&self, session: SessionId, user: UserId) -> BoxFuture<'_, FastResult<bool>>;

    /// Writes the active marker for `user`, expiring after `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn set_active(
        &self,
        session: SessionId,
        user: UserId,
        expires_at: DateTime<Utc>,
        ttl: Duration,
    ) -> BoxFuture<'_, FastResult<()>>;

    /// Slot expiry recorded in the active marker, if present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn active_slot(
        &self,
        session: SessionId,
        user: UserId,
    ) -> BoxFuture<'_, FastResult<Option<DateTime<Utc>>>>;

    /// Deletes the active marker.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn clear_active(&self, session: SessionId, user: UserId) -> BoxFuture<'_, FastResult<()>>;

    /// Atomically increments and returns the session's queue-number counter.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn next_sequence(&self, session: SessionId) -> BoxFuture<'_, FastResult<i64>>;

    /// Raises the counter to at least `value`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn seed_sequence(&self, session: SessionId, value: i64) -> BoxFuture<'_, FastResult<()>>;

    /// Starts a purchase cooldown for `user`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn set_cooldown(&self, user: UserId, ttl: Duration) -> BoxFuture<'_, FastResult<()>>;

    /// Remaining cooldown for `user`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn cooldown(&self, user: UserId) -> BoxFuture<'_, FastResult<Option<Duration>>>;

    /// Drops every key belonging to the session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn purge_session(&self, session: SessionId) -> BoxFuture<'_, FastResult<()>>;

    /// Connectivity probe.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backend cannot be reached.
    fn ping(&self) -> BoxFuture<'_, FastResult<()>>;
}
