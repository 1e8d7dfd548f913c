//! Waiting-room ledger seam.
//!
//! The ledger is the durable, authoritative record of queue membership. Every status
//! write is validated against [`QueueStatus::can_transition_to`], and the admission
//! bound (`active ≤ concurrent_purchase_limit`) is enforced here atomically so that it
//! holds no matter how many processors race or how far the fast store drifts.

use crate::error::StoreError;
use crate::ids::{SessionId, UserId};
use crate::queue::{PromotionOrder, QueueEntry, QueueStatus};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, StoreError>;

/// Result of [`QueueLedger::enqueue`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// A new lifecycle was recorded (fresh row or reopened terminal row).
    Created(QueueEntry),
    /// The user already holds a live entry; nothing was written.
    Existing(QueueEntry),
    /// The session already holds `max_capacity` live entries; nothing was written.
    Full {
        /// Waiting plus active entries at the time of the check.
        occupancy: u64,
    },
}

impl EnqueueOutcome {
    /// The resulting entry, if the user holds one.
    #[must_use]
    pub const fn entry(&self) -> Option<&QueueEntry> {
        match self {
            Self::Created(entry) | Self::Existing(entry) => Some(entry),
            Self::Full { .. } => None,
        }
    }
}

/// Result of [`QueueLedger::activate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActivateOutcome {
    /// Promoted.
    Activated(QueueEntry),
    /// The session already has `limit` active entries.
    NoCapacity,
    /// The entry is missing or not waiting.
    NotWaiting,
}

/// Entry counts per status for one session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    /// Waiting entries.
    pub waiting: u64,
    /// Active entries, including lapsed slots not yet reaped.
    pub active: u64,
    /// Completed entries.
    pub completed: u64,
    /// Expired entries.
    pub expired: u64,
    /// Cancelled entries.
    pub cancelled: u64,
}

impl StatusCounts {
    /// Adds one entry of `status`.
    pub const fn record(&mut self, status: QueueStatus) {
        match status {
            QueueStatus::Waiting => self.waiting += 1,
            QueueStatus::Active => self.active += 1,
            QueueStatus::Completed => self.completed += 1,
            QueueStatus::Expired => self.expired += 1,
            QueueStatus::Cancelled => self.cancelled += 1,
        }
    }

    /// Users currently holding a place: waiting plus active.
    #[must_use]
    pub const fn occupancy(&self) -> u64 {
        self.waiting + self.active
    }
}

/// Durable queue ledger.
pub trait QueueLedger: Send + Sync {
    /// Looks up the entry for `(session, user)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn find(&self, session: SessionId, user: UserId) -> BoxFuture<'_, LedgerResult<Option<QueueEntry>>>;

    /// Records a `waiting` entry.
    ///
    /// A live entry is returned unchanged. A terminal entry is reopened with the new
    /// entry's queue number, score and time. The capacity check, the stale-number check
    /// and the write run under one per-session serialization, so concurrent joins never
    /// push occupancy past `max_capacity`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StaleSequence`] if `entry.queue_number` is not greater than
    /// the session's current maximum.
    fn enqueue(&self, entry: QueueEntry, max_capacity: u32) -> BoxFuture<'_, LedgerResult<EnqueueOutcome>>;

    /// Allocates the next queue number as a locked `max + 1`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn next_queue_number(&self, session: SessionId) -> BoxFuture<'_, LedgerResult<i64>>;

    /// Flips `waiting → active` if fewer than `limit` entries are active.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn activate(
        &self,
        session: SessionId,
        user: UserId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        limit: u32,
    ) -> BoxFuture<'_, LedgerResult<ActivateOutcome>>;

    /// Promotes waiting entries in `order` until `limit` entries are active.
    ///
    /// Used when the fast store is unavailable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn promote_waiting(
        &self,
        session: SessionId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        limit: u32,
        order: PromotionOrder,
    ) -> BoxFuture<'_, LedgerResult<Vec<QueueEntry>>>;

    /// Moves the entry to `to`, validated against the lifecycle.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if there is no entry and
    /// [`StoreError::IllegalTransition`] if the move is not allowed.
    fn transition(
        &self,
        session: SessionId,
        user: UserId,
        to: QueueStatus,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, LedgerResult<QueueEntry>>;

    /// Records a heartbeat. Returns `false` unless the entry holds a live slot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn touch_heartbeat(
        &self,
        session: SessionId,
        user: UserId,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, LedgerResult<bool>>;

    /// Entry counts by status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn counts(&self, session: SessionId) -> BoxFuture<'_, LedgerResult<StatusCounts>>;

    /// Waiting entries in queue-number order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn waiting_entries(&self, session: SessionId) -> BoxFuture<'_, LedgerResult<Vec<QueueEntry>>>;

    /// Expires every active entry whose slot ended at or before `now`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn expire_lapsed(&self, now: DateTime<Utc>) -> BoxFuture<'_, LedgerResult<Vec<QueueEntry>>>;

    /// Expires every live entry of a session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn expire_session(
        &self,
        session: SessionId,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, LedgerResult<Vec<QueueEntry>>>;

    /// Mean seconds between entering and activation over promoted entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn average_wait_seconds(&self, session: SessionId) -> BoxFuture<'_, LedgerResult<Option<f64>>>;

    /// Sessions with at least one waiting or active entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn live_sessions(&self) -> BoxFuture<'_, LedgerResult<Vec<SessionId>>>;

    /// Connectivity probe.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backend cannot be reached.
    fn ping(&self) -> BoxFuture<'_, LedgerResult<()>>;
}
