//! Per-session queue-number allocation.
//!
//! Two interchangeable backends implement [`SequenceSource`]:
//!
//! | Backend | Mechanism | Used when |
//! |---------|-----------|-----------|
//! | [`FastSequence`] | atomic increment in the fast store | fast store healthy |
//! | [`LedgerSequence`] | locked `max + 1` in the ledger | fast store degraded |
//!
//! A caller picks one backend per decision and never mixes them. Switching backends
//! cannot produce a duplicate or decreasing number: the ledger rejects a number that is
//! not above the session maximum with [`StoreError::StaleSequence`].

use crate::error::StoreError;
use crate::fast_store::FastQueueStore;
use crate::ids::SessionId;
use crate::ledger::QueueLedger;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Source of monotonic queue numbers.
pub trait SequenceSource: Send + Sync {
    /// Next queue number for `session`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn next(&self, session: SessionId) -> BoxFuture<'_, Result<i64, StoreError>>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Atomic-increment backend.
#[derive(Clone)]
pub struct FastSequence {
    store: Arc<dyn FastQueueStore>,
}

impl FastSequence {
    /// Creates a fast-store backed sequence.
    #[must_use]
    pub fn new(store: Arc<dyn FastQueueStore>) -> Self {
        Self { store }
    }

    /// Raises the counter so the next number is above `current`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    pub async fn seed(&self, session: SessionId, current: i64) -> Result<(), StoreError> {
        self.store.seed_sequence(session, current).await
    }
}

impl SequenceSource for FastSequence {
    fn next(&self, session: SessionId) -> BoxFuture<'_, Result<i64, StoreError>> {
        self.store.next_sequence(session)
    }

    fn name(&self) -> &'static str {
        "fast"
    }
}

/// Locked read-max-plus-one backend.
#[derive(Clone)]
pub struct LedgerSequence {
    ledger: Arc<dyn QueueLedger>,
}

impl LedgerSequence {
    /// Creates a ledger-backed sequence.
    #[must_use]
    pub fn new(ledger: Arc<dyn QueueLedger>) -> Self {
        Self { ledger }
    }
}

impl SequenceSource for LedgerSequence {
    fn next(&self, session: SessionId) -> BoxFuture<'_, Result<i64, StoreError>> {
        self.ledger.next_queue_number(session)
    }

    fn name(&self) -> &'static str {
        "ledger"
    }
}
