//! Queue-number allocation across the two sequence backends.

use super::mirror::QueueMirror;
use chrono::{DateTime, Utc};
use fairsale_core::error::StoreError;
use fairsale_core::ids::{SessionId, UserId};
use fairsale_core::ledger::{EnqueueOutcome, QueueLedger};
use fairsale_core::sequence::{FastSequence, LedgerSequence, SequenceSource};
use fairsale_core::{MembershipTier, QueueEntry};
use std::sync::Arc;

const MAX_ATTEMPTS: usize = 3;

/// Picks a [`SequenceSource`] per decision and records the join in the ledger.
///
/// The fast counter is used while the fast store answers; otherwise the ledger's locked
/// `max + 1`. If the ledger rejects a number as stale (the fast counter was lost or lags
/// behind numbers issued by the ledger), the fast counter is raised to the ledger's
/// maximum and the join is retried.
#[derive(Clone)]
pub struct SequenceAllocator {
    mirror: QueueMirror,
    ledger: Arc<dyn QueueLedger>,
    fast: FastSequence,
    durable: LedgerSequence,
}

impl SequenceAllocator {
    /// Creates an allocator over both backends.
    #[must_use]
    pub fn new(mirror: QueueMirror, ledger: Arc<dyn QueueLedger>) -> Self {
        let fast = FastSequence::new(mirror.shared_store());
        let durable = LedgerSequence::new(Arc::clone(&ledger));
        Self {
            mirror,
            ledger,
            fast,
            durable,
        }
    }

    async fn next(&self, session: SessionId) -> Result<(i64, &'static str), StoreError> {
        if let Some(number) = self.mirror.attempt("next_sequence", self.fast.next(session)).await {
            return Ok((number, self.fast.name()));
        }
        let number = self.durable.next(session).await?;
        Ok((number, self.durable.name()))
    }

    /// Writes a `waiting` ledger entry with a fresh queue number, unless the session
    /// already holds `max_capacity` live entries.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the ledger fails, or [`StoreError::Conflict`] if every
    /// attempt drew a stale number.
    pub async fn record_join(
        &self,
        session: SessionId,
        user: UserId,
        tier: MembershipTier,
        now: DateTime<Utc>,
        max_capacity: u32,
    ) -> Result<EnqueueOutcome, StoreError> {
        for attempt in 1..=MAX_ATTEMPTS {
            let (number, source) = self.next(session).await?;
            let entry = QueueEntry::waiting(user, session, number, tier, now);

            match self.ledger.enqueue(entry, max_capacity).await {
                Err(StoreError::StaleSequence { current }) => {
                    tracing::warn!(
                        session_id = %session,
                        attempt,
                        source,
                        number,
                        current,
                        "Stale queue number, resynchronising sequence"
                    );
                    self.mirror
                        .attempt("seed_sequence", self.fast.seed(session, current))
                        .await;
                }
                outcome => return outcome,
            }
        }
        Err(StoreError::Conflict(format!(
            "queue number allocation for session {session} kept losing races"
        )))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use fairsale_core::fast_store::FastQueueStore;
    use fairsale_testing::{InMemoryFastStore, InMemoryLedger, test_clock, test_epoch};

    fn setup() -> (InMemoryFastStore, InMemoryLedger, SequenceAllocator) {
        let fast = InMemoryFastStore::new(Arc::new(test_clock()));
        let ledger = InMemoryLedger::new();
        let mirror = QueueMirror::with_defaults(Arc::new(fast.clone()));
        let allocator = SequenceAllocator::new(mirror, Arc::new(ledger.clone()));
        (fast, ledger, allocator)
    }

    #[tokio::test]
    async fn numbers_increase_per_session() {
        let (_, _, allocator) = setup();
        let session = SessionId::new();

        let first = allocator
            .record_join(session, UserId::new(), MembershipTier::Basic, test_epoch(), 100)
            .await
            .unwrap();
        let second = allocator
            .record_join(session, UserId::new(), MembershipTier::Basic, test_epoch(), 100)
            .await
            .unwrap();

        assert_eq!(first.entry().unwrap().queue_number, 1);
        assert_eq!(second.entry().unwrap().queue_number, 2);
    }

    #[tokio::test]
    async fn lost_fast_counter_is_reseeded_from_the_ledger() {
        let (fast, ledger, allocator) = setup();
        let session = SessionId::new();
        for n in 1..=5 {
            ledger.put(QueueEntry::waiting(
                UserId::new(),
                session,
                n,
                MembershipTier::Basic,
                test_epoch(),
            ));
        }

        let outcome = allocator
            .record_join(session, UserId::new(), MembershipTier::Basic, test_epoch(), 100)
            .await
            .unwrap();

        assert!(matches!(outcome, EnqueueOutcome::Created(_)));
        assert_eq!(outcome.entry().unwrap().queue_number, 6);
        assert_eq!(fast.next_sequence(session).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn ledger_backend_takes_over_when_fast_store_is_down() {
        let (fast, _, allocator) = setup();
        let session = SessionId::new();
        allocator
            .record_join(session, UserId::new(), MembershipTier::Basic, test_epoch(), 100)
            .await
            .unwrap();

        fast.set_available(false);
        let outcome = allocator
            .record_join(session, UserId::new(), MembershipTier::Premium, test_epoch(), 100)
            .await
            .unwrap();

        assert_eq!(outcome.entry().unwrap().queue_number, 2);
        assert_eq!(outcome.entry().unwrap().priority_score, 100);
    }

    #[tokio::test]
    async fn full_session_draws_no_entry() {
        let (_, ledger, allocator) = setup();
        let session = SessionId::new();
        allocator
            .record_join(session, UserId::new(), MembershipTier::Basic, test_epoch(), 1)
            .await
            .unwrap();

        let outcome = allocator
            .record_join(session, UserId::new(), MembershipTier::Basic, test_epoch(), 1)
            .await
            .unwrap();

        assert_eq!(outcome, EnqueueOutcome::Full { occupancy: 1 });
        assert_eq!(ledger.entries(session).len(), 1);
    }
}
