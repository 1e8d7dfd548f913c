//! Promotion of waiting users into active purchase slots.
//!
//! # Promotion
//!
//! ```text
//! advisory lock "promote:{session}"   (busy → skip, backend down → proceed)
//!   free = concurrent_purchase_limit − active
//!   fast store healthy:  pop_front(free) → ledger.activate(user) → set active marker
//!   fast store degraded: ledger.promote_waiting(free, order)
//! ```
//!
//! The ledger enforces `active ≤ concurrent_purchase_limit` atomically on every
//! activation, so the lock only avoids wasted work; correctness never depends on it.
//!
//! Two periodic tasks drive the processor: [`QueueProcessorTask`] promotes every live
//! session and [`SlotReaperTask`] expires lapsed slots, closes finished sales and rebuilds
//! the fast queue from the ledger.

use super::mirror::QueueMirror;
use crate::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fairsale_core::environment::Clock;
use fairsale_core::error::StoreError;
use fairsale_core::ids::{SessionId, UserId};
use fairsale_core::ledger::{ActivateOutcome, QueueLedger};
use fairsale_core::store::Catalog;
use fairsale_core::{PromotionOrder, QueueEntry, QueueStatus, WaitingRoomConfig};
use fairsale_runtime::{Advisory, DistributedLock, PeriodicTask};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Promotion settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessorPolicy {
    /// Tie-break policy.
    pub promotion_order: PromotionOrder,
    /// TTL of the per-session promotion lock.
    pub lock_ttl: Duration,
}

impl Default for ProcessorPolicy {
    fn default() -> Self {
        Self {
            promotion_order: PromotionOrder::Fifo,
            lock_ttl: Duration::from_secs(15),
        }
    }
}

/// Moves waiting users into active slots up to each session's limit.
#[derive(Clone)]
pub struct QueueProcessor {
    catalog: Arc<dyn Catalog>,
    ledger: Arc<dyn QueueLedger>,
    mirror: QueueMirror,
    locks: DistributedLock,
    clock: Arc<dyn Clock>,
    policy: ProcessorPolicy,
}

impl QueueProcessor {
    /// Creates a processor.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn Catalog>,
        ledger: Arc<dyn QueueLedger>,
        mirror: QueueMirror,
        locks: DistributedLock,
        clock: Arc<dyn Clock>,
        policy: ProcessorPolicy,
    ) -> Self {
        Self {
            catalog,
            ledger,
            mirror,
            locks,
            clock,
            policy,
        }
    }

    /// Promotes waiting users of `session` until its active limit is reached.
    ///
    /// Returns the promoted entries. Sessions without a waiting room, with a closed sale
    /// or whose lock is held elsewhere promote nobody.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the catalog or the ledger fails.
    pub async fn promote(&self, session: SessionId) -> Result<Vec<QueueEntry>, StoreError> {
        let Some(sale) = self.catalog.session(session).await? else {
            return Ok(Vec::new());
        };
        let now = self.clock.now();
        let Some(config) = sale.admission().copied() else {
            return Ok(Vec::new());
        };
        if sale.sale_closed(now) {
            return Ok(Vec::new());
        }

        let key = format!("promote:{session}");
        let guard = match self.locks.advisory(&key, self.policy.lock_ttl).await {
            Advisory::Held(guard) => Some(guard),
            Advisory::Busy => {
                tracing::debug!(session_id = %session, "Promotion already running elsewhere");
                return Ok(Vec::new());
            }
            Advisory::Unlocked => None,
        };

        let result = self.promote_locked(session, &config, now).await;

        if let Some(guard) = guard {
            if let Err(err) = guard.release().await {
                tracing::warn!(session_id = %session, error = %err, "Failed to release promotion lock");
            }
        }

        let promoted = result?;
        if !promoted.is_empty() {
            tracing::info!(session_id = %session, promoted = promoted.len(), "Users promoted");
        }
        metrics::record_promotions(promoted.len());
        Ok(promoted)
    }

    async fn promote_locked(
        &self,
        session: SessionId,
        config: &WaitingRoomConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<QueueEntry>, StoreError> {
        let counts = self.ledger.counts(session).await?;
        let limit = u64::from(config.concurrent_purchase_limit);
        let free = limit.saturating_sub(counts.active);
        if free == 0 || counts.waiting == 0 {
            return Ok(Vec::new());
        }

        let expires_at = slot_end(now, config);
        let store = self.mirror.store();
        let Some(popped) = self
            .mirror
            .attempt("pop_front", store.pop_front(session, free))
            .await
        else {
            return self
                .ledger
                .promote_waiting(session, now, expires_at, config.concurrent_purchase_limit, self.policy.promotion_order)
                .await;
        };

        let mut promoted = Vec::new();
        let mut failure = None;
        let mut remaining = popped.iter().copied();
        for (user, score) in remaining.by_ref() {
            match self
                .ledger
                .activate(session, user, now, expires_at, config.concurrent_purchase_limit)
                .await
            {
                Ok(ActivateOutcome::Activated(entry)) => {
                    self.mark_active(&entry, expires_at).await;
                    promoted.push(entry);
                }
                Ok(ActivateOutcome::NoCapacity) => {
                    self.requeue(session, user, score).await;
                    break;
                }
                Ok(ActivateOutcome::NotWaiting) => {}
                Err(err) => {
                    self.requeue(session, user, score).await;
                    failure = Some(err);
                    break;
                }
            }
        }
        for (user, score) in remaining {
            self.requeue(session, user, score).await;
        }
        if let Some(err) = failure {
            tracing::warn!(
                session_id = %session,
                promoted = promoted.len(),
                error = %err,
                "Activation failed, unpromoted users returned to the fast queue"
            );
            return Err(err);
        }

        // The fast queue can lag behind the ledger after an outage; fill the rest from it.
        let popped_len = u64::try_from(popped.len()).unwrap_or(u64::MAX);
        if popped_len < free {
            let backfilled = self
                .ledger
                .promote_waiting(session, now, expires_at, config.concurrent_purchase_limit, self.policy.promotion_order)
                .await?;
            for entry in &backfilled {
                self.mark_active(entry, expires_at).await;
                self.mirror
                    .attempt("remove", store.remove(session, entry.user_id))
                    .await;
            }
            promoted.extend(backfilled);
        }

        Ok(promoted)
    }

    async fn mark_active(&self, entry: &QueueEntry, expires_at: DateTime<Utc>) {
        let ttl = (expires_at - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
        self.mirror
            .attempt(
                "set_active",
                self.mirror
                    .store()
                    .set_active(entry.session_id, entry.user_id, expires_at, ttl),
            )
            .await;
    }

    /// Puts a popped user back under its old score unless the ledger shows they are no
    /// longer waiting. If the ledger cannot answer the user goes back anyway; a stale
    /// member is skipped as `NotWaiting` on a later pass.
    async fn requeue(&self, session: SessionId, user: UserId, score: u64) {
        match self.ledger.find(session, user).await {
            Ok(Some(entry)) if entry.status != QueueStatus::Waiting => return,
            Ok(None) => return,
            Ok(Some(_)) | Err(_) => {}
        }
        self.mirror
            .attempt("enqueue", self.mirror.store().enqueue(session, user, score))
            .await;
    }

    /// Re-adds every waiting ledger entry of `session` to the fast queue.
    ///
    /// Enqueue is insert-if-absent, so existing members keep their score.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the ledger fails.
    pub async fn rebuild_fast_queue(&self, session: SessionId) -> Result<usize, StoreError> {
        let waiting = self.ledger.waiting_entries(session).await?;
        let mut restored = 0;
        for entry in &waiting {
            let score = self.policy.promotion_order.score(entry.queue_number, entry.priority_score);
            let added = self
                .mirror
                .attempt("enqueue", self.mirror.store().enqueue(session, entry.user_id, score))
                .await;
            match added {
                Some(true) => restored += 1,
                Some(false) => {}
                None => break,
            }
        }
        Ok(restored)
    }

    /// Live sessions known to the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the ledger fails.
    pub async fn live_sessions(&self) -> Result<Vec<SessionId>, StoreError> {
        self.ledger.live_sessions().await
    }
}

fn slot_end(now: DateTime<Utc>, config: &WaitingRoomConfig) -> DateTime<Utc> {
    now.checked_add_signed(config.slot_duration())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Promotes every live session on a fixed interval.
pub struct QueueProcessorTask {
    processor: QueueProcessor,
    interval: Duration,
}

impl QueueProcessorTask {
    /// Creates the task.
    #[must_use]
    pub const fn new(processor: QueueProcessor, interval: Duration) -> Self {
        Self { processor, interval }
    }
}

#[async_trait]
impl PeriodicTask for QueueProcessorTask {
    fn name(&self) -> &'static str {
        "queue-processor"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> anyhow::Result<()> {
        for session in self.processor.live_sessions().await? {
            if let Err(err) = self.processor.promote(session).await {
                tracing::error!(session_id = %session, error = %err, "Promotion failed");
            }
        }
        Ok(())
    }
}

/// Expires lapsed slots and closed sales, then refills the freed capacity.
pub struct SlotReaperTask {
    catalog: Arc<dyn Catalog>,
    ledger: Arc<dyn QueueLedger>,
    mirror: QueueMirror,
    processor: QueueProcessor,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl SlotReaperTask {
    /// Creates the task.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn Catalog>,
        ledger: Arc<dyn QueueLedger>,
        mirror: QueueMirror,
        processor: QueueProcessor,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            catalog,
            ledger,
            mirror,
            processor,
            clock,
            interval,
        }
    }

    /// One reaper pass. Returns the number of entries expired.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the ledger or the catalog fails.
    pub async fn reap(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let store = self.mirror.store();
        let mut touched = BTreeSet::new();

        let lapsed = self.ledger.expire_lapsed(now).await?;
        for entry in &lapsed {
            self.mirror
                .attempt("clear_active", store.clear_active(entry.session_id, entry.user_id))
                .await;
            touched.insert(entry.session_id);
        }
        let mut expired = lapsed.len();

        for session in self.ledger.live_sessions().await? {
            let closed = self
                .catalog
                .session(session)
                .await?
                .is_none_or(|sale| sale.sale_closed(now));

            if closed {
                let swept = self.ledger.expire_session(session, now).await?;
                self.mirror
                    .attempt("purge_session", store.purge_session(session))
                    .await;
                if !swept.is_empty() {
                    tracing::info!(session_id = %session, expired = swept.len(), "Sale closed, queue emptied");
                }
                expired += swept.len();
                touched.remove(&session);
            } else {
                let restored = self.processor.rebuild_fast_queue(session).await?;
                if restored > 0 {
                    tracing::info!(session_id = %session, restored, "Fast queue rebuilt from ledger");
                    touched.insert(session);
                }
            }
        }

        for session in touched {
            if let Err(err) = self.processor.promote(session).await {
                tracing::error!(session_id = %session, error = %err, "Promotion after reap failed");
            }
        }

        metrics::record_slots_expired(expired);
        if expired > 0 {
            tracing::info!(expired, "Queue entries expired");
        }
        Ok(expired)
    }
}

#[async_trait]
impl PeriodicTask for SlotReaperTask {
    fn name(&self) -> &'static str {
        "slot-reaper"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> anyhow::Result<()> {
        self.reap().await?;
        Ok(())
    }
}
