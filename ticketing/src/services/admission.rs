//! Waiting-room admission: join, status, heartbeat, leave and statistics.
//!
//! The ledger is authoritative. The fast store answers the hot read paths (position,
//! active marker) while it is healthy; every answer it cannot give is recomputed from the
//! ledger, so an outage degrades latency and never correctness.

use super::mirror::QueueMirror;
use super::processor::QueueProcessor;
use super::sequence::SequenceAllocator;
use crate::metrics;
use chrono::{DateTime, Utc};
use fairsale_core::environment::Clock;
use fairsale_core::error::StoreError;
use fairsale_core::ids::{SessionId, UserId};
use fairsale_core::ledger::{EnqueueOutcome, QueueLedger, StatusCounts};
use fairsale_core::store::Catalog;
use fairsale_core::{MembershipTier, PromotionOrder, QueueEntry, QueueStatus, WaitingRoomConfig};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Admission settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdmissionPolicy {
    /// Tie-break policy, used for fast-queue scores and ledger positions.
    pub promotion_order: PromotionOrder,
}

/// Where a user stands in a session's waiting room.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdmissionState {
    /// Holding a purchase slot.
    Active {
        /// Slot deadline.
        expires_at: DateTime<Utc>,
    },
    /// In line.
    Waiting {
        /// 1-based position.
        position: u64,
        /// Rough wait estimate.
        estimated_wait_minutes: u64,
    },
    /// The last lifecycle ended.
    Finished {
        /// Terminal status reached.
        status: QueueStatus,
    },
    /// No entry for this user.
    NotInQueue,
    /// The session has no waiting room; purchases are open to everyone.
    Open,
}

impl AdmissionState {
    /// Whether the user may create an order now.
    #[must_use]
    pub const fn can_purchase(&self) -> bool {
        matches!(self, Self::Active { .. } | Self::Open)
    }
}

/// Per-session waiting-room statistics.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct QueueStatistics {
    /// Session.
    pub session_id: SessionId,
    /// Entry counts by status.
    #[serde(flatten)]
    pub counts: StatusCounts,
    /// Waiting plus active.
    pub occupancy: u64,
    /// Capacity bound.
    pub max_capacity: u32,
    /// Active bound.
    pub concurrent_purchase_limit: u32,
    /// `active / concurrent_purchase_limit` in percent.
    pub capacity_utilization: f64,
    /// Mean seconds between joining and promotion.
    pub average_wait_seconds: Option<f64>,
    /// Members of the fast queue, when reachable.
    pub fast_queue_length: Option<u64>,
    /// The fast store circuit is open.
    pub fast_store_degraded: bool,
}

/// Admission errors.
#[derive(Error, Debug)]
pub enum AdmissionError {
    /// No such session.
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    /// The sale window has closed.
    #[error("sale for session {0} has closed")]
    SaleClosed(SessionId),

    /// The waiting room is full.
    #[error("waiting room is full ({occupancy}/{max_capacity})")]
    CapacityExceeded {
        /// Capacity bound.
        max_capacity: u32,
        /// Current waiting plus active.
        occupancy: u64,
    },

    /// Heartbeat from a user without a live slot.
    #[error("user has no active purchase slot")]
    NotActive,

    /// The user has no live entry.
    #[error("user is not in the queue")]
    NotInQueue,

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Waiting-room front door.
#[derive(Clone)]
pub struct AdmissionController {
    catalog: Arc<dyn Catalog>,
    ledger: Arc<dyn QueueLedger>,
    mirror: QueueMirror,
    sequence: SequenceAllocator,
    processor: QueueProcessor,
    clock: Arc<dyn Clock>,
    policy: AdmissionPolicy,
}

impl AdmissionController {
    /// Creates a controller.
    #[must_use]
    pub fn new(
        catalog: Arc<dyn Catalog>,
        ledger: Arc<dyn QueueLedger>,
        mirror: QueueMirror,
        processor: QueueProcessor,
        clock: Arc<dyn Clock>,
        policy: AdmissionPolicy,
    ) -> Self {
        let sequence = SequenceAllocator::new(mirror.clone(), Arc::clone(&ledger));
        Self {
            catalog,
            ledger,
            mirror,
            sequence,
            processor,
            clock,
            policy,
        }
    }

    async fn admission(&self, session: SessionId) -> Result<Option<(WaitingRoomConfig, bool)>, AdmissionError> {
        let sale = self
            .catalog
            .session(session)
            .await?
            .ok_or(AdmissionError::SessionNotFound(session))?;
        let closed = sale.sale_closed(self.clock.now());
        Ok(sale.admission().copied().map(|config| (config, closed)))
    }

    /// Enters `user` into the waiting room of `session`.
    ///
    /// Joining again while waiting or active returns the current state unchanged. A user
    /// whose previous lifecycle ended starts a new one at the back of the queue. Sessions
    /// without a waiting room answer [`AdmissionState::Open`].
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::SessionNotFound`], [`AdmissionError::SaleClosed`],
    /// [`AdmissionError::CapacityExceeded`] or a storage error.
    pub async fn join(
        &self,
        session: SessionId,
        user: UserId,
        tier: MembershipTier,
    ) -> Result<AdmissionState, AdmissionError> {
        let Some((config, closed)) = self.admission(session).await? else {
            return Ok(AdmissionState::Open);
        };
        if closed {
            return Err(AdmissionError::SaleClosed(session));
        }
        let now = self.clock.now();

        if let Some(entry) = self.ledger.find(session, user).await? {
            if entry.holds_live_slot(now) || entry.status == QueueStatus::Waiting {
                return self.describe(&entry, &config).await;
            }
            if entry.slot_lapsed(now) {
                self.retire_slot(session, user, QueueStatus::Expired).await?;
            }
        }

        let outcome = self
            .sequence
            .record_join(session, user, tier, now, config.max_capacity)
            .await?;
        let entry = match outcome {
            EnqueueOutcome::Existing(entry) => return self.describe(&entry, &config).await,
            EnqueueOutcome::Full { occupancy } => {
                tracing::info!(session_id = %session, occupancy, max_capacity = config.max_capacity, "Waiting room full");
                return Err(AdmissionError::CapacityExceeded {
                    max_capacity: config.max_capacity,
                    occupancy,
                });
            }
            EnqueueOutcome::Created(entry) => entry,
        };

        let score = self.policy.promotion_order.score(entry.queue_number, entry.priority_score);
        self.mirror
            .attempt("enqueue", self.mirror.store().enqueue(session, user, score))
            .await;
        metrics::record_queue_join();
        tracing::info!(
            session_id = %session,
            user_id = %user,
            queue_number = entry.queue_number,
            tier = %tier,
            "User joined waiting room"
        );

        self.promote_quietly(session).await;

        match self.ledger.find(session, user).await? {
            Some(current) => self.describe(&current, &config).await,
            None => self.describe(&entry, &config).await,
        }
    }

    /// Current admission state of `user`.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::SessionNotFound`] or a storage error.
    pub async fn status(&self, session: SessionId, user: UserId) -> Result<AdmissionState, AdmissionError> {
        let Some((config, _)) = self.admission(session).await? else {
            return Ok(AdmissionState::Open);
        };
        let now = self.clock.now();
        let store = self.mirror.store();

        if let Some(Some(expires_at)) = self
            .mirror
            .attempt("active_slot", store.active_slot(session, user))
            .await
        {
            if expires_at > now {
                return Ok(AdmissionState::Active { expires_at });
            }
        }
        if let Some(Some(position)) = self
            .mirror
            .attempt("position", store.position(session, user))
            .await
        {
            return Ok(waiting(&config, position));
        }

        match self.ledger.find(session, user).await? {
            Some(entry) => self.describe(&entry, &config).await,
            None => Ok(AdmissionState::NotInQueue),
        }
    }

    /// State of a ledger entry, with the position computed from the ledger for waiting
    /// entries.
    async fn describe(
        &self,
        entry: &QueueEntry,
        config: &WaitingRoomConfig,
    ) -> Result<AdmissionState, AdmissionError> {
        let now = self.clock.now();
        Ok(match entry.status {
            QueueStatus::Active => match entry.expires_at {
                Some(expires_at) if expires_at > now => AdmissionState::Active { expires_at },
                _ => AdmissionState::Finished {
                    status: QueueStatus::Expired,
                },
            },
            QueueStatus::Waiting => {
                let position = self.ledger_position(entry).await?;
                waiting(config, position)
            }
            status => AdmissionState::Finished { status },
        })
    }

    async fn ledger_position(&self, entry: &QueueEntry) -> Result<u64, AdmissionError> {
        let order = self.policy.promotion_order;
        let own = order.score(entry.queue_number, entry.priority_score);
        let ahead = self
            .ledger
            .waiting_entries(entry.session_id)
            .await?
            .iter()
            .filter(|other| order.score(other.queue_number, other.priority_score) < own)
            .count();
        Ok(u64::try_from(ahead).unwrap_or(u64::MAX).saturating_add(1))
    }

    /// Keeps an active slot alive.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::NotActive`] unless the user holds a live slot.
    pub async fn heartbeat(&self, session: SessionId, user: UserId) -> Result<(), AdmissionError> {
        if self.ledger.touch_heartbeat(session, user, self.clock.now()).await? {
            Ok(())
        } else {
            Err(AdmissionError::NotActive)
        }
    }

    /// Leaves the waiting room, freeing the place for the next user.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::NotInQueue`] if the user has no live entry.
    pub async fn leave(&self, session: SessionId, user: UserId) -> Result<(), AdmissionError> {
        let entry = self
            .ledger
            .find(session, user)
            .await?
            .filter(|entry| entry.status.is_live())
            .ok_or(AdmissionError::NotInQueue)?;

        match self
            .ledger
            .transition(session, user, QueueStatus::Cancelled, self.clock.now())
            .await
        {
            Ok(_) => {}
            Err(StoreError::IllegalTransition(_) | StoreError::NotFound(_)) => {
                return Err(AdmissionError::NotInQueue);
            }
            Err(err) => return Err(err.into()),
        }

        let store = self.mirror.store();
        self.mirror.attempt("remove", store.remove(session, user)).await;
        self.mirror
            .attempt("clear_active", store.clear_active(session, user))
            .await;
        tracing::info!(session_id = %session, user_id = %user, was = %entry.status, "User left waiting room");

        if entry.status == QueueStatus::Active {
            self.promote_quietly(session).await;
        }
        Ok(())
    }

    /// Ends an active slot with `to` (`completed` or `expired`).
    ///
    /// Entries that are not active are left alone. Returns whether a slot was retired.
    /// Callers promote afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the ledger fails.
    pub async fn retire_slot(
        &self,
        session: SessionId,
        user: UserId,
        to: QueueStatus,
    ) -> Result<bool, StoreError> {
        let Some(entry) = self.ledger.find(session, user).await? else {
            return Ok(false);
        };
        if entry.status != QueueStatus::Active {
            return Ok(false);
        }
        match self.ledger.transition(session, user, to, self.clock.now()).await {
            Ok(_) => {}
            // Lost a race with the reaper or a concurrent completion.
            Err(StoreError::IllegalTransition(_)) => return Ok(false),
            Err(err) => return Err(err),
        }
        self.mirror
            .attempt("clear_active", self.mirror.store().clear_active(session, user))
            .await;
        tracing::debug!(session_id = %session, user_id = %user, status = %to, "Slot retired");
        Ok(true)
    }

    /// Waiting-room statistics for a session.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionError::SessionNotFound`] if the session is unknown or has no
    /// waiting room, or a storage error.
    pub async fn statistics(&self, session: SessionId) -> Result<QueueStatistics, AdmissionError> {
        let (config, _) = self
            .admission(session)
            .await?
            .ok_or(AdmissionError::SessionNotFound(session))?;

        let counts = self.ledger.counts(session).await?;
        let average_wait_seconds = self.ledger.average_wait_seconds(session).await?;
        let fast_queue_length = self
            .mirror
            .attempt("queue_length", self.mirror.store().queue_length(session))
            .await;
        let occupancy = counts.occupancy();

        #[allow(clippy::cast_precision_loss)]
        let capacity_utilization = if config.concurrent_purchase_limit == 0 {
            0.0
        } else {
            counts.active as f64 / f64::from(config.concurrent_purchase_limit) * 100.0
        };

        Ok(QueueStatistics {
            session_id: session,
            counts,
            occupancy,
            max_capacity: config.max_capacity,
            concurrent_purchase_limit: config.concurrent_purchase_limit,
            capacity_utilization,
            average_wait_seconds,
            fast_queue_length,
            fast_store_degraded: self.mirror.is_degraded(),
        })
    }

    /// Promotes waiting users of `session`, logging failures.
    pub async fn promote_quietly(&self, session: SessionId) {
        if let Err(err) = self.processor.promote(session).await {
            tracing::warn!(session_id = %session, error = %err, "Promotion failed");
        }
    }
}

fn waiting(config: &WaitingRoomConfig, position: u64) -> AdmissionState {
    AdmissionState::Waiting {
        position,
        estimated_wait_minutes: config.estimated_wait_minutes(position),
    }
}
