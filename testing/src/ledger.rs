//! In-memory waiting-room ledger.

use crate::{Switch, ready};
use chrono::{DateTime, Utc};
use fairsale_core::BoxFuture;
use fairsale_core::error::StoreError;
use fairsale_core::ids::{SessionId, UserId};
use fairsale_core::ledger::{ActivateOutcome, EnqueueOutcome, LedgerResult, QueueLedger, StatusCounts};
use fairsale_core::queue::{PromotionOrder, QueueEntry, QueueStatus};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    entries: HashMap<(SessionId, UserId), QueueEntry>,
    max_numbers: HashMap<SessionId, i64>,
}

impl State {
    fn active_count(&self, session: SessionId) -> usize {
        self.entries
            .values()
            .filter(|e| e.session_id == session && e.status == QueueStatus::Active)
            .count()
    }

    fn activate(
        &mut self,
        session: SessionId,
        user: UserId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        limit: u32,
    ) -> LedgerResult<ActivateOutcome> {
        if u32::try_from(self.active_count(session)).unwrap_or(u32::MAX) >= limit {
            return Ok(ActivateOutcome::NoCapacity);
        }
        match self.entries.get_mut(&(session, user)) {
            Some(entry) if entry.status == QueueStatus::Waiting => {
                entry.activate(now, expires_at)?;
                Ok(ActivateOutcome::Activated(entry.clone()))
            }
            _ => Ok(ActivateOutcome::NotWaiting),
        }
    }
}

/// Ledger kept in process memory, with the same validation rules as the durable one.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<Mutex<State>>,
    available: Switch,
    activations: Switch,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates an outage.
    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    /// Simulates a ledger that still answers reads but fails single-user activations.
    pub fn set_activations_available(&self, available: bool) {
        self.activations.set(available);
    }

    /// Every entry of a session, in queue-number order.
    #[must_use]
    pub fn entries(&self, session: SessionId) -> Vec<QueueEntry> {
        let mut entries: Vec<_> = self
            .lock()
            .entries
            .values()
            .filter(|e| e.session_id == session)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.queue_number);
        entries
    }

    /// Inserts or overwrites an entry without validation, for arranging test state.
    pub fn put(&self, entry: QueueEntry) {
        let mut state = self.lock();
        let max = state.max_numbers.entry(entry.session_id).or_insert(0);
        *max = (*max).max(entry.queue_number);
        state.entries.insert((entry.session_id, entry.user_id), entry);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with<T>(&self, f: impl FnOnce(&mut State) -> LedgerResult<T>) -> LedgerResult<T> {
        if !self.available.is_on() {
            return Err(StoreError::Unavailable("ledger switched off".to_string()));
        }
        f(&mut self.lock())
    }
}

impl QueueLedger for InMemoryLedger {
    fn find(&self, session: SessionId, user: UserId) -> BoxFuture<'_, LedgerResult<Option<QueueEntry>>> {
        ready(self.with(|state| Ok(state.entries.get(&(session, user)).cloned())))
    }

    fn enqueue(&self, entry: QueueEntry, max_capacity: u32) -> BoxFuture<'_, LedgerResult<EnqueueOutcome>> {
        ready(self.with(|state| {
            let session = entry.session_id;
            let current = state.max_numbers.get(&session).copied().unwrap_or(0);
            let key = (session, entry.user_id);

            if let Some(existing) = state.entries.get(&key) {
                if existing.status.is_live() {
                    return Ok(EnqueueOutcome::Existing(existing.clone()));
                }
            }
            let live = state
                .entries
                .values()
                .filter(|e| e.session_id == session && e.status.is_live())
                .count();
            let occupancy = u64::try_from(live).unwrap_or(u64::MAX);
            if occupancy >= u64::from(max_capacity) {
                return Ok(EnqueueOutcome::Full { occupancy });
            }
            if entry.queue_number <= current {
                return Err(StoreError::StaleSequence { current });
            }

            let created = match state.entries.get_mut(&key) {
                Some(existing) => {
                    existing.reopen(entry.queue_number, entry.priority_score, entry.entered_at)?;
                    existing.clone()
                }
                None => {
                    state.entries.insert(key, entry.clone());
                    entry
                }
            };
            state.max_numbers.insert(session, created.queue_number);
            Ok(EnqueueOutcome::Created(created))
        }))
    }

    fn next_queue_number(&self, session: SessionId) -> BoxFuture<'_, LedgerResult<i64>> {
        ready(self.with(|state| Ok(state.max_numbers.get(&session).copied().unwrap_or(0) + 1)))
    }

    fn activate(
        &self,
        session: SessionId,
        user: UserId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        limit: u32,
    ) -> BoxFuture<'_, LedgerResult<ActivateOutcome>> {
        if !self.activations.is_on() {
            return ready(Err(StoreError::Unavailable("activations switched off".to_string())));
        }
        ready(self.with(|state| state.activate(session, user, now, expires_at, limit)))
    }

    fn promote_waiting(
        &self,
        session: SessionId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        limit: u32,
        order: PromotionOrder,
    ) -> BoxFuture<'_, LedgerResult<Vec<QueueEntry>>> {
        ready(self.with(|state| {
            let candidates: BTreeSet<(u64, UserId)> = state
                .entries
                .values()
                .filter(|e| e.session_id == session && e.status == QueueStatus::Waiting)
                .map(|e| (order.score(e.queue_number, e.priority_score), e.user_id))
                .collect();

            let mut promoted = Vec::new();
            for (_, user) in candidates {
                match state.activate(session, user, now, expires_at, limit)? {
                    ActivateOutcome::Activated(entry) => promoted.push(entry),
                    ActivateOutcome::NoCapacity => break,
                    ActivateOutcome::NotWaiting => {}
                }
            }
            Ok(promoted)
        }))
    }

    fn transition(
        &self,
        session: SessionId,
        user: UserId,
        to: QueueStatus,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, LedgerResult<QueueEntry>> {
        ready(self.with(|state| {
            if to == QueueStatus::Active {
                return Err(StoreError::Conflict("activation goes through activate".to_string()));
            }
            let entry = state
                .entries
                .get_mut(&(session, user))
                .ok_or_else(|| StoreError::NotFound(format!("queue entry {session}/{user}")))?;
            entry.transition(to, now)?;
            Ok(entry.clone())
        }))
    }

    fn touch_heartbeat(
        &self,
        session: SessionId,
        user: UserId,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, LedgerResult<bool>> {
        ready(self.with(|state| {
            Ok(match state.entries.get_mut(&(session, user)) {
                Some(entry) if entry.holds_live_slot(now) => {
                    entry.last_heartbeat = Some(now);
                    true
                }
                _ => false,
            })
        }))
    }

    fn counts(&self, session: SessionId) -> BoxFuture<'_, LedgerResult<StatusCounts>> {
        ready(self.with(|state| {
            let mut counts = StatusCounts::default();
            for entry in state.entries.values().filter(|e| e.session_id == session) {
                counts.record(entry.status);
            }
            Ok(counts)
        }))
    }

    fn waiting_entries(&self, session: SessionId) -> BoxFuture<'_, LedgerResult<Vec<QueueEntry>>> {
        ready(self.with(|state| {
            let mut waiting: Vec<_> = state
                .entries
                .values()
                .filter(|e| e.session_id == session && e.status == QueueStatus::Waiting)
                .cloned()
                .collect();
            waiting.sort_by_key(|e| e.queue_number);
            Ok(waiting)
        }))
    }

    fn expire_lapsed(&self, now: DateTime<Utc>) -> BoxFuture<'_, LedgerResult<Vec<QueueEntry>>> {
        ready(self.with(|state| {
            let mut expired = Vec::new();
            for entry in state.entries.values_mut().filter(|e| e.slot_lapsed(now)) {
                entry.transition(QueueStatus::Expired, now)?;
                expired.push(entry.clone());
            }
            Ok(expired)
        }))
    }

    fn expire_session(
        &self,
        session: SessionId,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, LedgerResult<Vec<QueueEntry>>> {
        ready(self.with(|state| {
            let mut expired = Vec::new();
            for entry in state
                .entries
                .values_mut()
                .filter(|e| e.session_id == session && e.status.is_live())
            {
                entry.transition(QueueStatus::Expired, now)?;
                expired.push(entry.clone());
            }
            Ok(expired)
        }))
    }

    #[allow(clippy::cast_precision_loss)]
    fn average_wait_seconds(&self, session: SessionId) -> BoxFuture<'_, LedgerResult<Option<f64>>> {
        ready(self.with(|state| {
            let waits: Vec<i64> = state
                .entries
                .values()
                .filter(|e| e.session_id == session)
                .filter_map(QueueEntry::wait_seconds)
                .collect();
            if waits.is_empty() {
                return Ok(None);
            }
            Ok(Some(waits.iter().sum::<i64>() as f64 / waits.len() as f64))
        }))
    }

    fn live_sessions(&self) -> BoxFuture<'_, LedgerResult<Vec<SessionId>>> {
        ready(self.with(|state| {
            let sessions: BTreeSet<SessionId> = state
                .entries
                .values()
                .filter(|e| e.status.is_live())
                .map(|e| e.session_id)
                .collect();
            Ok(sessions.into_iter().collect())
        }))
    }

    fn ping(&self) -> BoxFuture<'_, LedgerResult<()>> {
        ready(self.with(|_| Ok(())))
    }
}
