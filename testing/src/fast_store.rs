//! In-memory fast queue store.

use crate::{Switch, ready};
use chrono::{DateTime, Utc};
use fairsale_core::BoxFuture;
use fairsale_core::environment::Clock;
use fairsale_core::error::StoreError;
use fairsale_core::fast_store::{FastQueueStore, FastResult};
use fairsale_core::ids::{SessionId, UserId};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct SessionQueue {
    ordered: BTreeSet<(u64, UserId)>,
    scores: HashMap<UserId, u64>,
}

#[derive(Debug, Default)]
struct State {
    queues: HashMap<SessionId, SessionQueue>,
    active: HashMap<(SessionId, UserId), DateTime<Utc>>,
    sequences: HashMap<SessionId, i64>,
    cooldowns: HashMap<UserId, DateTime<Utc>>,
}

/// Fast store kept in process memory.
///
/// Active markers and cooldowns expire according to the injected clock, the way TTL keys
/// expire in the real store. [`set_available`](Self::set_available) simulates an outage:
/// every call then fails with [`StoreError::Unavailable`].
#[derive(Clone)]
pub struct InMemoryFastStore {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
    available: Switch,
}

impl InMemoryFastStore {
    /// Creates an empty store reading time from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
            available: Switch::default(),
        }
    }

    /// Simulates an outage.
    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    /// Loses every key, as after a cache restart.
    pub fn flush(&self) {
        *self.lock() = State::default();
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with<T>(&self, f: impl FnOnce(&mut State, DateTime<Utc>) -> T) -> FastResult<T> {
        if !self.available.is_on() {
            return Err(StoreError::Unavailable("fast store switched off".to_string()));
        }
        let now = self.clock.now();
        let mut state = self.lock();
        state.active.retain(|_, expires_at| *expires_at > now);
        state.cooldowns.retain(|_, until| *until > now);
        Ok(f(&mut state, now))
    }
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

impl FastQueueStore for InMemoryFastStore {
    fn enqueue(&self, session: SessionId, user: UserId, score: u64) -> BoxFuture<'_, FastResult<bool>> {
        ready(self.with(|state, _| {
            let queue = state.queues.entry(session).or_default();
            if queue.scores.contains_key(&user) {
                return false;
            }
            queue.scores.insert(user, score);
            queue.ordered.insert((score, user));
            true
        }))
    }

    fn position(&self, session: SessionId, user: UserId) -> BoxFuture<'_, FastResult<Option<u64>>> {
        ready(self.with(|state, _| {
            let queue = state.queues.get(&session)?;
            let score = *queue.scores.get(&user)?;
            let ahead = queue.ordered.range(..(score, user)).count();
            u64::try_from(ahead).ok().map(|n| n + 1)
        }))
    }

    fn queue_length(&self, session: SessionId) -> BoxFuture<'_, FastResult<u64>> {
        ready(self.with(|state, _| {
            state
                .queues
                .get(&session)
                .map_or(0, |q| u64::try_from(q.ordered.len()).unwrap_or(u64::MAX))
        }))
    }

    fn pop_front(&self, session: SessionId, count: u64) -> BoxFuture<'_, FastResult<Vec<(UserId, u64)>>> {
        ready(self.with(|state, _| {
            let Some(queue) = state.queues.get_mut(&session) else {
                return Vec::new();
            };
            let mut popped = Vec::new();
            while u64::try_from(popped.len()).unwrap_or(u64::MAX) < count {
                let Some((score, user)) = queue.ordered.pop_first() else {
                    break;
                };
                queue.scores.remove(&user);
                popped.push((user, score));
            }
            popped
        }))
    }

    fn remove(&self, session: SessionId, user: UserId) -> BoxFuture<'_, FastResult<bool>> {
        ready(self.with(|state, _| {
            let Some(queue) = state.queues.get_mut(&session) else {
                return false;
            };
            match queue.scores.remove(&user) {
                Some(score) => queue.ordered.remove(&(score, user)),
                None => false,
            }
        }))
    }

    fn set_active(
        &self,
        session: SessionId,
        user: UserId,
        expires_at: DateTime<Utc>,
        ttl: Duration,
    ) -> BoxFuture<'_, FastResult<()>> {
        ready(self.with(|state, now| {
            let marker_expiry = now
                .checked_add_signed(to_chrono(ttl))
                .map_or(expires_at, |ttl_end| ttl_end.min(expires_at));
            state.active.insert((session, user), marker_expiry);
        }))
    }

    fn active_slot(
        &self,
        session: SessionId,
        user: UserId,
    ) -> BoxFuture<'_, FastResult<Option<DateTime<Utc>>>> {
        ready(self.with(|state, _| state.active.get(&(session, user)).copied()))
    }

    fn clear_active(&self, session: SessionId, user: UserId) -> BoxFuture<'_, FastResult<()>> {
        ready(self.with(|state, _| {
            state.active.remove(&(session, user));
        }))
    }

    fn next_sequence(&self, session: SessionId) -> BoxFuture<'_, FastResult<i64>> {
        ready(self.with(|state, _| {
            let counter = state.sequences.entry(session).or_insert(0);
            *counter += 1;
            *counter
        }))
    }

    fn seed_sequence(&self, session: SessionId, value: i64) -> BoxFuture<'_, FastResult<()>> {
        ready(self.with(|state, _| {
            let counter = state.sequences.entry(session).or_insert(0);
            *counter = (*counter).max(value);
        }))
    }

    fn set_cooldown(&self, user: UserId, ttl: Duration) -> BoxFuture<'_, FastResult<()>> {
        ready(self.with(|state, now| {
            let until = now
                .checked_add_signed(to_chrono(ttl))
                .unwrap_or(DateTime::<Utc>::MAX_UTC);
            state.cooldowns.insert(user, until);
        }))
    }

    fn cooldown(&self, user: UserId) -> BoxFuture<'_, FastResult<Option<Duration>>> {
        ready(self.with(|state, now| {
            state
                .cooldowns
                .get(&user)
                .and_then(|until| (*until - now).to_std().ok())
        }))
    }

    fn purge_session(&self, session: SessionId) -> BoxFuture<'_, FastResult<()>> {
        ready(self.with(|state, _| {
            state.queues.remove(&session);
            state.sequences.remove(&session);
            state.active.retain(|(s, _), _| *s != session);
        }))
    }

    fn ping(&self) -> BoxFuture<'_, FastResult<()>> {
        ready(self.with(|_, _| ()))
    }
}
