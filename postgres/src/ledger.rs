//! Durable waiting-room ledger.

use crate::convert::{EntryRow, entries};
use crate::db_error;
use chrono::{DateTime, Utc};
use fairsale_core::BoxFuture;
use fairsale_core::error::StoreError;
use fairsale_core::ids::{SessionId, UserId};
use fairsale_core::ledger::{ActivateOutcome, EnqueueOutcome, LedgerResult, QueueLedger, StatusCounts};
use fairsale_core::queue::{PromotionOrder, QueueEntry, QueueStatus};
use sqlx::{PgConnection, PgPool};

const ENTRY_COLUMNS: &str = "session_id, user_id, queue_number, priority_score, status, entered_at, \
                             activated_at, expires_at, completed_at, last_heartbeat";

/// `PostgreSQL` waiting-room ledger.
///
/// Every write that depends on session-wide state (queue numbers, the active count)
/// takes `pg_advisory_xact_lock` on the session first, so concurrent processors and API
/// replicas serialize per session and run in parallel across sessions.
#[derive(Clone, Debug)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    /// Creates a ledger over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn lock_session(conn: &mut PgConnection, session: SessionId) -> LedgerResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::text, 0))")
            .bind(session.as_uuid())
            .execute(conn)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn max_number(conn: &mut PgConnection, session: SessionId) -> LedgerResult<i64> {
        let (max,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(queue_number), 0) FROM waiting_room_entries WHERE session_id = $1",
        )
        .bind(session.as_uuid())
        .fetch_one(conn)
        .await
        .map_err(db_error)?;
        Ok(max)
    }

    async fn active_count(conn: &mut PgConnection, session: SessionId) -> LedgerResult<i64> {
        let (active,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM waiting_room_entries WHERE session_id = $1 AND status = 'active'",
        )
        .bind(session.as_uuid())
        .fetch_one(conn)
        .await
        .map_err(db_error)?;
        Ok(active)
    }

    async fn live_count(conn: &mut PgConnection, session: SessionId) -> LedgerResult<u64> {
        let (live,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM waiting_room_entries \
             WHERE session_id = $1 AND status IN ('waiting', 'active')",
        )
        .bind(session.as_uuid())
        .fetch_one(conn)
        .await
        .map_err(db_error)?;
        Ok(u64::try_from(live).unwrap_or(0))
    }

    async fn find_for_update(
        conn: &mut PgConnection,
        session: SessionId,
        user: UserId,
    ) -> LedgerResult<Option<QueueEntry>> {
        let row: Option<EntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM waiting_room_entries \
             WHERE session_id = $1 AND user_id = $2 FOR UPDATE"
        ))
        .bind(session.as_uuid())
        .bind(user.as_uuid())
        .fetch_optional(conn)
        .await
        .map_err(db_error)?;
        row.map(QueueEntry::try_from).transpose()
    }

    async fn write(conn: &mut PgConnection, entry: &QueueEntry) -> LedgerResult<()> {
        sqlx::query(
            r"
            INSERT INTO waiting_room_entries (
                session_id, user_id, queue_number, priority_score, status, entered_at,
                activated_at, expires_at, completed_at, last_heartbeat
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (session_id, user_id) DO UPDATE SET
                queue_number = EXCLUDED.queue_number,
                priority_score = EXCLUDED.priority_score,
                status = EXCLUDED.status,
                entered_at = EXCLUDED.entered_at,
                activated_at = EXCLUDED.activated_at,
                expires_at = EXCLUDED.expires_at,
                completed_at = EXCLUDED.completed_at,
                last_heartbeat = EXCLUDED.last_heartbeat
            ",
        )
        .bind(entry.session_id.as_uuid())
        .bind(entry.user_id.as_uuid())
        .bind(entry.queue_number)
        .bind(entry.priority_score)
        .bind(entry.status.as_str())
        .bind(entry.entered_at)
        .bind(entry.activated_at)
        .bind(entry.expires_at)
        .bind(entry.completed_at)
        .bind(entry.last_heartbeat)
        .execute(conn)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn enqueue_inner(&self, entry: QueueEntry, max_capacity: u32) -> LedgerResult<EnqueueOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        Self::lock_session(&mut tx, entry.session_id).await?;

        let existing = Self::find_for_update(&mut tx, entry.session_id, entry.user_id).await?;
        if let Some(existing) = &existing {
            if existing.status.is_live() {
                return Ok(EnqueueOutcome::Existing(existing.clone()));
            }
        }

        let occupancy = Self::live_count(&mut tx, entry.session_id).await?;
        if occupancy >= u64::from(max_capacity) {
            return Ok(EnqueueOutcome::Full { occupancy });
        }

        let current = Self::max_number(&mut tx, entry.session_id).await?;
        if entry.queue_number <= current {
            return Err(StoreError::StaleSequence { current });
        }

        let created = match existing {
            Some(mut previous) => {
                previous.reopen(entry.queue_number, entry.priority_score, entry.entered_at)?;
                previous
            }
            None => entry,
        };
        Self::write(&mut tx, &created).await?;
        tx.commit().await.map_err(db_error)?;

        tracing::debug!(
            session_id = %created.session_id,
            user_id = %created.user_id,
            queue_number = created.queue_number,
            "Ledger entry written"
        );
        Ok(EnqueueOutcome::Created(created))
    }

    async fn next_number_inner(&self, session: SessionId) -> LedgerResult<i64> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        Self::lock_session(&mut tx, session).await?;
        let next = Self::max_number(&mut tx, session).await? + 1;
        tx.commit().await.map_err(db_error)?;
        Ok(next)
    }

    async fn activate_locked(
        conn: &mut PgConnection,
        session: SessionId,
        user: UserId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        limit: u32,
    ) -> LedgerResult<ActivateOutcome> {
        if Self::active_count(conn, session).await? >= i64::from(limit) {
            return Ok(ActivateOutcome::NoCapacity);
        }
        match Self::find_for_update(conn, session, user).await? {
            Some(mut entry) if entry.status == QueueStatus::Waiting => {
                entry.activate(now, expires_at)?;
                Self::write(conn, &entry).await?;
                Ok(ActivateOutcome::Activated(entry))
            }
            _ => Ok(ActivateOutcome::NotWaiting),
        }
    }

    async fn activate_inner(
        &self,
        session: SessionId,
        user: UserId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        limit: u32,
    ) -> LedgerResult<ActivateOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        Self::lock_session(&mut tx, session).await?;
        let outcome = Self::activate_locked(&mut tx, session, user, now, expires_at, limit).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(outcome)
    }

    async fn promote_inner(
        &self,
        session: SessionId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        limit: u32,
        order: PromotionOrder,
    ) -> LedgerResult<Vec<QueueEntry>> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        Self::lock_session(&mut tx, session).await?;

        let free = i64::from(limit) - Self::active_count(&mut tx, session).await?;
        if free <= 0 {
            return Ok(Vec::new());
        }

        let order_by = match order {
            PromotionOrder::Fifo => "queue_number",
            PromotionOrder::PriorityThenFifo => "priority_score DESC, queue_number",
        };
        let rows: Vec<EntryRow> = sqlx::query_as(&format!(
            "UPDATE waiting_room_entries SET status = 'active', activated_at = $2, expires_at = $3 \
             WHERE session_id = $1 AND user_id IN ( \
                 SELECT user_id FROM waiting_room_entries \
                 WHERE session_id = $1 AND status = 'waiting' \
                 ORDER BY {order_by} LIMIT $4 FOR UPDATE \
             ) RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(session.as_uuid())
        .bind(now)
        .bind(expires_at)
        .bind(free)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;

        let mut promoted = entries(rows)?;
        promoted.sort_by_key(|e| order.score(e.queue_number, e.priority_score));
        Ok(promoted)
    }

    async fn transition_inner(
        &self,
        session: SessionId,
        user: UserId,
        to: QueueStatus,
        now: DateTime<Utc>,
    ) -> LedgerResult<QueueEntry> {
        if to == QueueStatus::Active {
            return Err(StoreError::Conflict("activation goes through activate".to_string()));
        }
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let mut entry = Self::find_for_update(&mut tx, session, user)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("queue entry {session}/{user}")))?;
        entry.transition(to, now)?;
        Self::write(&mut tx, &entry).await?;
        tx.commit().await.map_err(db_error)?;
        Ok(entry)
    }

    async fn expire_lapsed_inner(&self, now: DateTime<Utc>) -> LedgerResult<Vec<QueueEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(&format!(
            "UPDATE waiting_room_entries SET status = 'expired', completed_at = $1 \
             WHERE status = 'active' AND expires_at <= $1 RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        entries(rows)
    }

    async fn expire_session_inner(
        &self,
        session: SessionId,
        now: DateTime<Utc>,
    ) -> LedgerResult<Vec<QueueEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(&format!(
            "UPDATE waiting_room_entries SET status = 'expired', completed_at = $1 \
             WHERE session_id = $2 AND status IN ('waiting', 'active') RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(now)
        .bind(session.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        entries(rows)
    }
}

impl QueueLedger for PostgresLedger {
    fn find(&self, session: SessionId, user: UserId) -> BoxFuture<'_, LedgerResult<Option<QueueEntry>>> {
        Box::pin(async move {
            let row: Option<EntryRow> = sqlx::query_as(&format!(
                "SELECT {ENTRY_COLUMNS} FROM waiting_room_entries WHERE session_id = $1 AND user_id = $2"
            ))
            .bind(session.as_uuid())
            .bind(user.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
            row.map(QueueEntry::try_from).transpose()
        })
    }

    fn enqueue(&self, entry: QueueEntry, max_capacity: u32) -> BoxFuture<'_, LedgerResult<EnqueueOutcome>> {
        Box::pin(self.enqueue_inner(entry, max_capacity))
    }

    fn next_queue_number(&self, session: SessionId) -> BoxFuture<'_, LedgerResult<i64>> {
        Box::pin(self.next_number_inner(session))
    }

    fn activate(
        &self,
        session: SessionId,
        user: UserId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        limit: u32,
    ) -> BoxFuture<'_, LedgerResult<ActivateOutcome>> {
        Box::pin(self.activate_inner(session, user, now, expires_at, limit))
    }

    fn promote_waiting(
        &self,
        session: SessionId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        limit: u32,
        order: PromotionOrder,
    ) -> BoxFuture<'_, LedgerResult<Vec<QueueEntry>>> {
        Box::pin(self.promote_inner(session, now, expires_at, limit, order))
    }

    fn transition(
        &self,
        session: SessionId,
        user: UserId,
        to: QueueStatus,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, LedgerResult<QueueEntry>> {
        Box::pin(self.transition_inner(session, user, to, now))
    }

    fn touch_heartbeat(
        &self,
        session: SessionId,
        user: UserId,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, LedgerResult<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE waiting_room_entries SET last_heartbeat = $3 \
                 WHERE session_id = $1 AND user_id = $2 AND status = 'active' AND expires_at > $3",
            )
            .bind(session.as_uuid())
            .bind(user.as_uuid())
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn counts(&self, session: SessionId) -> BoxFuture<'_, LedgerResult<StatusCounts>> {
        Box::pin(async move {
            let rows: Vec<(String, i64)> = sqlx::query_as(
                "SELECT status, COUNT(*) FROM waiting_room_entries WHERE session_id = $1 GROUP BY status",
            )
            .bind(session.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

            let mut counts = StatusCounts::default();
            for (status, n) in rows {
                let n = u64::try_from(n).unwrap_or(0);
                match status.parse::<QueueStatus>() {
                    Ok(QueueStatus::Waiting) => counts.waiting = n,
                    Ok(QueueStatus::Active) => counts.active = n,
                    Ok(QueueStatus::Completed) => counts.completed = n,
                    Ok(QueueStatus::Expired) => counts.expired = n,
                    Ok(QueueStatus::Cancelled) => counts.cancelled = n,
                    Err(_) => {
                        return Err(StoreError::Serialization(format!("invalid queue status: {status}")));
                    }
                }
            }
            Ok(counts)
        })
    }

    fn waiting_entries(&self, session: SessionId) -> BoxFuture<'_, LedgerResult<Vec<QueueEntry>>> {
        Box::pin(async move {
            let rows: Vec<EntryRow> = sqlx::query_as(&format!(
                "SELECT {ENTRY_COLUMNS} FROM waiting_room_entries \
                 WHERE session_id = $1 AND status = 'waiting' ORDER BY queue_number"
            ))
            .bind(session.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
            entries(rows)
        })
    }

    fn expire_lapsed(&self, now: DateTime<Utc>) -> BoxFuture<'_, LedgerResult<Vec<QueueEntry>>> {
        Box::pin(self.expire_lapsed_inner(now))
    }

    fn expire_session(
        &self,
        session: SessionId,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, LedgerResult<Vec<QueueEntry>>> {
        Box::pin(self.expire_session_inner(session, now))
    }

    fn average_wait_seconds(&self, session: SessionId) -> BoxFuture<'_, LedgerResult<Option<f64>>> {
        Box::pin(async move {
            let (avg,): (Option<f64>,) = sqlx::query_as(
                "SELECT AVG(EXTRACT(EPOCH FROM (activated_at - entered_at)))::float8 \
                 FROM waiting_room_entries WHERE session_id = $1 AND activated_at IS NOT NULL",
            )
            .bind(session.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
            Ok(avg)
        })
    }

    fn live_sessions(&self) -> BoxFuture<'_, LedgerResult<Vec<SessionId>>> {
        Box::pin(async move {
            let rows: Vec<(uuid::Uuid,)> = sqlx::query_as(
                "SELECT DISTINCT session_id FROM waiting_room_entries \
                 WHERE status IN ('waiting', 'active') ORDER BY session_id",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
            Ok(rows.into_iter().map(|(id,)| SessionId::from_uuid(id)).collect())
        })
    }

    fn ping(&self) -> BoxFuture<'_, LedgerResult<()>> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
            Ok(())
        })
    }
}
