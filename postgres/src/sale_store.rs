//! Catalog reads and the transactional order store.

use crate::convert::{
    CouponRow, ItemRow, OrderRow, SessionRow, TicketRow, TicketTypeRow, cents, count, discount_columns,
    int, order as order_from_rows,
};
use crate::{LOCK_NOT_AVAILABLE, UNIQUE_VIOLATION, db_error, sql_state};
use chrono::{DateTime, Utc};
use fairsale_core::BoxFuture;
use fairsale_core::catalog::{SaleSession, TicketType};
use fairsale_core::coupon::{Coupon, CouponRejection};
use fairsale_core::error::{CommitError, StoreError};
use fairsale_core::ids::{CouponId, OrderId, SessionId, TicketTypeId, UserId};
use fairsale_core::order::{Order, OrderStatus, PaymentOutcome};
use fairsale_core::store::{Catalog, OrderStore, ReservationPlan};
use sqlx::{PgConnection, PgPool};
use std::collections::BTreeMap;

const ORDER_COLUMNS: &str = "id, user_id, event_id, session_id, status, subtotal_cents, \
    membership_discount_cents, coupon_discount_cents, vat_cents, total_cents, coupon_id, \
    customer_name, customer_email, customer_phone, reserved_until, created_at, paid_at, \
    payment_transaction_id, cancelled_at";

const COUPON_COLUMNS: &str = "id, code, discount_kind, discount_value, max_discount_cents, \
    min_order_cents, usage_limit, per_user_limit, used_count, allowed_tiers, valid_from, \
    valid_until, is_active";

const TICKET_TYPE_COLUMNS: &str = "id, session_id, name, price_cents, total_quantity, sold_quantity, \
    sale_start_time, sale_end_time, premium_early_access_minutes, min_per_order, max_per_order";

/// `PostgreSQL` catalog and order store.
///
/// A reservation commit is one transaction: inventory rows are locked with
/// `FOR UPDATE NOWAIT` in ticket-type order, re-checked, and written together with the
/// order, its items, its tickets and any coupon usage.
#[derive(Clone, Debug)]
pub struct PostgresSaleStore {
    pool: PgPool,
}

impl PostgresSaleStore {
    /// Creates a store over `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or replaces a sale session. Used by seeding and tests; the catalog is
    /// otherwise maintained by the event administration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    pub async fn upsert_session(&self, session: &SaleSession) -> Result<(), StoreError> {
        let config = session.waiting_room;
        sqlx::query(
            r"
            INSERT INTO sale_sessions (
                id, event_id, waiting_room_enabled, max_capacity,
                concurrent_purchase_limit, queue_timeout_minutes, sale_closes_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                event_id = EXCLUDED.event_id,
                waiting_room_enabled = EXCLUDED.waiting_room_enabled,
                max_capacity = EXCLUDED.max_capacity,
                concurrent_purchase_limit = EXCLUDED.concurrent_purchase_limit,
                queue_timeout_minutes = EXCLUDED.queue_timeout_minutes,
                sale_closes_at = EXCLUDED.sale_closes_at
            ",
        )
        .bind(session.id.as_uuid())
        .bind(session.event_id.as_uuid())
        .bind(config.is_some_and(|c| c.is_enabled))
        .bind(config.map(|c| int(c.max_capacity)))
        .bind(config.map(|c| int(c.concurrent_purchase_limit)))
        .bind(config.map(|c| int(c.queue_timeout_minutes)))
        .bind(session.sale_closes_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    /// Inserts or replaces a ticket type.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    pub async fn upsert_ticket_type(&self, ticket_type: &TicketType) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO ticket_types (
                id, session_id, name, price_cents, total_quantity, sold_quantity,
                sale_start_time, sale_end_time, premium_early_access_minutes,
                min_per_order, max_per_order
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                price_cents = EXCLUDED.price_cents,
                total_quantity = EXCLUDED.total_quantity,
                sold_quantity = EXCLUDED.sold_quantity,
                sale_start_time = EXCLUDED.sale_start_time,
                sale_end_time = EXCLUDED.sale_end_time,
                premium_early_access_minutes = EXCLUDED.premium_early_access_minutes,
                min_per_order = EXCLUDED.min_per_order,
                max_per_order = EXCLUDED.max_per_order
            ",
        )
        .bind(ticket_type.id.as_uuid())
        .bind(ticket_type.session_id.as_uuid())
        .bind(&ticket_type.name)
        .bind(cents(ticket_type.price))
        .bind(int(ticket_type.total_quantity))
        .bind(int(ticket_type.sold_quantity))
        .bind(ticket_type.sale_start_time)
        .bind(ticket_type.sale_end_time)
        .bind(int(ticket_type.premium_early_access_minutes))
        .bind(int(ticket_type.min_per_order))
        .bind(int(ticket_type.max_per_order))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    /// Inserts or replaces a coupon.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    pub async fn upsert_coupon(&self, coupon: &Coupon) -> Result<(), StoreError> {
        let (kind, value) = discount_columns(coupon.discount);
        let tiers: Vec<&str> = coupon.allowed_tiers.iter().map(|t| t.as_str()).collect();
        sqlx::query(
            r"
            INSERT INTO coupons (
                id, code, discount_kind, discount_value, max_discount_cents, min_order_cents,
                usage_limit, per_user_limit, used_count, allowed_tiers, valid_from,
                valid_until, is_active
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                code = EXCLUDED.code,
                discount_kind = EXCLUDED.discount_kind,
                discount_value = EXCLUDED.discount_value,
                max_discount_cents = EXCLUDED.max_discount_cents,
                min_order_cents = EXCLUDED.min_order_cents,
                usage_limit = EXCLUDED.usage_limit,
                per_user_limit = EXCLUDED.per_user_limit,
                used_count = EXCLUDED.used_count,
                allowed_tiers = EXCLUDED.allowed_tiers,
                valid_from = EXCLUDED.valid_from,
                valid_until = EXCLUDED.valid_until,
                is_active = EXCLUDED.is_active
            ",
        )
        .bind(coupon.id.as_uuid())
        .bind(&coupon.code)
        .bind(kind)
        .bind(value)
        .bind(coupon.max_discount.map(cents))
        .bind(coupon.min_order_amount.map(cents))
        .bind(coupon.usage_limit.map(int))
        .bind(coupon.per_user_limit.map(int))
        .bind(int(coupon.used_count))
        .bind(tiers)
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.is_active)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn load_order(conn: &mut PgConnection, id: OrderId) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&mut *conn)
                .await
                .map_err(db_error)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let items: Vec<ItemRow> = sqlx::query_as(
            "SELECT id, ticket_type_id, quantity, unit_price_cents FROM order_items \
             WHERE order_id = $1 ORDER BY id",
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error)?;

        let tickets: Vec<TicketRow> = sqlx::query_as(
            "SELECT t.id, t.order_item_id, t.ticket_type_id, t.code, t.status \
             FROM tickets t JOIN order_items i ON i.id = t.order_item_id \
             WHERE i.order_id = $1 ORDER BY t.code",
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error)?;

        order_from_rows(row, items, tickets).map(Some)
    }

    /// Cancels tickets and gives inventory back for one order.
    async fn release_inventory(conn: &mut PgConnection, id: OrderId) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE tickets SET status = 'cancelled' \
             WHERE order_item_id IN (SELECT id FROM order_items WHERE order_id = $1)",
        )
        .bind(id.as_uuid())
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;

        sqlx::query(
            r"
            UPDATE ticket_types t
            SET sold_quantity = t.sold_quantity - s.quantity
            FROM (
                SELECT ticket_type_id, SUM(quantity)::int AS quantity
                FROM order_items WHERE order_id = $1
                GROUP BY ticket_type_id
            ) s
            WHERE t.id = s.ticket_type_id
            ",
        )
        .bind(id.as_uuid())
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn lock_inventory(
        conn: &mut PgConnection,
        plan: &ReservationPlan,
    ) -> Result<(), CommitError> {
        let mut requested: BTreeMap<TicketTypeId, u32> = BTreeMap::new();
        for item in &plan.order.items {
            *requested.entry(item.ticket_type_id).or_default() += item.quantity;
        }

        // ticket-type order keeps concurrent commits from deadlocking
        for (ticket_type_id, quantity) in requested {
            let row: Option<(i32, i32)> = sqlx::query_as(
                "SELECT total_quantity, sold_quantity FROM ticket_types WHERE id = $1 FOR UPDATE NOWAIT",
            )
            .bind(ticket_type_id.as_uuid())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| {
                if sql_state(&e).as_deref() == Some(LOCK_NOT_AVAILABLE) {
                    CommitError::RowLocked
                } else {
                    CommitError::Store(db_error(e))
                }
            })?;
            let (total, sold) = row
                .ok_or_else(|| StoreError::NotFound(format!("ticket type {ticket_type_id}")))?;
            let remaining = count(total)?.saturating_sub(count(sold)?);
            if quantity > remaining {
                return Err(CommitError::InventoryUnavailable {
                    ticket_type_id,
                    requested: quantity,
                    remaining,
                });
            }

            sqlx::query("UPDATE ticket_types SET sold_quantity = sold_quantity + $2 WHERE id = $1")
                .bind(ticket_type_id.as_uuid())
                .bind(int(quantity))
                .execute(&mut *conn)
                .await
                .map_err(db_error)?;
        }
        Ok(())
    }

    async fn recheck_coupon(conn: &mut PgConnection, plan: &ReservationPlan) -> Result<(), CommitError> {
        let Some(usage) = &plan.coupon_usage else {
            return Ok(());
        };
        let row: Option<CouponRow> =
            sqlx::query_as(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE id = $1 FOR UPDATE"))
                .bind(usage.coupon_id.as_uuid())
                .fetch_optional(&mut *conn)
                .await
                .map_err(db_error)?;
        let coupon = Coupon::try_from(row.ok_or(CommitError::Coupon(CouponRejection::NotFound))?)?;

        let (used,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = $1 AND user_id = $2")
                .bind(usage.coupon_id.as_uuid())
                .bind(usage.user_id.as_uuid())
                .fetch_one(&mut *conn)
                .await
                .map_err(db_error)?;
        plan.recheck_coupon(&coupon, u32::try_from(used).unwrap_or(u32::MAX))
            .map_err(CommitError::Coupon)?;

        sqlx::query(
            "INSERT INTO coupon_usages (coupon_id, user_id, order_id, discount_cents, used_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(usage.coupon_id.as_uuid())
        .bind(usage.user_id.as_uuid())
        .bind(usage.order_id.as_uuid())
        .bind(cents(usage.discount_amount))
        .bind(usage.used_at)
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;

        sqlx::query("UPDATE coupons SET used_count = used_count + 1 WHERE id = $1")
            .bind(usage.coupon_id.as_uuid())
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn insert_order(conn: &mut PgConnection, order: &Order) -> Result<(), CommitError> {
        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)"
        ))
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.event_id.as_uuid())
        .bind(order.session_id.as_uuid())
        .bind(order.status.as_str())
        .bind(cents(order.pricing.subtotal))
        .bind(cents(order.pricing.membership_discount))
        .bind(cents(order.pricing.coupon_discount))
        .bind(cents(order.pricing.vat))
        .bind(cents(order.pricing.total))
        .bind(order.coupon_id.map(|id| *id.as_uuid()))
        .bind(&order.customer.name)
        .bind(&order.customer.email)
        .bind(&order.customer.phone)
        .bind(order.reserved_until)
        .bind(order.created_at)
        .bind(order.paid_at)
        .bind(&order.payment_transaction_id)
        .bind(order.cancelled_at)
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, ticket_type_id, quantity, unit_price_cents) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(item.id.as_uuid())
            .bind(order.id.as_uuid())
            .bind(item.ticket_type_id.as_uuid())
            .bind(int(item.quantity))
            .bind(cents(item.unit_price))
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
        }

        for ticket in &order.tickets {
            sqlx::query(
                "INSERT INTO tickets (id, order_item_id, ticket_type_id, code, status) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(ticket.id.as_uuid())
            .bind(ticket.order_item_id.as_uuid())
            .bind(ticket.ticket_type_id.as_uuid())
            .bind(&ticket.code)
            .bind(ticket.status.as_str())
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                if sql_state(&e).as_deref() == Some(UNIQUE_VIOLATION) {
                    CommitError::DuplicateTicketCode
                } else {
                    CommitError::Store(db_error(e))
                }
            })?;
        }
        Ok(())
    }

    async fn commit_inner(&self, plan: &ReservationPlan) -> Result<(), CommitError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        Self::lock_inventory(&mut tx, plan).await?;
        Self::insert_order(&mut tx, &plan.order).await?;
        Self::recheck_coupon(&mut tx, plan).await?;
        tx.commit().await.map_err(db_error)?;

        metrics::counter!("fairsale_orders_committed_total").increment(1);
        tracing::debug!(
            order_id = %plan.order.id,
            tickets = plan.order.tickets.len(),
            "Reservation committed"
        );
        Ok(())
    }

    async fn finalize_inner(
        &self,
        id: OrderId,
        outcome: &PaymentOutcome,
        now: DateTime<Utc>,
    ) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let status: Option<(String,)> =
            sqlx::query_as("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error)?;
        let (status,) = status.ok_or_else(|| StoreError::NotFound(format!("order {id}")))?;
        if status != OrderStatus::Processing.as_str() {
            return Err(StoreError::Conflict(format!("order {id} is {status}")));
        }

        match outcome {
            PaymentOutcome::Succeeded { transaction_id } => {
                sqlx::query(
                    "UPDATE orders SET status = 'paid', paid_at = $2, payment_transaction_id = $3 \
                     WHERE id = $1",
                )
                .bind(id.as_uuid())
                .bind(now)
                .bind(transaction_id)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
            }
            PaymentOutcome::Failed { .. } => {
                sqlx::query("UPDATE orders SET status = 'failed', cancelled_at = $2 WHERE id = $1")
                    .bind(id.as_uuid())
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error)?;
                Self::release_inventory(&mut tx, id).await?;
            }
        }

        let order = Self::load_order(&mut tx, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("order {id}")))?;
        tx.commit().await.map_err(db_error)?;
        Ok(order)
    }

    async fn claim_inner(&self, id: OrderId, now: DateTime<Utc>) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let claimed = sqlx::query(
            "UPDATE orders SET status = 'processing' \
             WHERE id = $1 AND status = 'pending' AND reserved_until > $2",
        )
        .bind(id.as_uuid())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        let order = Self::load_order(&mut tx, id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("order {id}")))?;
        if claimed.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "order {id} is {} until {}",
                order.status, order.reserved_until
            )));
        }
        tx.commit().await.map_err(db_error)?;
        Ok(order)
    }

    async fn release_claim_inner(&self, id: OrderId) -> Result<(), StoreError> {
        let released = sqlx::query("UPDATE orders SET status = 'pending' WHERE id = $1 AND status = 'processing'")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if released.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!("order {id} is not processing")));
        }
        Ok(())
    }

    async fn expire_inner(&self, now: DateTime<Utc>) -> Result<Vec<Order>, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let ids: Vec<(uuid::Uuid,)> = sqlx::query_as(
            "SELECT id FROM orders WHERE status = 'pending' AND reserved_until <= $1 \
             ORDER BY reserved_until FOR UPDATE SKIP LOCKED",
        )
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error)?;

        let mut cancelled = Vec::with_capacity(ids.len());
        for (id,) in ids {
            let id = OrderId::from_uuid(id);
            sqlx::query("UPDATE orders SET status = 'cancelled', cancelled_at = $2 WHERE id = $1")
                .bind(id.as_uuid())
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
            Self::release_inventory(&mut tx, id).await?;
            if let Some(order) = Self::load_order(&mut tx, id).await? {
                cancelled.push(order);
            }
        }
        tx.commit().await.map_err(db_error)?;
        Ok(cancelled)
    }
}

impl Catalog for PostgresSaleStore {
    fn session(&self, session: SessionId) -> BoxFuture<'_, Result<Option<SaleSession>, StoreError>> {
        Box::pin(async move {
            let row: Option<SessionRow> = sqlx::query_as(
                "SELECT id, event_id, waiting_room_enabled, max_capacity, concurrent_purchase_limit, \
                 queue_timeout_minutes, sale_closes_at FROM sale_sessions WHERE id = $1",
            )
            .bind(session.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
            row.map(SaleSession::try_from).transpose()
        })
    }

    fn ticket_types(&self, session: SessionId) -> BoxFuture<'_, Result<Vec<TicketType>, StoreError>> {
        Box::pin(async move {
            let rows: Vec<TicketTypeRow> = sqlx::query_as(&format!(
                "SELECT {TICKET_TYPE_COLUMNS} FROM ticket_types WHERE session_id = $1 ORDER BY sale_start_time, id"
            ))
            .bind(session.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
            rows.into_iter().map(TicketType::try_from).collect()
        })
    }
}

impl OrderStore for PostgresSaleStore {
    fn find_pending_order(
        &self,
        user: UserId,
        session: SessionId,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Option<OrderId>, StoreError>> {
        Box::pin(async move {
            let row: Option<(uuid::Uuid,)> = sqlx::query_as(
                "SELECT id FROM orders WHERE user_id = $1 AND session_id = $2 \
                 AND (status = 'processing' OR (status = 'pending' AND reserved_until > $3)) LIMIT 1",
            )
            .bind(user.as_uuid())
            .bind(session.as_uuid())
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
            Ok(row.map(|(id,)| OrderId::from_uuid(id)))
        })
    }

    fn find_coupon<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<Option<Coupon>, StoreError>> {
        Box::pin(async move {
            let row: Option<CouponRow> = sqlx::query_as(&format!(
                "SELECT {COUPON_COLUMNS} FROM coupons WHERE lower(code) = lower($1)"
            ))
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
            row.map(Coupon::try_from).transpose()
        })
    }

    fn coupon_usage_count(&self, coupon: CouponId, user: UserId) -> BoxFuture<'_, Result<u32, StoreError>> {
        Box::pin(async move {
            let (used,): (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM coupon_usages WHERE coupon_id = $1 AND user_id = $2",
            )
            .bind(coupon.as_uuid())
            .bind(user.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
            Ok(u32::try_from(used).unwrap_or(u32::MAX))
        })
    }

    fn commit_reservation<'a>(&'a self, plan: &'a ReservationPlan) -> BoxFuture<'a, Result<(), CommitError>> {
        Box::pin(self.commit_inner(plan))
    }

    fn get_order(&self, order: OrderId) -> BoxFuture<'_, Result<Option<Order>, StoreError>> {
        Box::pin(async move {
            let mut conn = self.pool.acquire().await.map_err(db_error)?;
            Self::load_order(&mut conn, order).await
        })
    }

    fn claim_payment(&self, order: OrderId, now: DateTime<Utc>) -> BoxFuture<'_, Result<Order, StoreError>> {
        Box::pin(self.claim_inner(order, now))
    }

    fn release_payment_claim(&self, order: OrderId) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(self.release_claim_inner(order))
    }

    fn finalize_payment<'a>(
        &'a self,
        order: OrderId,
        outcome: &'a PaymentOutcome,
        now: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<Order, StoreError>> {
        Box::pin(self.finalize_inner(order, outcome, now))
    }

    fn expire_pending(&self, now: DateTime<Utc>) -> BoxFuture<'_, Result<Vec<Order>, StoreError>> {
        Box::pin(self.expire_inner(now))
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
            Ok(())
        })
    }
}
