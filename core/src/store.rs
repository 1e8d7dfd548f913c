//! Catalog and order-store seams.

use crate::catalog::{SaleSession, TicketType};
use crate::coupon::{Coupon, CouponRejection, CouponUsage};
use crate::error::{CommitError, StoreError};
use crate::ids::{CouponId, OrderId, SessionId, UserId};
use crate::membership::MembershipTier;
use crate::order::{Order, PaymentOutcome};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

/// Read access to the catalog maintained by the event administration.
pub trait Catalog: Send + Sync {
    /// Looks up a sale session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn session(&self, session: SessionId) -> BoxFuture<'_, Result<Option<SaleSession>, StoreError>>;

    /// Ticket types of a session with their current sold counts.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn ticket_types(&self, session: SessionId) -> BoxFuture<'_, Result<Vec<TicketType>, StoreError>>;
}

/// A fully built reservation ready to commit.
///
/// `order` is `pending` with its items and tickets. The commit applies, in one atomic
/// unit: order/items/tickets insert, `sold_quantity += quantity` per item, and, if
/// `coupon_usage` is present, the usage row plus the coupon's `used_count` increment.
#[derive(Clone, Debug)]
pub struct ReservationPlan {
    /// Order to insert.
    pub order: Order,
    /// Tier the buyer was priced at.
    pub buyer_tier: MembershipTier,
    /// Coupon redemption to record.
    pub coupon_usage: Option<CouponUsage>,
}

impl ReservationPlan {
    /// Re-runs full coupon validation against the coupon as currently stored, at the
    /// redemption time. Stores call this with the coupon row locked.
    ///
    /// # Errors
    ///
    /// Returns the [`CouponRejection`] if the coupon no longer applies.
    pub fn recheck_coupon(&self, coupon: &Coupon, user_usage_count: u32) -> Result<(), CouponRejection> {
        let used_at = self.coupon_usage.as_ref().map_or(self.order.created_at, |u| u.used_at);
        coupon.validate(self.buyer_tier, self.order.pricing.subtotal, user_usage_count, used_at)
    }
}

/// Orders, inventory and coupons.
pub trait OrderStore: Send + Sync {
    /// A pending order of `user` for `session` whose reservation is still live.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn find_pending_order(
        &self,
        user: UserId,
        session: SessionId,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Option<OrderId>, StoreError>>;

    /// Looks up a coupon by code.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn find_coupon<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<Option<Coupon>, StoreError>>;

    /// Redemptions of `coupon` by `user`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn coupon_usage_count(
        &self,
        coupon: CouponId,
        user: UserId,
    ) -> BoxFuture<'_, Result<u32, StoreError>>;

    /// Commits a reservation atomically, re-checking stock and coupon limits under lock.
    ///
    /// # Errors
    ///
    /// Returns [`CommitError`]; on any error nothing is written.
    fn commit_reservation<'a>(&'a self, plan: &'a ReservationPlan) -> BoxFuture<'a, Result<(), CommitError>>;

    /// Loads an order with items and tickets.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn get_order(&self, order: OrderId) -> BoxFuture<'_, Result<Option<Order>, StoreError>>;

    /// Claims a pending order for one payment attempt (`pending → processing`), provided
    /// its reservation is still live at `now`. Exactly one of several concurrent claims
    /// succeeds, and [`OrderStore::expire_pending`] skips claimed orders.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`], or [`StoreError::Conflict`] if the order is not
    /// pending or its reservation has ended.
    fn claim_payment(&self, order: OrderId, now: DateTime<Utc>) -> BoxFuture<'_, Result<Order, StoreError>>;

    /// Hands a claimed order back (`processing → pending`) after an attempt that charged
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] or [`StoreError::Conflict`] if the order is not
    /// processing.
    fn release_payment_claim(&self, order: OrderId) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Settles a claimed order.
    ///
    /// Success marks it `paid`. Failure marks it `failed`, cancels its tickets and
    /// restores inventory.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] or [`StoreError::Conflict`] if the order is not
    /// processing.
    fn finalize_payment<'a>(
        &'a self,
        order: OrderId,
        outcome: &'a PaymentOutcome,
        now: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<Order, StoreError>>;

    /// Cancels every pending order whose reservation ended at or before `now`, cancelling
    /// its tickets and restoring inventory. Returns the cancelled orders.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend fails.
    fn expire_pending(&self, now: DateTime<Utc>) -> BoxFuture<'_, Result<Vec<Order>, StoreError>>;

    /// Connectivity probe.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backend cannot be reached.
    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>>;
}
