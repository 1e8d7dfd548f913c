//! In-memory catalog and order store.

use crate::{Switch, ready};
use chrono::{DateTime, Utc};
use fairsale_core::BoxFuture;
use fairsale_core::catalog::{SaleSession, TicketType};
use fairsale_core::coupon::{Coupon, CouponRejection, CouponUsage};
use fairsale_core::error::{CommitError, StoreError};
use fairsale_core::ids::{CouponId, OrderId, SessionId, TicketTypeId, UserId};
use fairsale_core::order::{Order, OrderStatus, PaymentOutcome};
use fairsale_core::store::{Catalog, OrderStore, ReservationPlan};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    sessions: HashMap<SessionId, SaleSession>,
    ticket_types: HashMap<TicketTypeId, TicketType>,
    coupons: HashMap<CouponId, Coupon>,
    coupon_usages: Vec<CouponUsage>,
    orders: HashMap<OrderId, Order>,
    ticket_codes: HashSet<String>,
}

impl State {
    fn restore_inventory(&mut self, order: &Order) {
        for item in &order.items {
            if let Some(tt) = self.ticket_types.get_mut(&item.ticket_type_id) {
                tt.sold_quantity = tt.sold_quantity.saturating_sub(item.quantity);
            }
        }
    }

    fn usage_count(&self, coupon: CouponId, user: UserId) -> u32 {
        let count = self
            .coupon_usages
            .iter()
            .filter(|u| u.coupon_id == coupon && u.user_id == user)
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    fn commit(&mut self, plan: &ReservationPlan) -> Result<(), CommitError> {
        let order = &plan.order;

        for item in &order.items {
            let tt = self.ticket_types.get(&item.ticket_type_id).ok_or_else(|| {
                StoreError::NotFound(format!("ticket type {}", item.ticket_type_id))
            })?;
            if item.quantity > tt.remaining() {
                return Err(CommitError::InventoryUnavailable {
                    ticket_type_id: tt.id,
                    requested: item.quantity,
                    remaining: tt.remaining(),
                });
            }
        }

        if let Some(usage) = &plan.coupon_usage {
            let coupon = self
                .coupons
                .get(&usage.coupon_id)
                .ok_or(CommitError::Coupon(CouponRejection::NotFound))?;
            plan.recheck_coupon(coupon, self.usage_count(usage.coupon_id, usage.user_id))
                .map_err(CommitError::Coupon)?;
        }

        let mut batch = HashSet::new();
        for ticket in &order.tickets {
            if self.ticket_codes.contains(&ticket.code) || !batch.insert(ticket.code.as_str()) {
                return Err(CommitError::DuplicateTicketCode);
            }
        }

        // validated; apply
        for item in &order.items {
            if let Some(tt) = self.ticket_types.get_mut(&item.ticket_type_id) {
                tt.sold_quantity += item.quantity;
            }
        }
        if let Some(usage) = &plan.coupon_usage {
            if let Some(coupon) = self.coupons.get_mut(&usage.coupon_id) {
                coupon.used_count += 1;
            }
            self.coupon_usages.push(usage.clone());
        }
        self.ticket_codes
            .extend(order.tickets.iter().map(|t| t.code.clone()));
        self.orders.insert(order.id, order.clone());
        Ok(())
    }
}

/// Catalog and order store kept in process memory.
///
/// Every operation runs under one mutex, so the commit is atomic in the same way a
/// database transaction with row locks is.
#[derive(Debug, Clone, Default)]
pub struct InMemorySaleStore {
    state: Arc<Mutex<State>>,
    available: Switch,
}

impl InMemorySaleStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.is_on() {
            Ok(())
        } else {
            Err(StoreError::Unavailable("sale store switched off".to_string()))
        }
    }

    /// Simulates an outage.
    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    /// Adds or replaces a session.
    pub fn put_session(&self, session: SaleSession) {
        self.lock().sessions.insert(session.id, session);
    }

    /// Adds or replaces a ticket type.
    pub fn put_ticket_type(&self, ticket_type: TicketType) {
        self.lock().ticket_types.insert(ticket_type.id, ticket_type);
    }

    /// Adds or replaces a coupon.
    pub fn put_coupon(&self, coupon: Coupon) {
        self.lock().coupons.insert(coupon.id, coupon);
    }

    /// Current state of a ticket type.
    #[must_use]
    pub fn ticket_type(&self, id: TicketTypeId) -> Option<TicketType> {
        self.lock().ticket_types.get(&id).cloned()
    }

    /// Current state of a coupon.
    #[must_use]
    pub fn coupon(&self, id: CouponId) -> Option<Coupon> {
        self.lock().coupons.get(&id).cloned()
    }

    /// Every coupon redemption recorded.
    #[must_use]
    pub fn coupon_usages(&self) -> Vec<CouponUsage> {
        self.lock().coupon_usages.clone()
    }

    /// Every order.
    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.lock().orders.values().cloned().collect()
    }

    /// Overwrites the reservation deadline of an order.
    pub fn set_reserved_until(&self, order: OrderId, reserved_until: DateTime<Utc>) {
        if let Some(order) = self.lock().orders.get_mut(&order) {
            order.reserved_until = reserved_until;
        }
    }
}

impl Catalog for InMemorySaleStore {
    fn session(&self, session: SessionId) -> BoxFuture<'_, Result<Option<SaleSession>, StoreError>> {
        ready(self.check().map(|()| self.lock().sessions.get(&session).cloned()))
    }

    fn ticket_types(&self, session: SessionId) -> BoxFuture<'_, Result<Vec<TicketType>, StoreError>> {
        ready(self.check().map(|()| {
            self.lock()
                .ticket_types
                .values()
                .filter(|tt| tt.session_id == session)
                .cloned()
                .collect()
        }))
    }
}

impl OrderStore for InMemorySaleStore {
    fn find_pending_order(
        &self,
        user: UserId,
        session: SessionId,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Option<OrderId>, StoreError>> {
        ready(self.check().map(|()| {
            self.lock()
                .orders
                .values()
                .find(|o| o.user_id == user && o.session_id == session && o.is_reservation_live(now))
                .map(|o| o.id)
        }))
    }

    fn find_coupon<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<Option<Coupon>, StoreError>> {
        ready(self.check().map(|()| {
            self.lock()
                .coupons
                .values()
                .find(|c| c.code.eq_ignore_ascii_case(code))
                .cloned()
        }))
    }

    fn coupon_usage_count(&self, coupon: CouponId, user: UserId) -> BoxFuture<'_, Result<u32, StoreError>> {
        ready(self.check().map(|()| self.lock().usage_count(coupon, user)))
    }

    fn commit_reservation<'a>(&'a self, plan: &'a ReservationPlan) -> BoxFuture<'a, Result<(), CommitError>> {
        ready(self.check().map_err(CommitError::from).and_then(|()| self.lock().commit(plan)))
    }

    fn get_order(&self, order: OrderId) -> BoxFuture<'_, Result<Option<Order>, StoreError>> {
        ready(self.check().map(|()| self.lock().orders.get(&order).cloned()))
    }

    fn claim_payment(&self, order: OrderId, now: DateTime<Utc>) -> BoxFuture<'_, Result<Order, StoreError>> {
        ready(self.check().and_then(|()| {
            let mut state = self.lock();
            let claimed = state
                .orders
                .get_mut(&order)
                .ok_or_else(|| StoreError::NotFound(format!("order {order}")))?;
            if claimed.status != OrderStatus::Pending {
                return Err(StoreError::Conflict(format!("order {order} is {}", claimed.status)));
            }
            if claimed.reserved_until <= now {
                return Err(StoreError::Conflict(format!("reservation of order {order} has ended")));
            }
            claimed.status = OrderStatus::Processing;
            Ok(claimed.clone())
        }))
    }

    fn release_payment_claim(&self, order: OrderId) -> BoxFuture<'_, Result<(), StoreError>> {
        ready(self.check().and_then(|()| {
            let mut state = self.lock();
            let claimed = state
                .orders
                .get_mut(&order)
                .ok_or_else(|| StoreError::NotFound(format!("order {order}")))?;
            if claimed.status != OrderStatus::Processing {
                return Err(StoreError::Conflict(format!("order {order} is {}", claimed.status)));
            }
            claimed.status = OrderStatus::Pending;
            Ok(())
        }))
    }

    fn finalize_payment<'a>(
        &'a self,
        order: OrderId,
        outcome: &'a PaymentOutcome,
        now: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<Order, StoreError>> {
        ready(self.check().and_then(|()| {
            let mut state = self.lock();
            let mut updated = state
                .orders
                .get(&order)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("order {order}")))?;
            if updated.status != OrderStatus::Processing {
                return Err(StoreError::Conflict(format!(
                    "order {order} is {}",
                    updated.status
                )));
            }
            match outcome {
                PaymentOutcome::Succeeded { transaction_id } => {
                    updated.status = OrderStatus::Paid;
                    updated.paid_at = Some(now);
                    updated.payment_transaction_id = Some(transaction_id.clone());
                }
                PaymentOutcome::Failed { .. } => {
                    updated.status = OrderStatus::Failed;
                    updated.cancelled_at = Some(now);
                    updated.cancel_tickets();
                    state.restore_inventory(&updated);
                }
            }
            state.orders.insert(order, updated.clone());
            Ok(updated)
        }))
    }

    fn expire_pending(&self, now: DateTime<Utc>) -> BoxFuture<'_, Result<Vec<Order>, StoreError>> {
        ready(self.check().map(|()| {
            let mut state = self.lock();
            let lapsed: Vec<OrderId> = state
                .orders
                .values()
                .filter(|o| o.status == OrderStatus::Pending && o.reserved_until <= now)
                .map(|o| o.id)
                .collect();

            let mut cancelled = Vec::with_capacity(lapsed.len());
            for id in lapsed {
                let Some(mut order) = state.orders.get(&id).cloned() else {
                    continue;
                };
                order.status = OrderStatus::Cancelled;
                order.cancelled_at = Some(now);
                order.cancel_tickets();
                state.restore_inventory(&order);
                state.orders.insert(id, order.clone());
                cancelled.push(order);
            }
            cancelled
        }))
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        ready(self.check())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::test_epoch;
    use chrono::Duration;
    use fairsale_core::coupon::CouponDiscount;
    use fairsale_core::ids::EventId;
    use fairsale_core::order::CustomerInfo;
    use fairsale_core::pricing::PriceBreakdown;
    use fairsale_core::{MembershipTier, Money};

    fn coupon() -> Coupon {
        Coupon {
            id: CouponId::new(),
            code: "LATE".to_string(),
            discount: CouponDiscount::Percentage(10),
            max_discount: None,
            min_order_amount: None,
            usage_limit: None,
            per_user_limit: None,
            used_count: 0,
            allowed_tiers: Vec::new(),
            valid_from: None,
            valid_until: None,
            is_active: true,
        }
    }

    fn plan(coupon: &Coupon, tier: MembershipTier) -> ReservationPlan {
        let now = test_epoch();
        let order = Order {
            id: OrderId::new(),
            user_id: UserId::new(),
            event_id: EventId::new(),
            session_id: SessionId::new(),
            status: OrderStatus::Pending,
            pricing: PriceBreakdown {
                subtotal: Money::from_cents(10_000),
                ..PriceBreakdown::default()
            },
            coupon_id: Some(coupon.id),
            customer: CustomerInfo {
                name: "Buyer".to_string(),
                email: "buyer@example.com".to_string(),
                phone: None,
            },
            items: Vec::new(),
            tickets: Vec::new(),
            reserved_until: now + Duration::minutes(15),
            created_at: now,
            paid_at: None,
            payment_transaction_id: None,
            cancelled_at: None,
        };
        ReservationPlan {
            coupon_usage: Some(CouponUsage {
                coupon_id: coupon.id,
                user_id: order.user_id,
                order_id: order.id,
                discount_amount: Money::from_cents(1_000),
                used_at: now,
            }),
            order,
            buyer_tier: tier,
        }
    }

    #[tokio::test]
    async fn commit_revalidates_a_coupon_changed_after_quoting() {
        let store = InMemorySaleStore::new();
        let mut stored = coupon();
        store.put_coupon(stored.clone());
        let quoted = plan(&stored, MembershipTier::Basic);

        stored.is_active = false;
        store.put_coupon(stored.clone());
        assert!(matches!(
            store.commit_reservation(&quoted).await,
            Err(CommitError::Coupon(CouponRejection::Inactive))
        ));

        stored.is_active = true;
        stored.valid_until = Some(test_epoch() - Duration::minutes(1));
        store.put_coupon(stored.clone());
        assert!(matches!(
            store.commit_reservation(&quoted).await,
            Err(CommitError::Coupon(CouponRejection::Expired { .. }))
        ));

        stored.valid_until = None;
        stored.allowed_tiers = vec![MembershipTier::Premium];
        store.put_coupon(stored.clone());
        assert!(matches!(
            store.commit_reservation(&quoted).await,
            Err(CommitError::Coupon(CouponRejection::TierIneligible { .. }))
        ));
        assert!(store.orders().is_empty());
        assert!(store.coupon_usages().is_empty());

        stored.allowed_tiers.clear();
        store.put_coupon(stored.clone());
        store.commit_reservation(&quoted).await.unwrap();
        assert_eq!(store.coupon(stored.id).unwrap().used_count, 1);
    }
}
