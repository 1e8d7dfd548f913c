//! Order reservation.
//!
//! # Flow
//!
//! ```text
//! create_order(buyer, request)
//!   ├─ validate request shape, cooldown
//!   ├─ lock reserve:user:{user}:{session}        (outer, fail closed)
//!   │   └─ lock reserve:session:{session}        (inner, fail closed)
//!   │       ├─ duplicate pending order check
//!   │       ├─ slot check (ledger) or fallback window
//!   │       ├─ per ticket type: sale window, tier, quantity, stock
//!   │       ├─ pricing + coupon validation
//!   │       └─ commit_reservation (atomic, re-checks stock and coupon under row locks)
//!   ├─ release both locks
//!   └─ retire slot as completed → promote next users, set cooldown
//! ```
//!
//! Nothing is written before the commit, and the commit is all-or-nothing, so every
//! rejection leaves inventory, coupons and orders untouched.

use super::admission::AdmissionController;
use super::mirror::QueueMirror;
use crate::metrics;
use chrono::{DateTime, Utc};
use fairsale_core::catalog::{PurchaseRuleViolation, SaleSession, TicketType};
use fairsale_core::codes::CodeGenerator;
use fairsale_core::coupon::{Coupon, CouponRejection, CouponUsage};
use fairsale_core::environment::Clock;
use fairsale_core::error::{CommitError, StoreError};
use fairsale_core::ids::{EventId, OrderId, OrderItemId, SessionId, TicketId, TicketTypeId, UserId};
use fairsale_core::ledger::QueueLedger;
use fairsale_core::lock::LockError;
use fairsale_core::money::Money;
use fairsale_core::order::{CustomerInfo, Order, OrderItem, OrderStatus, Ticket, TicketStatus};
use fairsale_core::pricing::{self, PriceBreakdown};
use fairsale_core::store::{Catalog, OrderStore, ReservationPlan};
use fairsale_core::{MembershipTier, QueueStatus};
use fairsale_runtime::{DistributedLock, LockGuard};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Reservation settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReservationPolicy {
    /// Reservation window for sessions without a waiting room.
    pub fallback_window: chrono::Duration,
    /// TTL of both reservation locks.
    pub lock_ttl: Duration,
    /// Per-order maximum during premium early access.
    pub early_access_max_per_order: u32,
    /// Cooldown drawn uniformly from this range after a committed order.
    pub cooldown: RangeInclusive<Duration>,
    /// Attempts at a unique set of ticket codes.
    pub ticket_code_attempts: u32,
    /// VAT percentage.
    pub vat_percent: u32,
}

impl Default for ReservationPolicy {
    fn default() -> Self {
        Self {
            fallback_window: chrono::Duration::minutes(15),
            lock_ttl: Duration::from_secs(30),
            early_access_max_per_order: 2,
            cooldown: Duration::from_secs(30)..=Duration::from_secs(90),
            ticket_code_attempts: 3,
            vat_percent: pricing::DEFAULT_VAT_PERCENT,
        }
    }
}

/// The authenticated buyer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Buyer {
    /// User id.
    pub user_id: UserId,
    /// Membership tier.
    pub tier: MembershipTier,
}

/// One requested ticket type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketLine {
    /// Ticket type.
    pub ticket_type_id: TicketTypeId,
    /// Units.
    pub quantity: u32,
}

/// A reservation request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Event.
    pub event_id: EventId,
    /// Sale session.
    pub session_id: SessionId,
    /// Requested lines, one per ticket type.
    pub tickets: Vec<TicketLine>,
    /// Contact details.
    pub customer_info: CustomerInfo,
    /// Optional coupon code.
    #[serde(default)]
    pub coupon_code: Option<String>,
}

/// Reservation errors.
#[derive(Error, Debug)]
pub enum ReservationError {
    /// Malformed request.
    #[error("invalid order request: {0}")]
    InvalidRequest(String),

    /// No such session.
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    /// A line names a ticket type that does not belong to the session.
    #[error("ticket type {0} not found in this session")]
    UnknownTicketType(TicketTypeId),

    /// The buyer holds no active slot.
    #[error("no active purchase slot for session {session_id}; join the queue first")]
    NotAdmitted {
        /// Session.
        session_id: SessionId,
    },

    /// The buyer's slot ended.
    #[error("purchase slot expired at {expired_at}; join the queue again")]
    SlotExpired {
        /// Slot deadline.
        expired_at: DateTime<Utc>,
    },

    /// The buyer already has a live pending order for the session.
    #[error("pending order {order_id} already exists for this session")]
    DuplicatePendingOrder {
        /// Existing order.
        order_id: OrderId,
    },

    /// Too soon after the previous order.
    #[error("purchase cooldown active, retry in {retry_after_secs}s")]
    PurchaseCooldown {
        /// Seconds until the cooldown ends.
        retry_after_secs: u64,
    },

    /// Outside the ticket type's sale window.
    #[error("ticket type {ticket_type_id} is not on sale")]
    OutOfSaleWindow {
        /// Ticket type.
        ticket_type_id: TicketTypeId,
        /// Earliest purchase instant.
        opens_at: DateTime<Utc>,
        /// Sale end.
        closes_at: DateTime<Utc>,
    },

    /// Early access requires a higher tier.
    #[error("ticket type {ticket_type_id} is in early access for {required_tier} members")]
    EarlyAccessRestricted {
        /// Ticket type.
        ticket_type_id: TicketTypeId,
        /// Tier that may buy now.
        required_tier: MembershipTier,
        /// Public sale start.
        public_sale_at: DateTime<Utc>,
    },

    /// Quantity outside the per-order bounds.
    #[error("quantity {requested} for ticket type {ticket_type_id} outside {min}..={max}")]
    QuantityOutOfRange {
        /// Ticket type.
        ticket_type_id: TicketTypeId,
        /// Requested.
        requested: u32,
        /// Minimum.
        min: u32,
        /// Maximum in the current phase.
        max: u32,
    },

    /// Not enough stock.
    #[error("ticket type {ticket_type_id}: {requested} requested, {remaining} remaining")]
    InventoryUnavailable {
        /// Ticket type.
        ticket_type_id: TicketTypeId,
        /// Requested.
        requested: u32,
        /// Remaining.
        remaining: u32,
    },

    /// The coupon cannot be applied.
    #[error("coupon invalid: {0}")]
    CouponInvalid(CouponRejection),

    /// A reservation lock stayed held; retry with backoff.
    #[error("system busy, retry ({key})")]
    LockContention {
        /// Contended key.
        key: String,
    },

    /// The lock backend is down; reservations fail closed.
    #[error("reservation locks unavailable: {0}")]
    LockUnavailable(String),

    /// Every attempt at unique ticket codes collided.
    #[error("could not generate unique ticket codes after {attempts} attempts")]
    TicketCodeGeneration {
        /// Attempts made.
        attempts: u32,
    },

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReservationError {
    /// Label for the `fairsale_orders_total` counter.
    #[must_use]
    pub const fn outcome(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::UnknownTicketType(_) => "invalid_request",
            Self::SessionNotFound(_) => "session_not_found",
            Self::NotAdmitted { .. } => "not_admitted",
            Self::SlotExpired { .. } => "slot_expired",
            Self::DuplicatePendingOrder { .. } => "duplicate_pending_order",
            Self::PurchaseCooldown { .. } => "purchase_cooldown",
            Self::OutOfSaleWindow { .. } => "out_of_sale_window",
            Self::EarlyAccessRestricted { .. } => "early_access_restricted",
            Self::QuantityOutOfRange { .. } => "quantity_out_of_range",
            Self::InventoryUnavailable { .. } => "inventory_unavailable",
            Self::CouponInvalid(_) => "coupon_invalid",
            Self::LockContention { .. } | Self::LockUnavailable(_) => "lock_contention",
            Self::TicketCodeGeneration { .. } => "ticket_code_generation",
            Self::Store(_) => "store_error",
        }
    }

    fn from_rule(ticket_type_id: TicketTypeId, violation: PurchaseRuleViolation) -> Self {
        match violation {
            PurchaseRuleViolation::OutOfSaleWindow { opens_at, closes_at } => Self::OutOfSaleWindow {
                ticket_type_id,
                opens_at,
                closes_at,
            },
            PurchaseRuleViolation::EarlyAccessRestricted {
                required_tier,
                public_sale_at,
            } => Self::EarlyAccessRestricted {
                ticket_type_id,
                required_tier,
                public_sale_at,
            },
            PurchaseRuleViolation::QuantityOutOfRange { requested, min, max } => Self::QuantityOutOfRange {
                ticket_type_id,
                requested,
                min,
                max,
            },
            PurchaseRuleViolation::InventoryUnavailable { requested, remaining } => {
                Self::InventoryUnavailable {
                    ticket_type_id,
                    requested,
                    remaining,
                }
            }
        }
    }
}

impl From<LockError> for ReservationError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Contention { key } => Self::LockContention { key },
            LockError::Unavailable(reason) => Self::LockUnavailable(reason),
        }
    }
}

impl From<CommitError> for ReservationError {
    fn from(err: CommitError) -> Self {
        match err {
            CommitError::InventoryUnavailable {
                ticket_type_id,
                requested,
                remaining,
            } => Self::InventoryUnavailable {
                ticket_type_id,
                requested,
                remaining,
            },
            CommitError::Coupon(rejection) => Self::CouponInvalid(rejection),
            CommitError::RowLocked => Self::LockContention {
                key: "ticket_types".to_string(),
            },
            CommitError::DuplicateTicketCode => Self::TicketCodeGeneration { attempts: 1 },
            CommitError::Store(err) => Self::Store(err),
        }
    }
}

/// Everything decided before the commit.
struct Quote {
    sale: SaleSession,
    reserved_until: DateTime<Utc>,
    lines: Vec<(TicketType, u32)>,
    pricing: PriceBreakdown,
    coupon: Option<Coupon>,
}

/// Creates pending orders that hold inventory until payment.
#[derive(Clone)]
pub struct ReservationEngine {
    catalog: Arc<dyn Catalog>,
    orders: Arc<dyn OrderStore>,
    ledger: Arc<dyn QueueLedger>,
    admission: AdmissionController,
    mirror: QueueMirror,
    locks: DistributedLock,
    codes: Arc<dyn CodeGenerator>,
    clock: Arc<dyn Clock>,
    policy: ReservationPolicy,
}

impl ReservationEngine {
    /// Creates an engine.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: Arc<dyn Catalog>,
        orders: Arc<dyn OrderStore>,
        ledger: Arc<dyn QueueLedger>,
        admission: AdmissionController,
        mirror: QueueMirror,
        locks: DistributedLock,
        codes: Arc<dyn CodeGenerator>,
        clock: Arc<dyn Clock>,
        policy: ReservationPolicy,
    ) -> Self {
        Self {
            catalog,
            orders,
            ledger,
            admission,
            mirror,
            locks,
            codes,
            clock,
            policy,
        }
    }

    /// Reserves the requested tickets for `buyer`.
    ///
    /// # Errors
    ///
    /// Returns the [`ReservationError`] describing the first rule that failed. Nothing is
    /// written on error.
    pub async fn create_order(&self, buyer: Buyer, request: OrderRequest) -> Result<Order, ReservationError> {
        let result = self.create_order_inner(buyer, &request).await;
        match &result {
            Ok(order) => {
                metrics::record_order("created");
                tracing::info!(
                    order_id = %order.id,
                    user_id = %buyer.user_id,
                    session_id = %order.session_id,
                    tickets = order.ticket_count(),
                    total = order.pricing.total.cents(),
                    reserved_until = %order.reserved_until,
                    "Order reserved"
                );
            }
            Err(err) => {
                metrics::record_order(err.outcome());
                tracing::info!(
                    user_id = %buyer.user_id,
                    session_id = %request.session_id,
                    reason = err.outcome(),
                    error = %err,
                    "Order rejected"
                );
            }
        }
        result
    }

    async fn create_order_inner(&self, buyer: Buyer, request: &OrderRequest) -> Result<Order, ReservationError> {
        validate_shape(request)?;
        self.check_cooldown(buyer.user_id).await?;

        let session = request.session_id;
        let user_key = format!("reserve:user:{}:{session}", buyer.user_id);
        let user_guard = self.locks.lock(&user_key, self.policy.lock_ttl).await?;
        let session_guard = match self
            .locks
            .lock(&format!("reserve:session:{session}"), self.policy.lock_ttl)
            .await
        {
            Ok(guard) => guard,
            Err(err) => {
                release(user_guard).await;
                return Err(err.into());
            }
        };

        let result = self.reserve_locked(buyer, request).await;

        release(session_guard).await;
        release(user_guard).await;

        let (order, admitted) = result?;
        if admitted {
            match self
                .admission
                .retire_slot(session, buyer.user_id, QueueStatus::Completed)
                .await
            {
                Ok(_) => self.admission.promote_quietly(session).await,
                Err(err) => {
                    tracing::warn!(session_id = %session, user_id = %buyer.user_id, error = %err, "Failed to retire slot");
                }
            }
        }
        self.start_cooldown(buyer.user_id).await;
        Ok(order)
    }

    /// Runs under both locks. Returns the order and whether it used a waiting-room slot.
    async fn reserve_locked(&self, buyer: Buyer, request: &OrderRequest) -> Result<(Order, bool), ReservationError> {
        let now = self.clock.now();
        let quote = self.quote(buyer, request, now).await?;
        let admitted = quote.sale.admission().is_some();

        let attempts = self.policy.ticket_code_attempts.max(1);
        for attempt in 1..=attempts {
            let plan = self.plan(buyer, request, &quote, now);
            match self.orders.commit_reservation(&plan).await {
                Ok(()) => return Ok((plan.order, admitted)),
                Err(CommitError::DuplicateTicketCode) => {
                    tracing::warn!(attempt, attempts, "Ticket code collision, regenerating");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(ReservationError::TicketCodeGeneration { attempts })
    }

    async fn quote(&self, buyer: Buyer, request: &OrderRequest, now: DateTime<Utc>) -> Result<Quote, ReservationError> {
        let session = request.session_id;
        let sale = self
            .catalog
            .session(session)
            .await?
            .ok_or(ReservationError::SessionNotFound(session))?;
        if sale.event_id != request.event_id {
            return Err(ReservationError::InvalidRequest(format!(
                "session {session} does not belong to event {}",
                request.event_id
            )));
        }

        // Checked before the slot: a committed order has already retired it.
        if let Some(order_id) = self.orders.find_pending_order(buyer.user_id, session, now).await? {
            return Err(ReservationError::DuplicatePendingOrder { order_id });
        }

        let reserved_until = match sale.admission() {
            Some(_) => self.slot_deadline(session, buyer.user_id, now).await?,
            None => now
                .checked_add_signed(self.policy.fallback_window)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        let ticket_types = self.catalog.ticket_types(session).await?;
        let mut lines = Vec::with_capacity(request.tickets.len());
        for line in &request.tickets {
            let ticket_type = ticket_types
                .iter()
                .find(|tt| tt.id == line.ticket_type_id)
                .ok_or(ReservationError::UnknownTicketType(line.ticket_type_id))?;
            ticket_type
                .check_purchase(buyer.tier, line.quantity, now, self.policy.early_access_max_per_order)
                .map_err(|violation| ReservationError::from_rule(ticket_type.id, violation))?;
            lines.push((ticket_type.clone(), line.quantity));
        }

        let subtotal = pricing::subtotal(lines.iter().map(|(tt, quantity)| (tt.price, *quantity)))
            .map_err(|err| ReservationError::InvalidRequest(err.to_string()))?;

        let coupon = match request.coupon_code.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => Some(self.validate_coupon(code, buyer, subtotal, now).await?),
            None => None,
        };

        let pricing = PriceBreakdown::compute(subtotal, buyer.tier, coupon.as_ref(), self.policy.vat_percent)
            .map_err(|err| ReservationError::InvalidRequest(err.to_string()))?;

        Ok(Quote {
            sale,
            reserved_until,
            lines,
            pricing,
            coupon,
        })
    }

    /// Deadline of the buyer's live slot. A lapsed slot is expired on the spot.
    async fn slot_deadline(
        &self,
        session: SessionId,
        user: UserId,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ReservationError> {
        let Some(entry) = self.ledger.find(session, user).await? else {
            return Err(ReservationError::NotAdmitted { session_id: session });
        };
        if entry.holds_live_slot(now) {
            if let Some(expires_at) = entry.expires_at {
                return Ok(expires_at);
            }
        }
        if entry.slot_lapsed(now) {
            self.admission
                .retire_slot(session, user, QueueStatus::Expired)
                .await?;
            return Err(ReservationError::SlotExpired {
                expired_at: entry.expires_at.unwrap_or(now),
            });
        }
        Err(ReservationError::NotAdmitted { session_id: session })
    }

    async fn validate_coupon(
        &self,
        code: &str,
        buyer: Buyer,
        subtotal: Money,
        now: DateTime<Utc>,
    ) -> Result<Coupon, ReservationError> {
        let coupon = self
            .orders
            .find_coupon(code)
            .await?
            .ok_or(ReservationError::CouponInvalid(CouponRejection::NotFound))?;
        let used = self.orders.coupon_usage_count(coupon.id, buyer.user_id).await?;
        coupon
            .validate(buyer.tier, subtotal, used, now)
            .map_err(ReservationError::CouponInvalid)?;
        Ok(coupon)
    }

    /// Builds the order with fresh ticket codes.
    fn plan(&self, buyer: Buyer, request: &OrderRequest, quote: &Quote, now: DateTime<Utc>) -> ReservationPlan {
        let order_id = OrderId::new();
        let mut items = Vec::with_capacity(quote.lines.len());
        let mut tickets = Vec::new();

        for (ticket_type, quantity) in &quote.lines {
            let item = OrderItem {
                id: OrderItemId::new(),
                ticket_type_id: ticket_type.id,
                quantity: *quantity,
                unit_price: ticket_type.price,
            };
            tickets.extend((0..*quantity).map(|_| Ticket {
                id: TicketId::new(),
                order_item_id: item.id,
                ticket_type_id: ticket_type.id,
                code: self.codes.generate(),
                status: TicketStatus::Valid,
            }));
            items.push(item);
        }

        let coupon_usage = quote.coupon.as_ref().map(|coupon| CouponUsage {
            coupon_id: coupon.id,
            user_id: buyer.user_id,
            order_id,
            discount_amount: quote.pricing.coupon_discount,
            used_at: now,
        });

        ReservationPlan {
            order: Order {
                id: order_id,
                user_id: buyer.user_id,
                event_id: request.event_id,
                session_id: request.session_id,
                status: OrderStatus::Pending,
                pricing: quote.pricing,
                coupon_id: quote.coupon.as_ref().map(|c| c.id),
                customer: request.customer_info.clone(),
                items,
                tickets,
                reserved_until: quote.reserved_until,
                created_at: now,
                paid_at: None,
                payment_transaction_id: None,
                cancelled_at: None,
            },
            buyer_tier: buyer.tier,
            coupon_usage,
        }
    }

    async fn check_cooldown(&self, user: UserId) -> Result<(), ReservationError> {
        let remaining = self
            .mirror
            .attempt("cooldown", self.mirror.store().cooldown(user))
            .await
            .flatten();
        match remaining {
            Some(left) if !left.is_zero() => Err(ReservationError::PurchaseCooldown {
                retry_after_secs: left.as_secs().max(1),
            }),
            _ => Ok(()),
        }
    }

    async fn start_cooldown(&self, user: UserId) {
        let (min, max) = (self.policy.cooldown.start().as_secs(), self.policy.cooldown.end().as_secs());
        if max == 0 {
            return;
        }
        let secs = if min < max {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };
        self.mirror
            .attempt(
                "set_cooldown",
                self.mirror.store().set_cooldown(user, Duration::from_secs(secs)),
            )
            .await;
    }
}

fn validate_shape(request: &OrderRequest) -> Result<(), ReservationError> {
    if request.tickets.is_empty() {
        return Err(ReservationError::InvalidRequest("no tickets requested".to_string()));
    }
    let mut seen = HashSet::with_capacity(request.tickets.len());
    for line in &request.tickets {
        if !seen.insert(line.ticket_type_id) {
            return Err(ReservationError::InvalidRequest(format!(
                "ticket type {} listed twice",
                line.ticket_type_id
            )));
        }
    }
    if request.customer_info.email.trim().is_empty() {
        return Err(ReservationError::InvalidRequest("customer email is required".to_string()));
    }
    Ok(())
}

async fn release(guard: LockGuard) {
    let key = guard.key().to_string();
    if let Err(err) = guard.release().await {
        tracing::warn!(key, error = %err, "Failed to release reservation lock");
    }
}
