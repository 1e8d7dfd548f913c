//! Shared fixtures: every service wired over in-memory backends and a manual clock.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use chrono::Duration;
use fairsale_core::catalog::{SaleSession, TicketType};
use fairsale_core::coupon::{Coupon, CouponDiscount};
use fairsale_core::environment::Clock;
use fairsale_core::order::CustomerInfo;
use fairsale_core::{CouponId, EventId, MembershipTier, Money, SessionId, TicketTypeId, UserId, WaitingRoomConfig};
use fairsale_testing::{InMemoryFastStore, InMemoryLedger, InMemoryLockBackend, InMemorySaleStore, ManualClock};
use std::sync::Arc;
use ticketing::payment_gateway::MockPaymentGateway;
use ticketing::services::{Buyer, OrderRequest, TicketLine};
use ticketing::{Config, ResourceManager, Services};

/// Configuration used by every test: no cooldown, short lock waits.
pub fn test_config() -> Config {
    let mut config = Config::from_lookup(|_| None);
    config.reservation.cooldown_min_secs = 0;
    config.reservation.cooldown_max_secs = 0;
    config.reservation.lock_wait_ms = 500;
    config
}

/// Services plus handles on the backends behind them.
pub struct Harness {
    pub clock: ManualClock,
    pub store: InMemorySaleStore,
    pub ledger: InMemoryLedger,
    pub fast: InMemoryFastStore,
    pub locks: InMemoryLockBackend,
    pub config: Config,
    pub services: Services,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(test_config(), |resources| resources)
    }

    /// Builds the harness, letting the caller swap resources (codes, gateway).
    pub fn with(config: Config, customize: impl FnOnce(ResourceManager) -> ResourceManager) -> Self {
        let clock = ManualClock::default();
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = InMemorySaleStore::new();
        let ledger = InMemoryLedger::new();
        let fast = InMemoryFastStore::new(Arc::clone(&shared_clock));
        let locks = InMemoryLockBackend::new();

        let resources = ResourceManager::new(
            Arc::new(store.clone()),
            Arc::new(ledger.clone()),
            Arc::new(fast.clone()),
            Arc::new(locks.clone()),
            shared_clock,
        )
        .with_payment_gateway(Arc::new(MockPaymentGateway::new().with_latency(std::time::Duration::ZERO)));
        let resources = customize(resources);
        let services = Services::wire(&resources, &config);

        Self {
            clock,
            store,
            ledger,
            fast,
            locks,
            config,
            services,
        }
    }

    /// A session gated by a waiting room.
    pub fn gated_session(&self, max_capacity: u32, concurrent_purchase_limit: u32, timeout_minutes: u32) -> SaleSession {
        let session = SaleSession {
            id: SessionId::new(),
            event_id: EventId::new(),
            waiting_room: Some(WaitingRoomConfig {
                max_capacity,
                concurrent_purchase_limit,
                queue_timeout_minutes: timeout_minutes,
                is_enabled: true,
            }),
            sale_closes_at: Some(self.clock.now() + Duration::days(1)),
        };
        self.store.put_session(session.clone());
        session
    }

    /// A session anyone may buy from.
    pub fn open_session(&self) -> SaleSession {
        let session = SaleSession {
            id: SessionId::new(),
            event_id: EventId::new(),
            waiting_room: None,
            sale_closes_at: Some(self.clock.now() + Duration::days(1)),
        };
        self.store.put_session(session.clone());
        session
    }

    /// A ticket type on public sale at 100.00, 1 to 4 per order.
    pub fn ticket_type(&self, session: &SaleSession, total_quantity: u32) -> TicketType {
        let now = self.clock.now();
        let ticket_type = TicketType {
            id: TicketTypeId::new(),
            session_id: session.id,
            name: "General Admission".to_string(),
            price: Money::from_cents(10_000),
            total_quantity,
            sold_quantity: 0,
            sale_start_time: now - Duration::hours(1),
            sale_end_time: now + Duration::days(1),
            premium_early_access_minutes: 0,
            min_per_order: 1,
            max_per_order: 4,
        };
        self.store.put_ticket_type(ticket_type.clone());
        ticket_type
    }

    /// A 10% coupon with a global usage limit.
    pub fn coupon(&self, code: &str, usage_limit: Option<u32>) -> Coupon {
        let coupon = Coupon {
            id: CouponId::new(),
            code: code.to_string(),
            discount: CouponDiscount::Percentage(10),
            max_discount: None,
            min_order_amount: None,
            usage_limit,
            per_user_limit: None,
            used_count: 0,
            allowed_tiers: Vec::new(),
            valid_from: None,
            valid_until: None,
            is_active: true,
        };
        self.store.put_coupon(coupon.clone());
        coupon
    }

    pub fn sold(&self, ticket_type: &TicketType) -> u32 {
        self.store.ticket_type(ticket_type.id).unwrap().sold_quantity
    }
}

pub fn buyer(tier: MembershipTier) -> Buyer {
    Buyer {
        user_id: UserId::new(),
        tier,
    }
}

pub fn request(session: &SaleSession, ticket_type: &TicketType, quantity: u32) -> OrderRequest {
    OrderRequest {
        event_id: session.event_id,
        session_id: session.id,
        tickets: vec![TicketLine {
            ticket_type_id: ticket_type.id,
            quantity,
        }],
        customer_info: CustomerInfo {
            name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: None,
        },
        coupon_code: None,
    }
}
