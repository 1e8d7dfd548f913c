//! Order reservation tests: admission gating, sale rules, coupons and races.
//!
//! Run with: `cargo test --test reservation_test`

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod common;

use chrono::Duration;
use common::{buyer, request, test_config, Harness};
use fairsale_core::catalog::TicketType;
use fairsale_core::coupon::CouponRejection;
use fairsale_core::environment::Clock;
use fairsale_core::lock::LockBackend;
use fairsale_core::order::{OrderStatus, TicketStatus};
use fairsale_core::{EventId, MembershipTier, Money, QueueStatus, TicketTypeId};
use fairsale_testing::ScriptedCodeGenerator;
use std::sync::Arc;
use ticketing::services::{AdmissionState, ReservationError, TicketLine};

#[tokio::test]
async fn open_session_order_is_reserved_and_priced() {
    let h = Harness::new();
    let session = h.open_session();
    let ticket_type = h.ticket_type(&session, 10);
    let alice = buyer(MembershipTier::Basic);

    let order = h
        .services
        .reservations
        .create_order(alice, request(&session, &ticket_type, 2))
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.user_id, alice.user_id);
    assert_eq!(order.reserved_until, h.clock.now() + Duration::minutes(15));
    assert_eq!(order.pricing.subtotal, Money::from_cents(20_000));
    assert_eq!(order.pricing.vat, Money::from_cents(2_000));
    assert_eq!(order.pricing.total, Money::from_cents(22_000));
    assert_eq!(order.tickets.len(), 2);
    assert!(order.tickets.iter().all(|t| t.status == TicketStatus::Valid));
    assert_ne!(order.tickets[0].code, order.tickets[1].code);
    assert_eq!(h.sold(&ticket_type), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_ticket_goes_to_exactly_one_buyer() {
    let h = Harness::new();
    let session = h.open_session();
    let ticket_type = h.ticket_type(&session, 1);

    let attempts: Vec<_> = (0..2)
        .map(|_| {
            let engine = h.services.reservations.clone();
            let req = request(&session, &ticket_type, 1);
            tokio::spawn(async move { engine.create_order(buyer(MembershipTier::Basic), req).await })
        })
        .collect();

    let mut won = 0;
    let mut sold_out = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => won += 1,
            Err(ReservationError::InventoryUnavailable {
                requested: 1,
                remaining: 0,
                ..
            }) => sold_out += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!((won, sold_out), (1, 1));
    assert_eq!(h.sold(&ticket_type), 1);
    assert_eq!(h.store.orders().len(), 1);
}

#[tokio::test]
async fn early_access_is_reserved_for_premium_members() {
    let h = Harness::new();
    let session = h.open_session();
    let now = h.clock.now();
    let ticket_type = TicketType {
        sale_start_time: now + Duration::minutes(30),
        premium_early_access_minutes: 60,
        ..h.ticket_type(&session, 100)
    };
    h.store.put_ticket_type(ticket_type.clone());
    let engine = &h.services.reservations;

    let basic = engine
        .create_order(buyer(MembershipTier::Basic), request(&session, &ticket_type, 1))
        .await;
    match basic {
        Err(ReservationError::EarlyAccessRestricted {
            required_tier,
            public_sale_at,
            ..
        }) => {
            assert_eq!(required_tier, MembershipTier::Premium);
            assert_eq!(public_sale_at, ticket_type.sale_start_time);
        }
        other => panic!("expected early access rejection, got {other:?}"),
    }

    let greedy = engine
        .create_order(buyer(MembershipTier::Premium), request(&session, &ticket_type, 3))
        .await;
    assert!(matches!(
        greedy,
        Err(ReservationError::QuantityOutOfRange { requested: 3, max: 2, .. })
    ));

    let premium = engine
        .create_order(buyer(MembershipTier::Premium), request(&session, &ticket_type, 2))
        .await
        .unwrap();
    assert_eq!(premium.pricing.membership_discount, Money::from_cents(2_000));
    assert_eq!(premium.pricing.total, Money::from_cents(19_800));
    assert_eq!(h.sold(&ticket_type), 2);
}

#[tokio::test]
async fn sale_window_is_enforced() {
    let h = Harness::new();
    let session = h.open_session();
    let now = h.clock.now();
    let ticket_type = TicketType {
        sale_start_time: now + Duration::hours(2),
        ..h.ticket_type(&session, 100)
    };
    h.store.put_ticket_type(ticket_type.clone());

    let result = h
        .services
        .reservations
        .create_order(buyer(MembershipTier::Premium), request(&session, &ticket_type, 1))
        .await;
    assert!(matches!(result, Err(ReservationError::OutOfSaleWindow { .. })));
    assert_eq!(h.sold(&ticket_type), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_use_coupon_is_redeemed_once() {
    let h = Harness::new();
    let session = h.open_session();
    let ticket_type = h.ticket_type(&session, 100);
    let coupon = h.coupon("ONCE", Some(1));

    let attempts: Vec<_> = (0..2)
        .map(|_| {
            let engine = h.services.reservations.clone();
            let mut req = request(&session, &ticket_type, 1);
            req.coupon_code = Some("ONCE".to_string());
            tokio::spawn(async move { engine.create_order(buyer(MembershipTier::Basic), req).await })
        })
        .collect();

    let mut discounted = 0;
    let mut rejected = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(order) => {
                assert_eq!(order.coupon_id, Some(coupon.id));
                assert_eq!(order.pricing.coupon_discount, Money::from_cents(1_000));
                discounted += 1;
            }
            Err(ReservationError::CouponInvalid(CouponRejection::UsageExhausted { limit: 1 })) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!((discounted, rejected), (1, 1));
    assert_eq!(h.store.coupon_usages().len(), 1);
    assert_eq!(h.store.coupon(coupon.id).unwrap().used_count, 1);
    assert_eq!(h.sold(&ticket_type), 1);
}

#[tokio::test]
async fn unknown_coupon_is_rejected_without_side_effects() {
    let h = Harness::new();
    let session = h.open_session();
    let ticket_type = h.ticket_type(&session, 100);
    let mut req = request(&session, &ticket_type, 1);
    req.coupon_code = Some("NOPE".to_string());

    let result = h
        .services
        .reservations
        .create_order(buyer(MembershipTier::Basic), req)
        .await;
    assert!(matches!(
        result,
        Err(ReservationError::CouponInvalid(CouponRejection::NotFound))
    ));
    assert_eq!(h.sold(&ticket_type), 0);
    assert!(h.store.orders().is_empty());
}

#[tokio::test]
async fn gated_session_requires_an_active_slot() {
    let h = Harness::new();
    let session = h.gated_session(10, 1, 15);
    let ticket_type = h.ticket_type(&session, 100);
    let admission = &h.services.admission;
    let engine = &h.services.reservations;
    let (first, second) = (buyer(MembershipTier::Basic), buyer(MembershipTier::Basic));

    let slot = admission.join(session.id, first.user_id, first.tier).await.unwrap();
    let AdmissionState::Active { expires_at } = slot else {
        panic!("first user should be active, got {slot:?}");
    };
    admission.join(session.id, second.user_id, second.tier).await.unwrap();

    let rejected = engine.create_order(second, request(&session, &ticket_type, 1)).await;
    assert!(matches!(rejected, Err(ReservationError::NotAdmitted { .. })));

    let stranger = engine
        .create_order(buyer(MembershipTier::Basic), request(&session, &ticket_type, 1))
        .await;
    assert!(matches!(stranger, Err(ReservationError::NotAdmitted { .. })));

    let order = engine.create_order(first, request(&session, &ticket_type, 1)).await.unwrap();
    assert_eq!(order.reserved_until, expires_at);

    // The slot is spent and handed to the next user.
    assert_eq!(
        admission.status(session.id, first.user_id).await.unwrap(),
        AdmissionState::Finished {
            status: QueueStatus::Completed
        }
    );
    assert!(matches!(
        admission.status(session.id, second.user_id).await.unwrap(),
        AdmissionState::Active { .. }
    ));
}

#[tokio::test]
async fn lapsed_slot_cannot_reserve() {
    let h = Harness::new();
    let session = h.gated_session(10, 1, 15);
    let ticket_type = h.ticket_type(&session, 100);
    let alice = buyer(MembershipTier::Basic);

    h.services
        .admission
        .join(session.id, alice.user_id, alice.tier)
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(15));

    let result = h
        .services
        .reservations
        .create_order(alice, request(&session, &ticket_type, 1))
        .await;
    assert!(matches!(result, Err(ReservationError::SlotExpired { .. })));

    let entry = h.ledger.entries(session.id).pop().unwrap();
    assert_eq!(entry.status, QueueStatus::Expired);
    assert_eq!(h.sold(&ticket_type), 0);
}

#[tokio::test]
async fn second_pending_order_in_the_same_session_is_refused() {
    let h = Harness::new();
    let session = h.open_session();
    let ticket_type = h.ticket_type(&session, 100);
    let alice = buyer(MembershipTier::Basic);
    let engine = &h.services.reservations;

    let first = engine.create_order(alice, request(&session, &ticket_type, 1)).await.unwrap();
    let second = engine.create_order(alice, request(&session, &ticket_type, 1)).await;

    match second {
        Err(ReservationError::DuplicatePendingOrder { order_id }) => assert_eq!(order_id, first.id),
        other => panic!("expected duplicate pending order, got {other:?}"),
    }
    assert_eq!(h.sold(&ticket_type), 1);
}

#[tokio::test]
async fn cooldown_follows_a_committed_order() {
    let mut config = test_config();
    config.reservation.cooldown_min_secs = 60;
    config.reservation.cooldown_max_secs = 60;
    let h = Harness::with(config, |resources| resources);
    let session = h.open_session();
    let ticket_type = h.ticket_type(&session, 100);
    let alice = buyer(MembershipTier::Basic);
    let engine = &h.services.reservations;

    engine.create_order(alice, request(&session, &ticket_type, 1)).await.unwrap();

    let blocked = engine.create_order(alice, request(&session, &ticket_type, 1)).await;
    assert!(matches!(
        blocked,
        Err(ReservationError::PurchaseCooldown { retry_after_secs: 60 })
    ));

    h.clock.advance(Duration::seconds(61));
    let after = engine.create_order(alice, request(&session, &ticket_type, 1)).await;
    assert!(matches!(after, Err(ReservationError::DuplicatePendingOrder { .. })));

    // Other buyers are unaffected.
    engine
        .create_order(buyer(MembershipTier::Basic), request(&session, &ticket_type, 1))
        .await
        .unwrap();
}

#[tokio::test]
async fn colliding_ticket_codes_are_regenerated() {
    let codes = ScriptedCodeGenerator::new(["TKT-A", "TKT-A", "TKT-B", "TKT-A", "TKT-A", "TKT-A"]);
    let h = Harness::with(test_config(), |resources| resources.with_codes(Arc::new(codes)));
    let session = h.open_session();
    let ticket_type = h.ticket_type(&session, 100);
    let engine = &h.services.reservations;

    let first = engine
        .create_order(buyer(MembershipTier::Basic), request(&session, &ticket_type, 1))
        .await
        .unwrap();
    assert_eq!(first.tickets[0].code, "TKT-A");

    let second = engine
        .create_order(buyer(MembershipTier::Basic), request(&session, &ticket_type, 1))
        .await
        .unwrap();
    assert_eq!(second.tickets[0].code, "TKT-B");

    let third = engine
        .create_order(buyer(MembershipTier::Basic), request(&session, &ticket_type, 1))
        .await;
    assert!(matches!(
        third,
        Err(ReservationError::TicketCodeGeneration { attempts: 3 })
    ));
    assert_eq!(h.sold(&ticket_type), 2);
}

#[tokio::test]
async fn malformed_requests_are_rejected() {
    let h = Harness::new();
    let session = h.open_session();
    let ticket_type = h.ticket_type(&session, 100);
    let engine = &h.services.reservations;
    let alice = buyer(MembershipTier::Basic);

    let mut empty = request(&session, &ticket_type, 1);
    empty.tickets.clear();
    assert!(matches!(
        engine.create_order(alice, empty).await,
        Err(ReservationError::InvalidRequest(_))
    ));

    let mut twice = request(&session, &ticket_type, 1);
    twice.tickets.push(TicketLine {
        ticket_type_id: ticket_type.id,
        quantity: 1,
    });
    assert!(matches!(
        engine.create_order(alice, twice).await,
        Err(ReservationError::InvalidRequest(_))
    ));

    let mut wrong_event = request(&session, &ticket_type, 1);
    wrong_event.event_id = EventId::new();
    assert!(matches!(
        engine.create_order(alice, wrong_event).await,
        Err(ReservationError::InvalidRequest(_))
    ));

    let mut unknown = request(&session, &ticket_type, 1);
    let missing = TicketTypeId::new();
    unknown.tickets[0].ticket_type_id = missing;
    assert!(matches!(
        engine.create_order(alice, unknown).await,
        Err(ReservationError::UnknownTicketType(id)) if id == missing
    ));

    assert!(h.store.orders().is_empty());
}

#[tokio::test]
async fn held_session_lock_fails_closed() {
    let h = Harness::new();
    let session = h.open_session();
    let ticket_type = h.ticket_type(&session, 100);
    let key = format!("reserve:session:{}", session.id);
    assert!(h
        .locks
        .try_acquire(&key, "someone-else", std::time::Duration::from_secs(30))
        .await
        .unwrap());

    let result = h
        .services
        .reservations
        .create_order(buyer(MembershipTier::Basic), request(&session, &ticket_type, 1))
        .await;
    assert!(matches!(result, Err(ReservationError::LockContention { .. })));

    h.locks.set_available(false);
    let result = h
        .services
        .reservations
        .create_order(buyer(MembershipTier::Basic), request(&session, &ticket_type, 1))
        .await;
    assert!(matches!(result, Err(ReservationError::LockUnavailable(_))));
    assert_eq!(h.sold(&ticket_type), 0);
}
