//! Waiting-room admission tests over in-memory backends.
//!
//! Run with: `cargo test --test admission_test`

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod common;

use chrono::Duration;
use common::{test_config, Harness};
use fairsale_core::catalog::SaleSession;
use fairsale_core::environment::Clock;
use fairsale_core::error::StoreError;
use fairsale_core::fast_store::FastQueueStore;
use fairsale_core::{EventId, MembershipTier, PromotionOrder, QueueStatus, SessionId, UserId, WaitingRoomConfig};
use ticketing::services::{AdmissionError, AdmissionState};

#[tokio::test]
async fn first_user_is_admitted_second_waits_third_is_turned_away() {
    let h = Harness::new();
    let session = h.gated_session(2, 1, 15);
    let admission = &h.services.admission;
    let (u1, u2, u3) = (UserId::new(), UserId::new(), UserId::new());

    let first = admission.join(session.id, u1, MembershipTier::Basic).await.unwrap();
    assert_eq!(
        first,
        AdmissionState::Active {
            expires_at: h.clock.now() + Duration::minutes(15)
        }
    );

    let second = admission.join(session.id, u2, MembershipTier::Basic).await.unwrap();
    assert_eq!(
        second,
        AdmissionState::Waiting {
            position: 1,
            estimated_wait_minutes: 15
        }
    );

    let third = admission.join(session.id, u3, MembershipTier::Basic).await;
    assert!(matches!(
        third,
        Err(AdmissionError::CapacityExceeded {
            max_capacity: 2,
            occupancy: 2
        })
    ));
    assert_eq!(h.ledger.entries(session.id).len(), 2);
}

#[tokio::test]
async fn joining_twice_keeps_the_original_place() {
    let h = Harness::new();
    let session = h.gated_session(10, 1, 15);
    let admission = &h.services.admission;
    let (u1, u2) = (UserId::new(), UserId::new());

    admission.join(session.id, u1, MembershipTier::Basic).await.unwrap();
    let first = admission.join(session.id, u2, MembershipTier::Basic).await.unwrap();
    let again = admission.join(session.id, u2, MembershipTier::Basic).await.unwrap();
    assert_eq!(first, again);

    let active_again = admission.join(session.id, u1, MembershipTier::Basic).await.unwrap();
    assert!(matches!(active_again, AdmissionState::Active { .. }));

    let entries = h.ledger.entries(session.id);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries.iter().map(|e| e.queue_number).collect::<Vec<_>>(), vec![1, 2]);
}

#[tokio::test]
async fn status_reports_position_and_slot() {
    let h = Harness::new();
    let session = h.gated_session(10, 1, 15);
    let admission = &h.services.admission;
    let (u1, u2, u3, stranger) = (UserId::new(), UserId::new(), UserId::new(), UserId::new());

    for user in [u1, u2, u3] {
        admission.join(session.id, user, MembershipTier::Basic).await.unwrap();
    }

    assert!(matches!(
        admission.status(session.id, u1).await.unwrap(),
        AdmissionState::Active { .. }
    ));
    assert_eq!(
        admission.status(session.id, u3).await.unwrap(),
        AdmissionState::Waiting {
            position: 2,
            estimated_wait_minutes: 30
        }
    );
    assert_eq!(
        admission.status(session.id, stranger).await.unwrap(),
        AdmissionState::NotInQueue
    );
}

#[tokio::test]
async fn fifo_ignores_tier_when_promoting() {
    let h = Harness::new();
    let session = h.gated_session(10, 1, 15);
    let admission = &h.services.admission;
    let (u1, basic, premium) = (UserId::new(), UserId::new(), UserId::new());

    admission.join(session.id, u1, MembershipTier::Basic).await.unwrap();
    admission.join(session.id, basic, MembershipTier::Basic).await.unwrap();
    admission.join(session.id, premium, MembershipTier::Premium).await.unwrap();

    admission.leave(session.id, u1).await.unwrap();

    assert!(matches!(
        admission.status(session.id, basic).await.unwrap(),
        AdmissionState::Active { .. }
    ));
    assert_eq!(
        admission.status(session.id, premium).await.unwrap(),
        AdmissionState::Waiting {
            position: 1,
            estimated_wait_minutes: 15
        }
    );
}

#[tokio::test]
async fn priority_order_promotes_higher_tiers_first() {
    let mut config = test_config();
    config.queue.promotion_order = PromotionOrder::PriorityThenFifo;
    let h = Harness::with(config, |resources| resources);
    let session = h.gated_session(10, 1, 15);
    let admission = &h.services.admission;
    let (u1, basic, premium) = (UserId::new(), UserId::new(), UserId::new());

    admission.join(session.id, u1, MembershipTier::Basic).await.unwrap();
    admission.join(session.id, basic, MembershipTier::Basic).await.unwrap();
    let joined = admission.join(session.id, premium, MembershipTier::Premium).await.unwrap();
    assert!(matches!(joined, AdmissionState::Waiting { position: 1, .. }));

    admission.leave(session.id, u1).await.unwrap();

    assert!(matches!(
        admission.status(session.id, premium).await.unwrap(),
        AdmissionState::Active { .. }
    ));
    assert!(matches!(
        admission.status(session.id, basic).await.unwrap(),
        AdmissionState::Waiting { position: 1, .. }
    ));
}

#[tokio::test]
async fn lapsed_slot_is_reaped_and_capacity_handed_on() {
    let h = Harness::new();
    let session = h.gated_session(2, 1, 15);
    let admission = &h.services.admission;
    let (u1, u2) = (UserId::new(), UserId::new());

    admission.join(session.id, u1, MembershipTier::Basic).await.unwrap();
    admission.join(session.id, u2, MembershipTier::Basic).await.unwrap();

    h.clock.advance(Duration::minutes(16));
    let expired = h.services.slot_reaper_task(&h.config).reap().await.unwrap();
    assert_eq!(expired, 1);

    assert_eq!(
        admission.status(session.id, u1).await.unwrap(),
        AdmissionState::Finished {
            status: QueueStatus::Expired
        }
    );
    assert_eq!(
        admission.status(session.id, u2).await.unwrap(),
        AdmissionState::Active {
            expires_at: h.clock.now() + Duration::minutes(15)
        }
    );

    let stats = admission.statistics(session.id).await.unwrap();
    assert_eq!(stats.counts.active, 1);
    assert_eq!(stats.counts.expired, 1);
    assert_eq!(stats.occupancy, 1);
}

#[tokio::test]
async fn lapsed_slot_still_counts_until_reaped() {
    let h = Harness::new();
    let session = h.gated_session(1, 1, 15);
    let admission = &h.services.admission;
    let (u1, u2) = (UserId::new(), UserId::new());

    admission.join(session.id, u1, MembershipTier::Basic).await.unwrap();
    h.clock.advance(Duration::minutes(16));

    assert!(matches!(
        admission.join(session.id, u2, MembershipTier::Basic).await,
        Err(AdmissionError::CapacityExceeded { occupancy: 1, .. })
    ));

    // u1 rejoining retires its own lapsed slot and starts over.
    let rejoined = admission.join(session.id, u1, MembershipTier::Basic).await.unwrap();
    assert!(matches!(rejoined, AdmissionState::Active { .. }));
    let entry = h.ledger.entries(session.id).pop().unwrap();
    assert_eq!(entry.queue_number, 2);
    assert_eq!(entry.user_id, u1);
}

#[tokio::test]
async fn heartbeat_and_leave() {
    let h = Harness::new();
    let session = h.gated_session(10, 1, 15);
    let admission = &h.services.admission;
    let (u1, u2) = (UserId::new(), UserId::new());

    admission.join(session.id, u1, MembershipTier::Basic).await.unwrap();
    admission.join(session.id, u2, MembershipTier::Basic).await.unwrap();

    admission.heartbeat(session.id, u1).await.unwrap();
    assert!(matches!(
        admission.heartbeat(session.id, u2).await,
        Err(AdmissionError::NotActive)
    ));

    admission.leave(session.id, u2).await.unwrap();
    assert!(matches!(
        admission.leave(session.id, u2).await,
        Err(AdmissionError::NotInQueue)
    ));
    assert_eq!(
        admission.status(session.id, u2).await.unwrap(),
        AdmissionState::Finished {
            status: QueueStatus::Cancelled
        }
    );
    assert_eq!(h.fast.queue_length(session.id).await.unwrap(), 0);
}

#[tokio::test]
async fn sessions_without_waiting_room_are_open() {
    let h = Harness::new();
    let session = h.open_session();

    let state = h
        .services
        .admission
        .join(session.id, UserId::new(), MembershipTier::Basic)
        .await
        .unwrap();
    assert_eq!(state, AdmissionState::Open);
    assert!(state.can_purchase());
}

#[tokio::test]
async fn unknown_and_closed_sessions_are_rejected() {
    let h = Harness::new();
    let admission = &h.services.admission;

    let missing = SessionId::new();
    assert!(matches!(
        admission.join(missing, UserId::new(), MembershipTier::Basic).await,
        Err(AdmissionError::SessionNotFound(id)) if id == missing
    ));

    let closed = SaleSession {
        id: SessionId::new(),
        event_id: EventId::new(),
        waiting_room: Some(WaitingRoomConfig {
            max_capacity: 10,
            concurrent_purchase_limit: 1,
            queue_timeout_minutes: 15,
            is_enabled: true,
        }),
        sale_closes_at: Some(h.clock.now() - Duration::minutes(1)),
    };
    h.store.put_session(closed.clone());
    assert!(matches!(
        admission.join(closed.id, UserId::new(), MembershipTier::Basic).await,
        Err(AdmissionError::SaleClosed(_))
    ));
}

#[tokio::test]
async fn closing_sale_empties_the_queue() {
    let h = Harness::new();
    let session = h.gated_session(10, 1, 15);
    let admission = &h.services.admission;

    for _ in 0..3 {
        admission.join(session.id, UserId::new(), MembershipTier::Basic).await.unwrap();
    }

    h.clock.advance(Duration::days(1) + Duration::minutes(1));
    let expired = h.services.slot_reaper_task(&h.config).reap().await.unwrap();
    assert_eq!(expired, 3);

    let stats = admission.statistics(session.id).await.unwrap();
    assert_eq!(stats.occupancy, 0);
    assert_eq!(stats.counts.expired, 3);
    assert_eq!(stats.fast_queue_length, Some(0));
}

#[tokio::test]
async fn statistics_report_utilization() {
    let h = Harness::new();
    let session = h.gated_session(10, 2, 15);
    let admission = &h.services.admission;

    for _ in 0..3 {
        admission.join(session.id, UserId::new(), MembershipTier::Basic).await.unwrap();
    }

    let stats = admission.statistics(session.id).await.unwrap();
    assert_eq!(stats.counts.active, 2);
    assert_eq!(stats.counts.waiting, 1);
    assert_eq!(stats.occupancy, 3);
    assert!((stats.capacity_utilization - 100.0).abs() < f64::EPSILON);
    assert_eq!(stats.fast_queue_length, Some(1));
    assert!(!stats.fast_store_degraded);
}

#[tokio::test]
async fn admission_keeps_working_on_the_ledger_when_fast_store_is_down() {
    let h = Harness::new();
    h.fast.set_available(false);
    let session = h.gated_session(3, 1, 15);
    let admission = &h.services.admission;
    let (u1, u2) = (UserId::new(), UserId::new());

    assert!(matches!(
        admission.join(session.id, u1, MembershipTier::Basic).await.unwrap(),
        AdmissionState::Active { .. }
    ));
    assert_eq!(
        admission.join(session.id, u2, MembershipTier::Premium).await.unwrap(),
        AdmissionState::Waiting {
            position: 1,
            estimated_wait_minutes: 15
        }
    );
    assert_eq!(
        admission.status(session.id, u2).await.unwrap(),
        AdmissionState::Waiting {
            position: 1,
            estimated_wait_minutes: 15
        }
    );

    let entries = h.ledger.entries(session.id);
    assert_eq!(entries.iter().map(|e| e.queue_number).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(entries[1].priority_score, 100);

    let stats = admission.statistics(session.id).await.unwrap();
    assert!(stats.fast_store_degraded);
    assert_eq!(stats.fast_queue_length, None);
}

#[tokio::test]
async fn wiped_fast_store_is_rebuilt_from_the_ledger() {
    let h = Harness::new();
    let session = h.gated_session(10, 1, 15);
    let admission = &h.services.admission;
    let (u1, u2, u3) = (UserId::new(), UserId::new(), UserId::new());

    admission.join(session.id, u1, MembershipTier::Basic).await.unwrap();
    admission.join(session.id, u2, MembershipTier::Basic).await.unwrap();
    h.fast.flush();

    assert!(matches!(
        admission.status(session.id, u2).await.unwrap(),
        AdmissionState::Waiting { position: 1, .. }
    ));

    h.services.slot_reaper_task(&h.config).reap().await.unwrap();
    assert_eq!(h.fast.position(session.id, u2).await.unwrap(), Some(1));

    admission.join(session.id, u3, MembershipTier::Basic).await.unwrap();
    let numbers: Vec<_> = h.ledger.entries(session.id).iter().map(|e| e.queue_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_never_overfill_the_waiting_room() {
    let h = Harness::new();
    let session = h.gated_session(5, 1, 15);

    let joins: Vec<_> = (0..50)
        .map(|_| {
            let admission = h.services.admission.clone();
            tokio::spawn(async move { admission.join(session.id, UserId::new(), MembershipTier::Basic).await })
        })
        .collect();

    let mut admitted = 0;
    let mut turned_away = 0;
    for join in joins {
        match join.await.unwrap() {
            Ok(AdmissionState::Active { .. } | AdmissionState::Waiting { .. }) => admitted += 1,
            Err(AdmissionError::CapacityExceeded { max_capacity: 5, occupancy }) => {
                assert_eq!(occupancy, 5);
                turned_away += 1;
            }
            Err(AdmissionError::Store(StoreError::Conflict(_))) => {}
            other => panic!("unexpected join result: {other:?}"),
        }
    }

    let entries = h.ledger.entries(session.id);
    let active = entries.iter().filter(|e| e.status == QueueStatus::Active).count();
    assert_eq!(admitted, 5);
    assert!(turned_away > 0);
    assert_eq!(entries.len(), 5);
    assert!(entries.iter().all(|e| e.status.is_live()));
    assert_eq!(active, 1);
}

#[tokio::test]
async fn failed_activation_returns_users_to_the_fast_queue() {
    let h = Harness::new();
    let session = h.gated_session(10, 2, 15);
    let admission = &h.services.admission;
    let (u1, u2) = (UserId::new(), UserId::new());

    h.ledger.set_activations_available(false);
    for (user, expected) in [(u1, 1), (u2, 2)] {
        let state = admission.join(session.id, user, MembershipTier::Basic).await.unwrap();
        assert!(matches!(state, AdmissionState::Waiting { position, .. } if position == expected));
    }
    assert!(h.services.processor.promote(session.id).await.is_err());
    assert_eq!(h.fast.queue_length(session.id).await.unwrap(), 2);
    assert_eq!(h.fast.position(session.id, u1).await.unwrap(), Some(1));
    assert_eq!(h.fast.position(session.id, u2).await.unwrap(), Some(2));

    h.ledger.set_activations_available(true);
    let promoted = h.services.processor.promote(session.id).await.unwrap();
    assert_eq!(promoted.iter().map(|e| e.user_id).collect::<Vec<_>>(), vec![u1, u2]);
    assert_eq!(h.fast.queue_length(session.id).await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_promotions_respect_the_purchase_limit() {
    let h = Harness::new();
    let session = h.gated_session(100, 3, 15);

    h.ledger.set_activations_available(false);
    for _ in 0..20 {
        h.services
            .admission
            .join(session.id, UserId::new(), MembershipTier::Basic)
            .await
            .unwrap();
    }
    h.ledger.set_activations_available(true);
    // Without the lock backend every processor proceeds unserialized.
    h.locks.set_available(false);

    let passes: Vec<_> = (0..8)
        .map(|_| {
            let processor = h.services.processor.clone();
            tokio::spawn(async move { processor.promote(session.id).await })
        })
        .collect();
    let mut promoted = 0;
    for pass in passes {
        promoted += pass.await.unwrap().unwrap().len();
    }

    let entries = h.ledger.entries(session.id);
    let active = entries.iter().filter(|e| e.status == QueueStatus::Active).count();
    assert_eq!(promoted, 3);
    assert_eq!(active, 3);
    assert_eq!(h.fast.queue_length(session.id).await.unwrap(), 17);
}
