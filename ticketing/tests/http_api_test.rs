//! HTTP API integration tests.
//!
//! Drives the router in process over in-memory backends and checks status codes, error
//! codes and response bodies.
//!
//! Run with: `cargo test --test http_api_test`

#![allow(clippy::expect_used, clippy::unwrap_used)]

mod common;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use common::{buyer, request, Harness};
use fairsale_core::MembershipTier;
use serde_json::{json, Value};
use ticketing::services::Buyer;
use ticketing::build_router;

fn server(h: &Harness) -> TestServer {
    TestServer::new(build_router(h.services.app_state())).unwrap()
}

fn user_header(buyer: &Buyer) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-user-id"),
        HeaderValue::from_str(&buyer.user_id.to_string()).unwrap(),
    )
}

fn tier_header(tier: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-membership-tier"),
        HeaderValue::from_str(tier).unwrap(),
    )
}

#[tokio::test]
async fn join_returns_slot_then_queue_position() {
    let h = Harness::new();
    let session = h.gated_session(10, 1, 15);
    let server = server(&h);
    let (alice, bob) = (buyer(MembershipTier::Basic), buyer(MembershipTier::Basic));

    let (name, value) = user_header(&alice);
    let response = server
        .post("/api/queue/join")
        .add_header(name, value)
        .json(&json!({ "session_id": session.id }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "active");
    assert_eq!(body["can_purchase"], true);

    let (name, value) = user_header(&bob);
    let response = server
        .post("/api/queue/join")
        .add_header(name, value)
        .json(&json!({ "session_id": session.id }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "waiting");
    assert_eq!(body["queue_position"], 1);
    assert_eq!(body["estimated_wait_minutes"], 15);

    let (name, value) = user_header(&bob);
    let response = server
        .get(&format!("/api/queue/status/{}", session.id))
        .add_header(name, value)
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "waiting");
}

#[tokio::test]
async fn requests_without_identity_are_unauthorized() {
    let h = Harness::new();
    let session = h.gated_session(10, 1, 15);
    let server = server(&h);

    let response = server
        .post("/api/queue/join")
        .json(&json!({ "session_id": session.id }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<Value>()["code"], "UNAUTHORIZED");

    let (name, value) = user_header(&buyer(MembershipTier::Basic));
    let (tier_name, tier_value) = tier_header("diamond");
    let response = server
        .post("/api/queue/join")
        .add_header(name, value)
        .add_header(tier_name, tier_value)
        .json(&json!({ "session_id": session.id }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn full_waiting_room_reports_capacity_exceeded() {
    let h = Harness::new();
    let session = h.gated_session(1, 1, 15);
    let server = server(&h);

    for (user, expected) in [
        (buyer(MembershipTier::Basic), StatusCode::OK),
        (buyer(MembershipTier::Premium), StatusCode::SERVICE_UNAVAILABLE),
    ] {
        let (name, value) = user_header(&user);
        let response = server
            .post("/api/queue/join")
            .add_header(name, value)
            .json(&json!({ "session_id": session.id }))
            .await;
        response.assert_status(expected);
        if expected != StatusCode::OK {
            let body: Value = response.json();
            assert_eq!(body["code"], "CAPACITY_EXCEEDED");
            assert_eq!(body["details"]["max_capacity"], 1);
            assert_eq!(body["details"]["occupancy"], 1);
        }
    }
}

#[tokio::test]
async fn leaving_twice_reports_not_in_queue() {
    let h = Harness::new();
    let session = h.gated_session(10, 1, 15);
    let server = server(&h);
    let alice = buyer(MembershipTier::Basic);

    let (name, value) = user_header(&alice);
    server
        .post("/api/queue/join")
        .add_header(name, value)
        .json(&json!({ "session_id": session.id }))
        .await
        .assert_status_ok();

    let (name, value) = user_header(&alice);
    server
        .post("/api/queue/heartbeat")
        .add_header(name, value)
        .json(&json!({ "session_id": session.id }))
        .await
        .assert_status(StatusCode::NO_CONTENT);

    for expected in [StatusCode::NO_CONTENT, StatusCode::NOT_FOUND] {
        let (name, value) = user_header(&alice);
        server
            .delete(&format!("/api/queue/leave/{}", session.id))
            .add_header(name, value)
            .await
            .assert_status(expected);
    }
}

#[tokio::test]
async fn order_can_be_created_read_and_paid() {
    let h = Harness::new();
    let session = h.open_session();
    let ticket_type = h.ticket_type(&session, 10);
    let server = server(&h);
    let alice = buyer(MembershipTier::Premium);

    let (name, value) = user_header(&alice);
    let (tier_name, tier_value) = tier_header("premium");
    let response = server
        .post("/api/orders")
        .add_header(name, value)
        .add_header(tier_name, tier_value)
        .json(&request(&session, &ticket_type, 2))
        .await;
    response.assert_status(StatusCode::CREATED);
    let order: Value = response.json();
    assert_eq!(order["status"], "pending");
    assert_eq!(order["tickets"].as_array().map(Vec::len), Some(2));
    let order_id = order["id"].as_str().unwrap().to_string();

    let (name, value) = user_header(&alice);
    server
        .get(&format!("/api/orders/{order_id}"))
        .add_header(name, value)
        .await
        .assert_status_ok();

    let (name, value) = user_header(&buyer(MembershipTier::Basic));
    let response = server.get(&format!("/api/orders/{order_id}")).add_header(name, value).await;
    response.assert_status(StatusCode::FORBIDDEN);

    let (name, value) = user_header(&alice);
    let response = server
        .post(&format!("/api/orders/{order_id}/payment"))
        .add_header(name, value)
        .json(&json!({ "payment_method": { "type": "credit_card", "last_four": "4242" } }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "paid");

    let (name, value) = user_header(&alice);
    let response = server
        .post(&format!("/api/orders/{order_id}/payment"))
        .add_header(name, value)
        .json(&json!({ "payment_method": { "type": "wallet" } }))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(response.json::<Value>()["code"], "ORDER_ALREADY_SETTLED");
}

#[tokio::test]
async fn ordering_without_a_slot_is_forbidden() {
    let h = Harness::new();
    let session = h.gated_session(10, 1, 15);
    let ticket_type = h.ticket_type(&session, 10);
    let server = server(&h);

    let (name, value) = user_header(&buyer(MembershipTier::Basic));
    let response = server
        .post("/api/orders")
        .add_header(name, value)
        .json(&request(&session, &ticket_type, 1))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    assert_eq!(response.json::<Value>()["code"], "NOT_ADMITTED");
}

#[tokio::test]
async fn health_and_readiness() {
    let h = Harness::new();
    let server = server(&h);

    server.get("/health").await.assert_status_ok();

    let response = server.get("/ready").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["ready"], true);
    assert_eq!(body["degraded"], false);

    h.fast.set_available(false);
    let response = server.get("/ready").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["ready"], true);
    assert_eq!(body["fast_store"], false);

    h.ledger.set_available(false);
    server.get("/ready").await.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}
