//! Router configuration.

use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::api::{orders, queue};
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// - `/health`, `/ready`: probes (no identity required)
/// - `/api/queue/*`: waiting room
/// - `/api/orders/*`: reservation and payment
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Waiting room
        .route("/queue/join", post(queue::join_queue))
        .route("/queue/status/:session_id", get(queue::queue_status))
        .route("/queue/heartbeat", post(queue::heartbeat))
        .route("/queue/leave/:session_id", delete(queue::leave_queue))
        .route("/queue/statistics/:session_id", get(queue::queue_statistics))
        // Orders
        .route("/orders", post(orders::create_order))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/payment", post(orders::pay_order));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
