//! Health check endpoints.
//!
//! `/health` is a liveness probe; `/ready` pings every backend.

use super::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
}

/// Health check endpoint.
///
/// Returns 200 OK if the process is running. Dependencies are not checked.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"ok","version":"0.1.0"}
/// ```
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }),
    )
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// Overall readiness status
    pub ready: bool,
    /// Queue ledger reachable
    pub ledger: bool,
    /// Order store reachable
    pub orders: bool,
    /// Fast queue store reachable
    pub fast_store: bool,
    /// Fast store circuit is open
    pub degraded: bool,
}

/// Readiness check endpoint.
///
/// The durable stores are required. A fast store outage is reported but does not make the
/// service unready: admission keeps running on the ledger.
///
/// ```bash
/// curl http://localhost:8080/ready
/// # {"ready":true,"ledger":true,"orders":true,"fast_store":true,"degraded":false}
/// ```
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let (ledger, orders, fast_store) =
        tokio::join!(state.ledger.ping(), state.orders.ping(), state.mirror.ping());

    for (backend, result) in [("ledger", &ledger), ("orders", &orders), ("fast_store", &fast_store)] {
        if let Err(error) = result {
            tracing::warn!(backend, %error, "Readiness probe failed");
        }
    }

    let response = ReadinessResponse {
        ready: ledger.is_ok() && orders.is_ok(),
        ledger: ledger.is_ok(),
        orders: orders.is_ok(),
        fast_store: fast_store.is_ok(),
        degraded: state.mirror.is_degraded(),
    };
    let status = if response.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
