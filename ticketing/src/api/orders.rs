//! Order endpoints.
//!
//! - `POST /api/orders` - Reserve tickets (requires an active slot or an open session)
//! - `GET /api/orders/:id` - Order with items and tickets (owner only)
//! - `POST /api/orders/:id/payment` - Pay a pending order
//!
//! # Order Flow
//!
//! ```text
//! pending ──pay ok──▶ paid
//!    │  └──declined──▶ failed     (tickets cancelled, stock restored)
//!    └──reserved_until passed──▶ cancelled (order reaper)
//! ```

use super::error::AppError;
use crate::server::state::AppState;
use crate::services::{Buyer, OrderRequest};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use fairsale_core::order::{Order, PaymentMethod};
use fairsale_core::OrderId;
use serde::Deserialize;

/// Payment request body.
#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    /// How to charge the order.
    pub payment_method: PaymentMethod,
}

/// Reserve tickets.
///
/// Returns 201 with the pending order, its tickets and `reserved_until`.
///
/// # Errors
///
/// Every rejection carries a machine code and structured `details`; see
/// [`AppError`](super::error::AppError). `LOCK_CONTENTION` (503) is safe to retry.
pub async fn create_order(
    State(state): State<AppState>,
    buyer: Buyer,
    Json(request): Json<OrderRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let order = state.reservations.create_order(buyer, request).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// Get an order.
///
/// # Errors
///
/// 404 if missing, 403 if owned by someone else.
pub async fn get_order(
    State(state): State<AppState>,
    buyer: Buyer,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.payments.order(buyer, order_id).await?))
}

/// Pay a pending order.
///
/// A declined charge returns 200 with the order in `failed` status.
///
/// # Errors
///
/// 409 if already settled or another payment is in flight, 410 if the reservation lapsed,
/// 502 if the gateway failed.
pub async fn pay_order(
    State(state): State<AppState>,
    buyer: Buyer,
    Path(order_id): Path<OrderId>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .payments
        .pay(buyer, order_id, request.payment_method)
        .await?;
    Ok(Json(order))
}
