//! Error type for HTTP handlers.
//!
//! Every service error maps to a status code, a stable machine-readable code and a
//! `details` object carrying whatever the client needs to decide whether to retry, wait
//! or give up.

use crate::services::{AdmissionError, PaymentError, ReservationError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;

/// Application error returned by handlers.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Value,
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: Value::Null,
            source: None,
        }
    }

    /// Attaches structured detail.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Attaches the underlying error for logging.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// 401 Unauthorized.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    /// 404 Not Found.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{resource} with id {id} not found"),
        )
    }

    /// 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR", message)
    }

    /// 503 Service Unavailable.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }

    /// HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    details: Value,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Internal server error"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

fn store_failure(err: fairsale_core::StoreError) -> AppError {
    if err.is_unavailable() {
        AppError::unavailable("A backing store is unavailable, retry shortly").with_source(err)
    } else {
        AppError::internal("An internal error occurred").with_source(err)
    }
}

impl From<AdmissionError> for AppError {
    fn from(err: AdmissionError) -> Self {
        let message = err.to_string();
        match err {
            AdmissionError::SessionNotFound(id) => Self::not_found("Session", id),
            AdmissionError::SaleClosed(session_id) => {
                Self::new(StatusCode::GONE, "SALE_CLOSED", message)
                    .with_details(json!({ "session_id": session_id }))
            }
            AdmissionError::CapacityExceeded {
                max_capacity,
                occupancy,
            } => Self::new(StatusCode::SERVICE_UNAVAILABLE, "CAPACITY_EXCEEDED", message)
                .with_details(json!({ "max_capacity": max_capacity, "occupancy": occupancy })),
            AdmissionError::NotActive => Self::new(StatusCode::CONFLICT, "NOT_ACTIVE", message),
            AdmissionError::NotInQueue => Self::new(StatusCode::NOT_FOUND, "NOT_IN_QUEUE", message),
            AdmissionError::Store(err) => store_failure(err),
        }
    }
}

impl From<ReservationError> for AppError {
    fn from(err: ReservationError) -> Self {
        let message = err.to_string();
        match err {
            ReservationError::InvalidRequest(_) => Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message),
            ReservationError::SessionNotFound(id) => Self::not_found("Session", id),
            ReservationError::UnknownTicketType(id) => Self::not_found("Ticket type", id),
            ReservationError::NotAdmitted { session_id } => {
                Self::new(StatusCode::FORBIDDEN, "NOT_ADMITTED", message)
                    .with_details(json!({ "session_id": session_id }))
            }
            ReservationError::SlotExpired { expired_at } => {
                Self::new(StatusCode::FORBIDDEN, "SLOT_EXPIRED", message)
                    .with_details(json!({ "expired_at": expired_at }))
            }
            ReservationError::DuplicatePendingOrder { order_id } => {
                Self::new(StatusCode::CONFLICT, "DUPLICATE_PENDING_ORDER", message)
                    .with_details(json!({ "order_id": order_id }))
            }
            ReservationError::PurchaseCooldown { retry_after_secs } => {
                Self::new(StatusCode::TOO_MANY_REQUESTS, "PURCHASE_COOLDOWN", message)
                    .with_details(json!({ "retry_after_secs": retry_after_secs }))
            }
            ReservationError::OutOfSaleWindow {
                ticket_type_id,
                opens_at,
                closes_at,
            } => Self::new(StatusCode::UNPROCESSABLE_ENTITY, "OUT_OF_SALE_WINDOW", message).with_details(
                json!({ "ticket_type_id": ticket_type_id, "opens_at": opens_at, "closes_at": closes_at }),
            ),
            ReservationError::EarlyAccessRestricted {
                ticket_type_id,
                required_tier,
                public_sale_at,
            } => Self::new(StatusCode::FORBIDDEN, "EARLY_ACCESS_RESTRICTED", message).with_details(json!({
                "ticket_type_id": ticket_type_id,
                "required_tier": required_tier,
                "public_sale_at": public_sale_at,
            })),
            ReservationError::QuantityOutOfRange {
                ticket_type_id,
                requested,
                min,
                max,
            } => Self::new(StatusCode::UNPROCESSABLE_ENTITY, "QUANTITY_OUT_OF_RANGE", message).with_details(
                json!({ "ticket_type_id": ticket_type_id, "requested": requested, "min": min, "max": max }),
            ),
            ReservationError::InventoryUnavailable {
                ticket_type_id,
                requested,
                remaining,
            } => Self::new(StatusCode::CONFLICT, "INVENTORY_UNAVAILABLE", message).with_details(
                json!({ "ticket_type_id": ticket_type_id, "requested": requested, "remaining": remaining }),
            ),
            ReservationError::CouponInvalid(rejection) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, "COUPON_INVALID", message)
                    .with_details(serde_json::to_value(&rejection).unwrap_or(Value::Null))
            }
            ReservationError::LockContention { .. } | ReservationError::LockUnavailable(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "LOCK_CONTENTION", "System busy, retry shortly")
                    .with_details(json!({ "retryable": true }))
            }
            ReservationError::TicketCodeGeneration { attempts } => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "TICKET_CODE_GENERATION", message)
                    .with_details(json!({ "attempts": attempts }))
            }
            ReservationError::Store(err) => store_failure(err),
        }
    }
}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        let message = err.to_string();
        match err {
            PaymentError::NotFound(id) => Self::not_found("Order", id),
            PaymentError::NotOwner(_) => Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message),
            PaymentError::AlreadySettled { order_id, status } => {
                Self::new(StatusCode::CONFLICT, "ORDER_ALREADY_SETTLED", message)
                    .with_details(json!({ "order_id": order_id, "status": status }))
            }
            PaymentError::InProgress(order_id) => {
                Self::new(StatusCode::CONFLICT, "PAYMENT_IN_PROGRESS", message)
                    .with_details(json!({ "order_id": order_id, "retryable": true }))
            }
            PaymentError::ReservationLapsed { reserved_until } => {
                Self::new(StatusCode::GONE, "RESERVATION_LAPSED", message)
                    .with_details(json!({ "reserved_until": reserved_until }))
            }
            PaymentError::GatewayUnavailable(source) => {
                Self::new(StatusCode::BAD_GATEWAY, "PAYMENT_GATEWAY_UNAVAILABLE", message).with_source(source)
            }
            PaymentError::Store(err) => store_failure(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairsale_core::coupon::CouponRejection;
    use fairsale_core::ids::SessionId;

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn capacity_exceeded_is_not_retryable_detail() {
        let err = AppError::from(AdmissionError::CapacityExceeded {
            max_capacity: 2,
            occupancy: 2,
        });
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), "CAPACITY_EXCEEDED");
        assert_eq!(err.details["max_capacity"], 2);
    }

    #[test]
    fn lock_contention_is_transient() {
        let err = AppError::from(ReservationError::LockContention {
            key: "reserve:session:x".to_string(),
        });
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.details["retryable"], true);
    }

    #[test]
    fn coupon_rejection_carries_its_reason() {
        let err = AppError::from(ReservationError::CouponInvalid(CouponRejection::UsageExhausted { limit: 1 }));
        assert_eq!(err.code(), "COUPON_INVALID");
        assert_eq!(err.details["reason"], "usage_exhausted");
        assert_eq!(err.details["limit"], 1);
    }

    #[test]
    fn store_outage_maps_to_unavailable() {
        let err = AppError::from(AdmissionError::Store(fairsale_core::StoreError::Unavailable(
            "down".to_string(),
        )));
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);

        let err = AppError::from(AdmissionError::SessionNotFound(SessionId::new()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn payment_in_progress_is_a_retryable_conflict() {
        let err = AppError::from(PaymentError::InProgress(fairsale_core::OrderId::new()));
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "PAYMENT_IN_PROGRESS");
        assert_eq!(err.details["retryable"], true);
    }
}
