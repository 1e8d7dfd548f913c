//! Waiting-room endpoints.
//!
//! - `POST /api/queue/join` - Enter a session's waiting room
//! - `GET /api/queue/status/:session_id` - Current admission state
//! - `POST /api/queue/heartbeat` - Keep an active slot alive
//! - `DELETE /api/queue/leave/:session_id` - Leave the waiting room
//! - `GET /api/queue/statistics/:session_id` - Operator statistics

use super::error::AppError;
use crate::server::state::AppState;
use crate::services::{AdmissionState, Buyer, QueueStatistics};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use fairsale_core::{QueueStatus, SessionId};
use serde::{Deserialize, Serialize};

/// Body of join and heartbeat requests.
#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    /// Sale session.
    pub session_id: SessionId,
}

/// Admission state as returned to clients.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct QueueStateResponse {
    /// `active`, `waiting`, `finished`, `not_in_queue` or `open`.
    pub status: &'static str,
    /// The user may create an order now.
    pub can_purchase: bool,
    /// 1-based position while waiting.
    pub queue_position: Option<u64>,
    /// Estimated wait while waiting.
    pub estimated_wait_minutes: Option<u64>,
    /// Slot deadline while active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// Terminal status of the last lifecycle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_status: Option<QueueStatus>,
}

impl From<AdmissionState> for QueueStateResponse {
    fn from(state: AdmissionState) -> Self {
        let can_purchase = state.can_purchase();
        let base = Self {
            status: "open",
            can_purchase,
            queue_position: None,
            estimated_wait_minutes: None,
            expires_at: None,
            final_status: None,
        };
        match state {
            AdmissionState::Active { expires_at } => Self {
                status: "active",
                queue_position: Some(0),
                estimated_wait_minutes: Some(0),
                expires_at: Some(expires_at),
                ..base
            },
            AdmissionState::Waiting {
                position,
                estimated_wait_minutes,
            } => Self {
                status: "waiting",
                queue_position: Some(position),
                estimated_wait_minutes: Some(estimated_wait_minutes),
                ..base
            },
            AdmissionState::Finished { status } => Self {
                status: "finished",
                final_status: Some(status),
                ..base
            },
            AdmissionState::NotInQueue => Self {
                status: "not_in_queue",
                ..base
            },
            AdmissionState::Open => base,
        }
    }
}

/// Join a session's waiting room.
///
/// Returns the slot right away if one is free, otherwise the queue position. Joining
/// again is idempotent.
///
/// # Errors
///
/// - 404 if the session does not exist
/// - 410 if the sale has closed
/// - 503 `CAPACITY_EXCEEDED` if the waiting room is full
pub async fn join_queue(
    State(state): State<AppState>,
    buyer: Buyer,
    Json(request): Json<SessionRequest>,
) -> Result<Json<QueueStateResponse>, AppError> {
    let admission = state
        .admission
        .join(request.session_id, buyer.user_id, buyer.tier)
        .await?;
    Ok(Json(admission.into()))
}

/// Current admission state.
///
/// # Errors
///
/// 404 if the session does not exist.
pub async fn queue_status(
    State(state): State<AppState>,
    buyer: Buyer,
    Path(session_id): Path<SessionId>,
) -> Result<Json<QueueStateResponse>, AppError> {
    let admission = state.admission.status(session_id, buyer.user_id).await?;
    Ok(Json(admission.into()))
}

/// Record a heartbeat for an active slot. Does not extend the slot.
///
/// # Errors
///
/// 409 `NOT_ACTIVE` if the user holds no live slot.
pub async fn heartbeat(
    State(state): State<AppState>,
    buyer: Buyer,
    Json(request): Json<SessionRequest>,
) -> Result<StatusCode, AppError> {
    state.admission.heartbeat(request.session_id, buyer.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Leave the waiting room.
///
/// # Errors
///
/// 404 `NOT_IN_QUEUE` if the user has no live entry.
pub async fn leave_queue(
    State(state): State<AppState>,
    buyer: Buyer,
    Path(session_id): Path<SessionId>,
) -> Result<StatusCode, AppError> {
    state.admission.leave(session_id, buyer.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Waiting-room statistics.
///
/// # Errors
///
/// 404 if the session does not exist or has no waiting room.
pub async fn queue_statistics(
    State(state): State<AppState>,
    _buyer: Buyer,
    Path(session_id): Path<SessionId>,
) -> Result<Json<QueueStatistics>, AppError> {
    Ok(Json(state.admission.statistics(session_id).await?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn waiting_state_exposes_position() {
        let response = QueueStateResponse::from(AdmissionState::Waiting {
            position: 3,
            estimated_wait_minutes: 45,
        });
        assert_eq!(response.status, "waiting");
        assert!(!response.can_purchase);
        assert_eq!(response.queue_position, Some(3));
        assert_eq!(response.expires_at, None);
    }

    #[test]
    fn active_state_can_purchase() {
        let expires_at = Utc.with_ymd_and_hms(2030, 1, 1, 12, 15, 0).unwrap();
        let response = QueueStateResponse::from(AdmissionState::Active { expires_at });
        assert!(response.can_purchase);
        assert_eq!(response.expires_at, Some(expires_at));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "active");
        assert!(json.get("final_status").is_none());
    }

    #[test]
    fn finished_state_reports_its_final_status_once() {
        let response = QueueStateResponse::from(AdmissionState::Finished {
            status: QueueStatus::Completed,
        });
        assert!(!response.can_purchase);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "finished");
        assert_eq!(json["final_status"], "completed");
        assert!(json.get("expires_at").is_none());
    }
}
