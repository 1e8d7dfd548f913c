//! Application state for the HTTP server.
//!
//! Holds the services handlers call plus the raw backends the readiness probe pings.

use crate::services::{AdmissionController, PaymentService, QueueMirror, ReservationEngine};
use fairsale_core::ledger::QueueLedger;
use fairsale_core::store::OrderStore;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Every field is a cheap handle; the state is cloned per request.
#[derive(Clone)]
pub struct AppState {
    /// Waiting-room operations
    pub admission: AdmissionController,
    /// Order creation
    pub reservations: ReservationEngine,
    /// Order lookup and payment
    pub payments: PaymentService,
    /// Durable queue ledger
    pub ledger: Arc<dyn QueueLedger>,
    /// Durable order store
    pub orders: Arc<dyn OrderStore>,
    /// Fast queue store
    pub mirror: QueueMirror,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(
        admission: AdmissionController,
        reservations: ReservationEngine,
        payments: PaymentService,
        ledger: Arc<dyn QueueLedger>,
        orders: Arc<dyn OrderStore>,
        mirror: QueueMirror,
    ) -> Self {
        Self {
            admission,
            reservations,
            payments,
            ledger,
            orders,
            mirror,
        }
    }
}
