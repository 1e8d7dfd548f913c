//! Business metrics for the waiting room and the reservation path.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `fairsale_queue_joins_total` - Users who entered a waiting room
//! - `fairsale_promotions_total` - Users promoted from waiting to active
//! - `fairsale_slots_expired_total` - Active slots expired by the reaper
//! - `fairsale_orders_total{outcome}` - Reservation and payment outcomes
//! - `fairsale_orders_committed_total` - Reservations committed by the order store
//! - `fairsale_lock_contention_total` - Lock acquisitions that gave up on a held key
//! - `fairsale_fast_store_degraded_total{operation}` - Fast-store calls skipped or failed

use metrics::describe_counter;

/// Registers every metric description.
///
/// Call once at start-up, after the recorder is installed.
pub fn register_business_metrics() {
    describe_counter!(
        "fairsale_queue_joins_total",
        "Total number of users who entered a waiting room"
    );
    describe_counter!(
        "fairsale_promotions_total",
        "Total number of users promoted to an active purchase slot"
    );
    describe_counter!(
        "fairsale_slots_expired_total",
        "Total number of active slots that lapsed without completion"
    );
    describe_counter!(
        "fairsale_orders_total",
        "Reservation and payment outcomes (created, rejected reasons, paid, payment_failed, expired)"
    );
    describe_counter!(
        "fairsale_orders_committed_total",
        "Total number of reservations committed by the durable order store"
    );
    describe_counter!(
        "fairsale_lock_contention_total",
        "Lock acquisitions that ran out of wait budget on a held key"
    );
    describe_counter!(
        "fairsale_fast_store_degraded_total",
        "Fast-store calls that failed or were skipped by the open circuit"
    );

    tracing::info!("Business metrics registered");
}

/// Records a user entering a waiting room.
pub fn record_queue_join() {
    metrics::counter!("fairsale_queue_joins_total").increment(1);
}

/// Records promotions.
pub fn record_promotions(count: usize) {
    if count > 0 {
        metrics::counter!("fairsale_promotions_total").increment(count as u64);
    }
}

/// Records slots expired by the reaper.
pub fn record_slots_expired(count: usize) {
    if count > 0 {
        metrics::counter!("fairsale_slots_expired_total").increment(count as u64);
    }
}

/// Records an order outcome.
pub fn record_order(outcome: &'static str) {
    metrics::counter!("fairsale_orders_total", "outcome" => outcome).increment(1);
    tracing::debug!(outcome, "Recorded order metric");
}

/// Records a fast-store call that failed or was skipped.
pub fn record_fast_store_degraded(operation: &'static str) {
    metrics::counter!("fairsale_fast_store_degraded_total", "operation" => operation).increment(1);
}
