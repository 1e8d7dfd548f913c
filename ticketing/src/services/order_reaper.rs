//! Cancels reservations that were never paid.

use super::admission::AdmissionController;
use crate::metrics;
use async_trait::async_trait;
use fairsale_core::environment::Clock;
use fairsale_core::error::StoreError;
use fairsale_core::order::Order;
use fairsale_core::store::OrderStore;
use fairsale_core::QueueStatus;
use fairsale_runtime::PeriodicTask;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Cancels pending orders past `reserved_until`, restores their inventory and frees the
/// buyers' slots.
pub struct OrderReaperTask {
    orders: Arc<dyn OrderStore>,
    admission: AdmissionController,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl OrderReaperTask {
    /// Creates the task.
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        admission: AdmissionController,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            orders,
            admission,
            clock,
            interval,
        }
    }

    /// One pass. Returns the cancelled orders.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the order store fails. Slot release failures are logged.
    pub async fn reap(&self) -> Result<Vec<Order>, StoreError> {
        let cancelled = self.orders.expire_pending(self.clock.now()).await?;
        let mut sessions = BTreeSet::new();

        for order in &cancelled {
            metrics::record_order("expired");
            tracing::info!(
                order_id = %order.id,
                user_id = %order.user_id,
                session_id = %order.session_id,
                tickets = order.ticket_count(),
                "Reservation expired, inventory restored"
            );
            match self
                .admission
                .retire_slot(order.session_id, order.user_id, QueueStatus::Expired)
                .await
            {
                Ok(_) => {
                    sessions.insert(order.session_id);
                }
                Err(err) => {
                    tracing::warn!(order_id = %order.id, error = %err, "Failed to expire slot of lapsed order");
                }
            }
        }

        for session in sessions {
            self.admission.promote_quietly(session).await;
        }
        Ok(cancelled)
    }
}

#[async_trait]
impl PeriodicTask for OrderReaperTask {
    fn name(&self) -> &'static str {
        "order-reaper"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self) -> anyhow::Result<()> {
        self.reap().await?;
        Ok(())
    }
}
