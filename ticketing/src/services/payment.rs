//! Order lookup and payment settlement.

use super::admission::AdmissionController;
use super::reservation::Buyer;
use crate::metrics;
use crate::payment_gateway::{PaymentGateway, PaymentGatewayError};
use chrono::{DateTime, Utc};
use fairsale_core::environment::Clock;
use fairsale_core::error::StoreError;
use fairsale_core::ids::OrderId;
use fairsale_core::order::{Order, OrderStatus, PaymentMethod, PaymentOutcome};
use fairsale_core::store::OrderStore;
use fairsale_core::QueueStatus;
use std::sync::Arc;
use thiserror::Error;

/// Payment errors.
#[derive(Error, Debug)]
pub enum PaymentError {
    /// No such order.
    #[error("order {0} not found")]
    NotFound(OrderId),

    /// The order belongs to someone else.
    #[error("order {0} belongs to another user")]
    NotOwner(OrderId),

    /// Another payment attempt holds the order.
    #[error("payment of order {0} is already in progress")]
    InProgress(OrderId),

    /// The order is no longer pending.
    #[error("order {order_id} is already {status}")]
    AlreadySettled {
        /// Order.
        order_id: OrderId,
        /// Current status.
        status: OrderStatus,
    },

    /// The reservation ran out before payment.
    #[error("reservation ended at {reserved_until}")]
    ReservationLapsed {
        /// Reservation deadline.
        reserved_until: DateTime<Utc>,
    },

    /// The gateway could not be reached; the order stays pending.
    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(PaymentGatewayError),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Reads orders and settles them through the payment gateway.
#[derive(Clone)]
pub struct PaymentService {
    orders: Arc<dyn OrderStore>,
    gateway: Arc<dyn PaymentGateway>,
    admission: AdmissionController,
    clock: Arc<dyn Clock>,
}

impl PaymentService {
    /// Creates the service.
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        gateway: Arc<dyn PaymentGateway>,
        admission: AdmissionController,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            orders,
            gateway,
            admission,
            clock,
        }
    }

    /// Loads an order owned by `buyer`.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::NotFound`] or [`PaymentError::NotOwner`].
    pub async fn order(&self, buyer: Buyer, order_id: OrderId) -> Result<Order, PaymentError> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or(PaymentError::NotFound(order_id))?;
        if order.user_id != buyer.user_id {
            return Err(PaymentError::NotOwner(order_id));
        }
        Ok(order)
    }

    /// Charges a pending order and records the outcome.
    ///
    /// The order is claimed (`pending → processing`) before the gateway is called, so a
    /// concurrent attempt or the reservation reaper cannot touch it mid-charge. A declined
    /// charge is not an error: the order comes back `failed` with its tickets cancelled and
    /// inventory restored. Either outcome releases the buyer's slot. A gateway failure
    /// hands the claim back and leaves the order pending.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::AlreadySettled`], [`PaymentError::InProgress`],
    /// [`PaymentError::ReservationLapsed`], [`PaymentError::GatewayUnavailable`] or a
    /// lookup/storage error.
    pub async fn pay(
        &self,
        buyer: Buyer,
        order_id: OrderId,
        method: PaymentMethod,
    ) -> Result<Order, PaymentError> {
        self.order(buyer, order_id).await?;
        let order = match self.orders.claim_payment(order_id, self.clock.now()).await {
            Ok(order) => order,
            Err(StoreError::Conflict(_)) => return Err(self.refusal(order_id).await),
            Err(err) => return Err(err.into()),
        };

        let outcome = match self.gateway.charge(order_id, order.pricing.total, method).await {
            Ok(transaction) => PaymentOutcome::Succeeded {
                transaction_id: transaction.transaction_id,
            },
            Err(err) if err.is_decline() => PaymentOutcome::Failed {
                reason: err.to_string(),
            },
            Err(err) => {
                tracing::error!(order_id = %order_id, error = %err, "Payment gateway failure");
                if let Err(release) = self.orders.release_payment_claim(order_id).await {
                    tracing::warn!(order_id = %order_id, error = %release, "Failed to release payment claim");
                }
                return Err(PaymentError::GatewayUnavailable(err));
            }
        };

        let settled = match self
            .orders
            .finalize_payment(order_id, &outcome, self.clock.now())
            .await
        {
            Ok(settled) => settled,
            Err(StoreError::Conflict(_)) => return Err(self.refusal(order_id).await),
            Err(err) => return Err(err.into()),
        };

        match self
            .admission
            .retire_slot(settled.session_id, settled.user_id, QueueStatus::Completed)
            .await
        {
            Ok(true) => self.admission.promote_quietly(settled.session_id).await,
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(order_id = %order_id, error = %err, "Failed to release slot after payment");
            }
        }

        let label = if settled.status == OrderStatus::Paid {
            "paid"
        } else {
            "payment_failed"
        };
        metrics::record_order(label);
        tracing::info!(
            order_id = %order_id,
            user_id = %settled.user_id,
            status = %settled.status,
            total = settled.pricing.total.cents(),
            "Payment settled"
        );
        Ok(settled)
    }

    /// Explains why an order could not be claimed or settled.
    async fn refusal(&self, order_id: OrderId) -> PaymentError {
        match self.orders.get_order(order_id).await {
            Ok(Some(order)) => match order.status {
                OrderStatus::Processing => PaymentError::InProgress(order_id),
                OrderStatus::Pending => PaymentError::ReservationLapsed {
                    reserved_until: order.reserved_until,
                },
                status => PaymentError::AlreadySettled { order_id, status },
            },
            Ok(None) => PaymentError::NotFound(order_id),
            Err(err) => err.into(),
        }
    }
}
