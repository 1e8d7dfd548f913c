//! Mock payment gateway for development and testing.
//!
//! This module provides a simplified payment gateway interface compatible with
//! services like Stripe, `PayPal`, and Apple Pay. In production, this would be
//! replaced with actual payment service integrations.

use fairsale_core::OrderId;
use fairsale_core::money::Money;
use fairsale_core::order::PaymentMethod;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Payment gateway result
pub type GatewayResult<T> = Result<T, PaymentGatewayError>;

/// Payment gateway error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentGatewayError {
    /// Card declined
    #[error("Card declined: {reason}")]
    CardDeclined {
        /// Decline reason
        reason: String,
    },
    /// Insufficient funds
    #[error("Insufficient funds")]
    InsufficientFunds,
    /// Invalid payment method
    #[error("Invalid payment method: {reason}")]
    InvalidPaymentMethod {
        /// Invalid reason
        reason: String,
    },
    /// Gateway timeout
    #[error("Gateway timeout")]
    Timeout,
    /// Other error
    #[error("Payment error: {message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl PaymentGatewayError {
    /// The charge was refused for good; retrying with the same method will not help.
    #[must_use]
    pub const fn is_decline(&self) -> bool {
        matches!(
            self,
            Self::CardDeclined { .. } | Self::InsufficientFunds | Self::InvalidPaymentMethod { .. }
        )
    }
}

/// Payment gateway transaction result
#[derive(Debug, Clone)]
pub struct PaymentTransaction {
    /// Order the charge belongs to
    pub order_id: OrderId,
    /// Gateway transaction ID
    pub transaction_id: String,
    /// Amount charged
    pub amount: Money,
}

/// Payment gateway trait
///
/// Abstraction over payment processors like Stripe, `PayPal`, Apple Pay, etc.
pub trait PaymentGateway: Send + Sync {
    /// Charge an order's total
    ///
    /// # Errors
    ///
    /// Returns error if the charge is declined or the gateway fails
    fn charge(
        &self,
        order_id: OrderId,
        amount: Money,
        payment_method: PaymentMethod,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<PaymentTransaction>> + Send>>;
}

/// Mock payment gateway
///
/// Succeeds for every request unless built with [`MockPaymentGateway::declining`].
#[derive(Clone, Debug)]
pub struct MockPaymentGateway {
    latency: Duration,
    decline_reason: Option<String>,
}

impl MockPaymentGateway {
    /// Creates a mock gateway that approves every charge after a simulated 100ms round trip
    #[must_use]
    pub const fn new() -> Self {
        Self {
            latency: Duration::from_millis(100),
            decline_reason: None,
        }
    }

    /// Creates a mock gateway that declines every charge
    #[must_use]
    pub fn declining(reason: impl Into<String>) -> Self {
        Self {
            decline_reason: Some(reason.into()),
            ..Self::new()
        }
    }

    /// Overrides the simulated network delay
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared() -> Arc<dyn PaymentGateway> {
        Arc::new(Self::new())
    }
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn charge(
        &self,
        order_id: OrderId,
        amount: Money,
        payment_method: PaymentMethod,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<PaymentTransaction>> + Send>> {
        let latency = self.latency;
        let decline_reason = self.decline_reason.clone();
        Box::pin(async move {
            // Simulate network delay
            tokio::time::sleep(latency).await;

            if let Some(reason) = decline_reason {
                tracing::info!(order_id = %order_id, %reason, "Mock payment declined");
                return Err(PaymentGatewayError::CardDeclined { reason });
            }

            let transaction_id = format!("mock_txn_{}", uuid::Uuid::new_v4());
            tracing::info!(
                order_id = %order_id,
                amount = amount.cents(),
                transaction_id = %transaction_id,
                method = ?payment_method,
                "Mock payment processed successfully"
            );

            Ok(PaymentTransaction {
                order_id,
                transaction_id,
                amount,
            })
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn card() -> PaymentMethod {
        PaymentMethod::CreditCard {
            last_four: "4242".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_payment_success() {
        let gateway = MockPaymentGateway::new();
        let order_id = OrderId::new();
        let amount = Money::from_cents(10_000);

        let transaction = gateway.charge(order_id, amount, card()).await.unwrap();

        assert_eq!(transaction.order_id, order_id);
        assert_eq!(transaction.amount, amount);
        assert!(transaction.transaction_id.starts_with("mock_txn_"));
    }

    #[tokio::test]
    async fn test_mock_payment_decline() {
        let gateway = MockPaymentGateway::declining("do not honor").with_latency(Duration::ZERO);

        let err = gateway
            .charge(OrderId::new(), Money::from_cents(100), card())
            .await
            .unwrap_err();

        assert!(err.is_decline());
        assert_eq!(err.to_string(), "Card declined: do not honor");
        assert!(!PaymentGatewayError::Timeout.is_decline());
    }
}
