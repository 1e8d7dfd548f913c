//! Orders, line items and individual tickets.

use crate::ids::{CouponId, EventId, OrderId, OrderItemId, SessionId, TicketId, TicketTypeId, UserId};
use crate::money::Money;
use crate::pricing::PriceBreakdown;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order status
///
/// `pending → {processing, cancelled}`, `processing → {paid, failed, pending}`,
/// `paid → refunded`. A `processing` order is claimed by one payment attempt; the
/// reservation reaper leaves it alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Reserved, awaiting payment until `reserved_until`.
    Pending,
    /// Claimed by a payment attempt that has not settled yet.
    Processing,
    /// Paid.
    Paid,
    /// Payment rejected.
    Failed,
    /// Reservation lapsed or cancelled.
    Cancelled,
    /// Refunded after payment.
    Refunded,
}

impl OrderStatus {
    /// Returns `true` if the transition `self -> next` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing | Self::Cancelled)
                | (Self::Processing, Self::Paid | Self::Failed | Self::Pending)
                | (Self::Paid, Self::Refunded)
        )
    }

    /// Database/string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// Ticket status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    /// Issued and usable.
    Valid,
    /// Checked in.
    Used,
    /// Voided with its order.
    Cancelled,
}

impl TicketStatus {
    /// Database/string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Used => "used",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "valid" => Ok(Self::Valid),
            "used" => Ok(Self::Used),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown ticket status: {other}")),
        }
    }
}

/// Buyer contact details attached to an order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    /// Full name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Phone number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// One ticket type on an order, with a price snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Line id.
    pub id: OrderItemId,
    /// Ticket type.
    pub ticket_type_id: TicketTypeId,
    /// Units.
    pub quantity: u32,
    /// Unit price at reservation time.
    pub unit_price: Money,
}

impl OrderItem {
    /// `unit_price × quantity`, saturating.
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price
            .checked_multiply(self.quantity)
            .unwrap_or(Money::from_cents(u64::MAX))
    }
}

/// An individually check-in-able ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket id.
    pub id: TicketId,
    /// Line item the ticket belongs to.
    pub order_item_id: OrderItemId,
    /// Ticket type.
    pub ticket_type_id: TicketTypeId,
    /// Globally unique code.
    pub code: String,
    /// Status.
    pub status: TicketStatus,
}

/// An order with its items and tickets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order id.
    pub id: OrderId,
    /// Buyer.
    pub user_id: UserId,
    /// Event.
    pub event_id: EventId,
    /// Sale session.
    pub session_id: SessionId,
    /// Status.
    pub status: OrderStatus,
    /// Price components.
    pub pricing: PriceBreakdown,
    /// Coupon applied, if any.
    pub coupon_id: Option<CouponId>,
    /// Contact details.
    pub customer: CustomerInfo,
    /// Line items.
    pub items: Vec<OrderItem>,
    /// Tickets, `sum(items.quantity)` of them.
    pub tickets: Vec<Ticket>,
    /// Payment deadline; inventory is held until then.
    pub reserved_until: DateTime<Utc>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Payment time.
    pub paid_at: Option<DateTime<Utc>>,
    /// Gateway transaction id.
    pub payment_transaction_id: Option<String>,
    /// Cancellation or failure time.
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Holds its inventory for the buyer: pending within its reservation, or claimed by a
    /// payment attempt.
    #[must_use]
    pub fn is_reservation_live(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            OrderStatus::Pending => self.reserved_until > now,
            OrderStatus::Processing => true,
            _ => false,
        }
    }

    /// Total units across line items.
    #[must_use]
    pub fn ticket_count(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }

    /// Voids every ticket of the order.
    pub fn cancel_tickets(&mut self) {
        for ticket in &mut self.tickets {
            ticket.status = TicketStatus::Cancelled;
        }
    }
}

/// Payment method
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Credit card payment
    CreditCard {
        /// Last four digits of card
        last_four: String,
    },
    /// Bank transfer
    BankTransfer {
        /// Bank code
        bank_code: String,
    },
    /// Mobile wallet
    Wallet,
}

/// Result reported by the payment collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// Charged.
    Succeeded {
        /// Gateway transaction id.
        transaction_id: String,
    },
    /// Declined or errored.
    Failed {
        /// Failure reason.
        reason: String,
    },
}
