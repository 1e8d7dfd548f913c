//! Catalog rows consumed from the event administration: sale sessions and ticket types.
//!
//! The rules here are pure: given a ticket type, a buyer tier, a quantity and the
//! current time they decide whether the request may proceed. Inventory is re-checked
//! under the row lock when the reservation commits.

use crate::ids::{EventId, SessionId, TicketTypeId};
use crate::membership::MembershipTier;
use crate::money::Money;
use crate::queue::WaitingRoomConfig;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One sale session of an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleSession {
    /// Session id.
    pub id: SessionId,
    /// Owning event.
    pub event_id: EventId,
    /// Waiting-room settings, if the session is gated.
    pub waiting_room: Option<WaitingRoomConfig>,
    /// When the last ticket type of the session stops selling.
    pub sale_closes_at: Option<DateTime<Utc>>,
}

impl SaleSession {
    /// The waiting room, if present and enabled.
    #[must_use]
    pub fn admission(&self) -> Option<&WaitingRoomConfig> {
        self.waiting_room.as_ref().filter(|config| config.is_enabled)
    }

    /// Whether the sale window has fully closed.
    #[must_use]
    pub fn sale_closed(&self, now: DateTime<Utc>) -> bool {
        self.sale_closes_at.is_some_and(|at| at <= now)
    }
}

/// A price tier within a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketType {
    /// Ticket type id.
    pub id: TicketTypeId,
    /// Owning session.
    pub session_id: SessionId,
    /// Display name.
    pub name: String,
    /// Unit price.
    pub price: Money,
    /// Total inventory.
    pub total_quantity: u32,
    /// Sold (or reserved) units. Never exceeds `total_quantity`.
    pub sold_quantity: u32,
    /// Public sale start.
    pub sale_start_time: DateTime<Utc>,
    /// Sale end.
    pub sale_end_time: DateTime<Utc>,
    /// Minutes before `sale_start_time` during which premium members may buy.
    pub premium_early_access_minutes: u32,
    /// Minimum quantity per order.
    pub min_per_order: u32,
    /// Maximum quantity per order during the public sale.
    pub max_per_order: u32,
}

/// Where a ticket type's sale stands at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SalePhase {
    /// Before the early-access window (or public start if there is none).
    NotStarted,
    /// Inside the premium early-access window.
    EarlyAccess,
    /// Public sale.
    Public,
    /// After the sale end.
    Ended,
}

/// Why a ticket type rejected a purchase request.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PurchaseRuleViolation {
    /// Outside `[sale_start - early_access, sale_end]`.
    #[error("ticket type is not on sale (window {opens_at} .. {closes_at})")]
    OutOfSaleWindow {
        /// Earliest instant anyone may buy.
        opens_at: DateTime<Utc>,
        /// Sale end.
        closes_at: DateTime<Utc>,
    },
    /// Inside the early-access window without the required tier.
    #[error("early access requires the {required_tier} tier until {public_sale_at}")]
    EarlyAccessRestricted {
        /// Tier that may buy now.
        required_tier: MembershipTier,
        /// When the public sale opens.
        public_sale_at: DateTime<Utc>,
    },
    /// Quantity outside the per-order bounds.
    #[error("quantity {requested} outside allowed range {min}..={max}")]
    QuantityOutOfRange {
        /// Requested quantity.
        requested: u32,
        /// Minimum per order.
        min: u32,
        /// Maximum per order in the current phase.
        max: u32,
    },
    /// Not enough stock.
    #[error("only {remaining} tickets remaining, {requested} requested")]
    InventoryUnavailable {
        /// Requested quantity.
        requested: u32,
        /// Remaining stock.
        remaining: u32,
    },
}

impl TicketType {
    /// Units still available.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.total_quantity.saturating_sub(self.sold_quantity)
    }

    /// Start of the premium early-access window.
    #[must_use]
    pub fn early_access_start(&self) -> DateTime<Utc> {
        self.sale_start_time - Duration::minutes(i64::from(self.premium_early_access_minutes))
    }

    /// Sale phase at `now`.
    #[must_use]
    pub fn phase(&self, now: DateTime<Utc>) -> SalePhase {
        if now > self.sale_end_time {
            SalePhase::Ended
        } else if now >= self.sale_start_time {
            SalePhase::Public
        } else if self.premium_early_access_minutes > 0 && now >= self.early_access_start() {
            SalePhase::EarlyAccess
        } else {
            SalePhase::NotStarted
        }
    }

    /// Checks the sale window, tier and quantity rules for one order line.
    ///
    /// During early access the per-order maximum is the smaller of `max_per_order` and
    /// `early_access_max`.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn check_purchase(
        &self,
        tier: MembershipTier,
        quantity: u32,
        now: DateTime<Utc>,
        early_access_max: u32,
    ) -> Result<(), PurchaseRuleViolation> {
        let max = match self.phase(now) {
            SalePhase::NotStarted | SalePhase::Ended => {
                return Err(PurchaseRuleViolation::OutOfSaleWindow {
                    opens_at: self.early_access_start(),
                    closes_at: self.sale_end_time,
                });
            }
            SalePhase::EarlyAccess if !tier.has_early_access() => {
                return Err(PurchaseRuleViolation::EarlyAccessRestricted {
                    required_tier: MembershipTier::Premium,
                    public_sale_at: self.sale_start_time,
                });
            }
            SalePhase::EarlyAccess => self.max_per_order.min(early_access_max),
            SalePhase::Public => self.max_per_order,
        };

        let min = self.min_per_order.max(1);
        if quantity < min || quantity > max {
            return Err(PurchaseRuleViolation::QuantityOutOfRange {
                requested: quantity,
                min,
                max,
            });
        }

        let remaining = self.remaining();
        if quantity > remaining {
            return Err(PurchaseRuleViolation::InventoryUnavailable {
                requested: quantity,
                remaining,
            });
        }
        Ok(())
    }
}
