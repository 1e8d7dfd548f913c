//! Storage error types shared by every backend.

use crate::coupon::CouponRejection;
use crate::ids::TicketTypeId;
use crate::queue::TransitionError;
use thiserror::Error;

/// Errors returned by ledger, fast-store, catalog and order-store backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected or failed the operation.
    #[error("store backend error: {0}")]
    Backend(String),

    /// A status write violated the queue lifecycle.
    #[error(transparent)]
    IllegalTransition(#[from] TransitionError),

    /// A queue number was not greater than the session's current maximum.
    #[error("stale queue number: session counter is already at {current}")]
    StaleSequence {
        /// Highest queue number recorded for the session.
        current: i64,
    },

    /// The row does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The row exists but is in a state that forbids the operation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Stored data could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Connectivity failure, as opposed to a logical rejection.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Rejections from the atomic reservation commit.
///
/// Raised after the commit re-checked inventory and coupon limits under row locks;
/// nothing has been written when any of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommitError {
    /// Stock changed since validation.
    #[error("ticket type {ticket_type_id}: {requested} requested, {remaining} remaining")]
    InventoryUnavailable {
        /// Ticket type.
        ticket_type_id: TicketTypeId,
        /// Requested quantity.
        requested: u32,
        /// Remaining stock under lock.
        remaining: u32,
    },

    /// Coupon limits were reached concurrently.
    #[error("coupon rejected: {0}")]
    Coupon(CouponRejection),

    /// A generated ticket code already exists.
    #[error("duplicate ticket code")]
    DuplicateTicketCode,

    /// An inventory row was locked by another transaction.
    #[error("inventory row is locked")]
    RowLocked,

    /// Any other storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}
