//! # Fairsale Core
//!
//! Domain types and storage abstractions for allocating a scarce, time-boxed
//! resource (tickets for a sale session) fairly and without overselling.
//!
//! The crate has no I/O of its own. It provides:
//!
//! - **Identifiers and value objects**: [`ids`], [`money::Money`], [`membership::MembershipTier`]
//! - **Admission model**: [`queue::QueueEntry`] and its lifecycle state machine
//!   [`queue::QueueStatus`], plus per-session [`queue::WaitingRoomConfig`]
//! - **Catalog and orders**: [`catalog::TicketType`], [`order::Order`], [`order::Ticket`],
//!   [`coupon::Coupon`] and the pure rules that validate them
//! - **Pricing**: [`pricing::PriceBreakdown`]
//! - **Storage seams**: traits for the durable ledger ([`ledger::QueueLedger`]), the fast
//!   queue store ([`fast_store::FastQueueStore`]), the lock backend ([`lock::LockBackend`]),
//!   the catalog and order store ([`store::Catalog`], [`store::OrderStore`]) and queue
//!   number allocation ([`sequence::SequenceSource`])
//! - **Environment**: the [`environment::Clock`] abstraction
//!
//! ## Architecture
//!
//! ```text
//!            ┌────────────────────────────┐
//!            │  ticketing (services/API)  │
//!            └─────────────┬──────────────┘
//!                          │ uses traits from
//!            ┌─────────────▼──────────────┐
//!            │        fairsale-core       │
//!            └──┬──────────┬───────────┬──┘
//!               │          │           │ implemented by
//!     fairsale-postgres  fairsale-redis  fairsale-testing
//!     (ledger, orders)   (queue, locks)  (in-memory)
//! ```
//!
//! Implementations return boxed futures so that every trait stays object safe and can
//! be shared as `Arc<dyn Trait>` between HTTP handlers and background tasks.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
pub mod codes;
pub mod coupon;
pub mod error;
pub mod fast_store;
pub mod ids;
pub mod ledger;
pub mod lock;
pub mod membership;
pub mod money;
pub mod order;
pub mod pricing;
pub mod queue;
pub mod sequence;
pub mod store;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use futures::future::BoxFuture;

pub use error::{CommitError, StoreError};
pub use ids::{CouponId, EventId, OrderId, OrderItemId, SessionId, TicketId, TicketTypeId, UserId};
pub use membership::MembershipTier;
pub use money::Money;
pub use queue::{PromotionOrder, QueueEntry, QueueStatus, WaitingRoomConfig};

/// Environment module - time and other injected dependencies.
///
/// All services receive a [`Clock`](environment::Clock) instead of calling `Utc::now()`
/// directly, so that slot expiry, sale windows and reservation deadlines can be tested
/// deterministically.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use fairsale_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
