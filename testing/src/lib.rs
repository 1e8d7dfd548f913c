//! # Fairsale Testing
//!
//! Testing utilities for fairsale services.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - In-memory implementations of every storage seam in `fairsale-core`, each with an
//!   availability switch to simulate outages
//! - A scripted ticket code generator for collision tests
//!
//! ## Example
//!
//! ```
//! use fairsale_testing::{InMemoryLedger, ManualClock};
//! use fairsale_core::ledger::QueueLedger;
//! use fairsale_core::SessionId;
//!
//! # tokio_test::block_on(async {
//! let ledger = InMemoryLedger::new();
//! let counts = ledger.counts(SessionId::new()).await.unwrap();
//! assert_eq!(counts.occupancy(), 0);
//! # });
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use fairsale_core::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

mod clock;
mod codes;
mod fast_store;
mod ledger;
mod lock;
mod sale_store;

pub use clock::{FixedClock, ManualClock, test_clock, test_epoch};
pub use codes::ScriptedCodeGenerator;
pub use fast_store::InMemoryFastStore;
pub use ledger::InMemoryLedger;
pub use lock::InMemoryLockBackend;
pub use sale_store::InMemorySaleStore;

/// Wraps an already computed value in a boxed future.
pub(crate) fn ready<'a, T: Send + 'a>(value: T) -> BoxFuture<'a, T> {
    Box::pin(futures::future::ready(value))
}

/// Shared on/off flag. Clones observe the same state.
#[derive(Debug, Clone)]
pub(crate) struct Switch(Arc<AtomicBool>);

impl Switch {
    pub(crate) fn is_on(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn set(&self, on: bool) {
        self.0.store(on, Ordering::SeqCst);
    }
}

impl Default for Switch {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}
