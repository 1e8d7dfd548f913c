//! # Fairsale Runtime
//!
//! Execution support shared by the admission and reservation services:
//!
//! - [`lock`]: distributed locks with scoped guards, fail-closed and fail-open modes
//! - [`retry`]: exponential backoff with an optional time budget
//! - [`circuit_breaker`]: trips when an optional backend keeps failing
//! - [`periodic`]: interval tasks with graceful shutdown
//!
//! Nothing here knows about queues or orders; the services in `ticketing` compose these
//! pieces with the storage traits from `fairsale-core`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod circuit_breaker;
pub mod lock;
pub mod periodic;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
pub use lock::{Advisory, DistributedLock, LockGuard};
pub use periodic::{PeriodicTask, RunningScheduler, Scheduler};
pub use retry::RetryPolicy;
