//! HTTP API handlers.
//!
//! - Queue: waiting-room join, status, heartbeat, leave and statistics
//! - Orders: reservation, lookup and payment
//!
//! Every handler takes the [`Buyer`](crate::services::Buyer) forwarded by the auth gateway
//! and returns [`AppError`] on failure.

pub mod buyer;
pub mod error;
pub mod orders;
pub mod queue;

pub use error::AppError;
pub use orders::{create_order, get_order, pay_order};
pub use queue::{heartbeat, join_queue, leave_queue, queue_statistics, queue_status};
