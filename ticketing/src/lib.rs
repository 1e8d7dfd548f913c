//! # Fairsale ticketing service
//!
//! Admission control and order reservation for high-demand ticket sales.
//!
//! Buyers join a per-session waiting room; a bounded number of them hold a purchase
//! slot at any time. Holding a slot (or buying from a session without a waiting room)
//! lets a buyer reserve tickets; the reservation either gets paid or is cancelled by the
//! order reaper, returning its stock.
//!
//! ```text
//!  HTTP (axum) ──▶ AdmissionController ──▶ QueueLedger (PostgreSQL, authoritative)
//!       │                │            └──▶ QueueMirror ──▶ FastQueueStore (Redis)
//!       │                ▼
//!       ├──────▶ ReservationEngine ──▶ DistributedLock (Redis) ──▶ OrderStore (PostgreSQL)
//!       └──────▶ PaymentService ──▶ PaymentGateway
//!
//!  Scheduler: QueueProcessorTask · SlotReaperTask · OrderReaperTask
//! ```
//!
//! - [`services`]: admission, promotion, reservation, payment and the reapers
//! - [`api`] and [`server`]: the HTTP surface
//! - [`bootstrap`] and [`runtime`]: startup and graceful shutdown
//! - [`config`] and [`metrics`]: environment configuration and Prometheus metrics

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod metrics;
pub mod payment_gateway;
pub mod runtime;
pub mod server;
pub mod services;

pub use bootstrap::{ApplicationBuilder, ResourceManager, Services};
pub use config::Config;
pub use runtime::Application;
pub use server::{build_router, AppState};
