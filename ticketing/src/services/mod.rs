//! Waiting-room and reservation services.
//!
//! ```text
//!   AdmissionController ──▶ SequenceAllocator ──▶ QueueLedger (authoritative)
//!          │                        └──────────▶ FastQueueStore (via QueueMirror)
//!          ▼
//!   QueueProcessor ◀── QueueProcessorTask / SlotReaperTask
//!          ▲
//!   ReservationEngine ──▶ OrderStore.commit_reservation
//!   PaymentService ─────▶ OrderStore.claim_payment, PaymentGateway, OrderStore.finalize_payment
//!   OrderReaperTask ────▶ OrderStore.expire_pending
//! ```

pub mod admission;
pub mod mirror;
pub mod order_reaper;
pub mod payment;
pub mod processor;
pub mod reservation;
pub mod sequence;

pub use admission::{AdmissionController, AdmissionError, AdmissionPolicy, AdmissionState, QueueStatistics};
pub use mirror::QueueMirror;
pub use order_reaper::OrderReaperTask;
pub use payment::{PaymentError, PaymentService};
pub use processor::{ProcessorPolicy, QueueProcessor, QueueProcessorTask, SlotReaperTask};
pub use reservation::{Buyer, OrderRequest, ReservationEngine, ReservationError, ReservationPolicy, TicketLine};
pub use sequence::SequenceAllocator;
