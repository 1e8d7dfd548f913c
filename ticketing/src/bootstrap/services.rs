//! Service wiring.
//!
//! Builds the admission controller, reservation engine and payment service on top of a
//! [`ResourceManager`], and the background tasks that keep them moving.

use super::resources::ResourceManager;
use crate::config::Config;
use crate::server::AppState;
use crate::services::{
    AdmissionController, OrderReaperTask, PaymentService, QueueMirror, QueueProcessor,
    QueueProcessorTask, ReservationEngine, SlotReaperTask,
};
use fairsale_runtime::{DistributedLock, Scheduler};
use std::sync::Arc;

/// The application services, sharing one set of backends.
#[derive(Clone)]
pub struct Services {
    resources: ResourceManager,
    /// Fast store behind its circuit breaker
    pub mirror: QueueMirror,
    /// Promotion engine
    pub processor: QueueProcessor,
    /// Waiting-room operations
    pub admission: AdmissionController,
    /// Order creation
    pub reservations: ReservationEngine,
    /// Order lookup and payment
    pub payments: PaymentService,
}

impl Services {
    /// Wires every service from `resources` using the policies in `config`.
    #[must_use]
    pub fn wire(resources: &ResourceManager, config: &Config) -> Self {
        let mirror = QueueMirror::with_defaults(Arc::clone(&resources.fast_store));

        let locks = DistributedLock::with_wait_budget(
            Arc::clone(&resources.lock_backend),
            config.reservation.lock_wait(),
        );

        let processor = QueueProcessor::new(
            Arc::clone(&resources.catalog),
            Arc::clone(&resources.ledger),
            mirror.clone(),
            locks.clone(),
            Arc::clone(&resources.clock),
            config.queue.processor_policy(),
        );
        let admission = AdmissionController::new(
            Arc::clone(&resources.catalog),
            Arc::clone(&resources.ledger),
            mirror.clone(),
            processor.clone(),
            Arc::clone(&resources.clock),
            config.queue.admission_policy(),
        );
        let reservations = ReservationEngine::new(
            Arc::clone(&resources.catalog),
            Arc::clone(&resources.orders),
            Arc::clone(&resources.ledger),
            admission.clone(),
            mirror.clone(),
            locks,
            Arc::clone(&resources.codes),
            Arc::clone(&resources.clock),
            config.reservation.policy(),
        );
        let payments = PaymentService::new(
            Arc::clone(&resources.orders),
            Arc::clone(&resources.payment_gateway),
            admission.clone(),
            Arc::clone(&resources.clock),
        );

        Self {
            resources: resources.clone(),
            mirror,
            processor,
            admission,
            reservations,
            payments,
        }
    }

    /// State for the HTTP router.
    #[must_use]
    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.admission.clone(),
            self.reservations.clone(),
            self.payments.clone(),
            Arc::clone(&self.resources.ledger),
            Arc::clone(&self.resources.orders),
            self.mirror.clone(),
        )
    }

    /// Queue processor task.
    #[must_use]
    pub fn queue_processor_task(&self, config: &Config) -> QueueProcessorTask {
        QueueProcessorTask::new(self.processor.clone(), config.queue.processor_interval())
    }

    /// Slot reaper task.
    #[must_use]
    pub fn slot_reaper_task(&self, config: &Config) -> SlotReaperTask {
        SlotReaperTask::new(
            Arc::clone(&self.resources.catalog),
            Arc::clone(&self.resources.ledger),
            self.mirror.clone(),
            self.processor.clone(),
            Arc::clone(&self.resources.clock),
            config.queue.reaper_interval(),
        )
    }

    /// Order reaper task.
    #[must_use]
    pub fn order_reaper_task(&self, config: &Config) -> OrderReaperTask {
        OrderReaperTask::new(
            Arc::clone(&self.resources.orders),
            self.admission.clone(),
            Arc::clone(&self.resources.clock),
            config.reservation.reaper_interval(),
        )
    }

    /// Scheduler with the queue processor, slot reaper and order reaper registered.
    #[must_use]
    pub fn scheduler(&self, config: &Config) -> Scheduler {
        Scheduler::new()
            .register(Arc::new(self.queue_processor_task(config)))
            .register(Arc::new(self.slot_reaper_task(config)))
            .register(Arc::new(self.order_reaper_task(config)))
    }
}
