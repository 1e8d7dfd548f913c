//! Periodic background tasks with an explicit start/stop lifecycle.
//!
//! ```text
//! Scheduler::new()
//!     .register(task_a)          ┌──────────────── tick ─────────────────┐
//!     .register(task_b)          │ task.run() → log error, keep going    │
//!     .start()  ───────────────▶ │ select! { interval, shutdown signal } │
//!                                └───────────────────────────────────────┘
//! RunningScheduler::shutdown(timeout)
//!     broadcast stop → await every task (bounded by timeout)
//! ```
//!
//! A tick that fails is logged and the task keeps its schedule. Missed ticks are
//! skipped rather than bunched up, so a slow run never triggers a burst afterwards.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Work executed on a fixed interval.
#[async_trait]
pub trait PeriodicTask: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Time between ticks.
    fn interval(&self) -> Duration;

    /// One tick.
    ///
    /// # Errors
    ///
    /// Any error is logged by the scheduler; the task keeps running.
    async fn run(&self) -> anyhow::Result<()>;
}

/// Collects tasks before they are started.
#[derive(Default)]
pub struct Scheduler {
    tasks: Vec<Arc<dyn PeriodicTask>>,
}

impl Scheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task.
    #[must_use]
    pub fn register(mut self, task: Arc<dyn PeriodicTask>) -> Self {
        self.tasks.push(task);
        self
    }

    /// Number of registered tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Spawns every task on the current runtime.
    #[must_use]
    pub fn start(self) -> RunningScheduler {
        let (shutdown_tx, _) = broadcast::channel(1);
        let handles = self
            .tasks
            .into_iter()
            .map(|task| {
                let name = task.name();
                let shutdown = shutdown_tx.subscribe();
                (name, tokio::spawn(run_task(task, shutdown)))
            })
            .collect::<Vec<_>>();
        info!(task_count = handles.len(), "Periodic tasks started");
        RunningScheduler { shutdown_tx, handles }
    }
}

/// Handle to started tasks.
pub struct RunningScheduler {
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl RunningScheduler {
    /// Signals every task to stop and waits up to `timeout` for each of them.
    ///
    /// Returns the number of tasks that stopped cleanly.
    pub async fn shutdown(self, timeout: Duration) -> usize {
        let _ = self.shutdown_tx.send(());
        let mut stopped = 0;

        for (name, handle) in self.handles {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => {
                    info!(task = name, "Periodic task stopped");
                    stopped += 1;
                }
                Ok(Err(e)) => warn!(task = name, error = %e, "Periodic task failed"),
                Err(_) => warn!(task = name, "Periodic task shutdown timed out"),
            }
        }
        stopped
    }
}

async fn run_task(task: Arc<dyn PeriodicTask>, mut shutdown: broadcast::Receiver<()>) {
    let name = task.name();
    let mut ticker = tokio::time::interval(task.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; consume it so work starts one interval in.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                info!(task = name, "Periodic task received shutdown signal");
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = task.run().await {
                    error!(task = name, error = %e, "Periodic task tick failed");
                }
            }
        }
    }
}
