//! Application lifecycle and graceful shutdown.
//!
//! 1. **Startup**: spawn the periodic tasks (queue processor, slot reaper, order reaper)
//! 2. **Runtime**: serve HTTP
//! 3. **Shutdown**: on Ctrl+C or SIGTERM stop accepting connections, then give the
//!    periodic tasks the configured timeout to finish their current pass

use crate::config::Config;
use fairsale_runtime::Scheduler;
use std::sync::Arc;
use tracing::{info, warn};

/// Application ready to run.
pub struct Application {
    /// TCP listener for HTTP server
    listener: tokio::net::TcpListener,

    /// Axum router with all HTTP routes
    app: axum::Router,

    /// Periodic tasks, not yet started
    scheduler: Scheduler,

    /// Application configuration
    config: Arc<Config>,
}

impl Application {
    /// Create a new application instance.
    #[must_use]
    pub fn new(
        listener: tokio::net::TcpListener,
        app: axum::Router,
        scheduler: Scheduler,
        config: Arc<Config>,
    ) -> Self {
        Self {
            listener,
            app,
            scheduler,
            config,
        }
    }

    /// Run until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP server fails.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!(address = %self.config.bind_address(), "Starting HTTP server");

        let tasks = self.scheduler.start();

        axum::serve(self.listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("HTTP server stopped, stopping periodic tasks...");
        let timeout = self.config.shutdown_timeout();
        let stopped = tasks.shutdown(timeout).await;
        info!(stopped, "Graceful shutdown complete");
        Ok(())
    }
}

/// Wait for Ctrl+C or SIGTERM.
///
/// A signal handler that cannot be installed is logged and never fires.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
