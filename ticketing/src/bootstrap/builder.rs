//! Declarative application builder.
//!
//! Each step corresponds to one phase of initialization and returns `Result`, so the
//! startup flow reads top to bottom:
//!
//! 1. Configure (config, tracing, metrics)
//! 2. Connect infrastructure (`PostgreSQL`, Redis)
//! 3. Wire services and background tasks
//! 4. Bind the HTTP listener
//!
//! ```rust,ignore
//! ApplicationBuilder::new()
//!     .with_config(Config::from_env())
//!     .with_tracing()?
//!     .with_metrics()?
//!     .with_resources().await?
//!     .build().await?
//!     .run().await?;
//! ```

use super::resources::ResourceManager;
use super::services::Services;
use crate::config::Config;
use crate::runtime::Application;
use crate::server::build_router;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Builder for a fully configured application.
///
/// Steps are tracked with `Option` fields; calling them out of order is reported as an
/// error instead of a panic.
#[derive(Default)]
pub struct ApplicationBuilder {
    /// Application configuration
    config: Option<Arc<Config>>,

    /// Infrastructure resources
    resources: Option<ResourceManager>,
}

impl ApplicationBuilder {
    /// Create a new application builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set application configuration. Call this first.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(Arc::new(config));
        self
    }

    /// Setup tracing and logging.
    ///
    /// `RUST_LOG` wins; otherwise the configured log level applies.
    ///
    /// # Errors
    ///
    /// Returns error if config is not set or a subscriber is already installed.
    pub fn with_tracing(self) -> Result<Self, Box<dyn std::error::Error>> {
        let config = self
            .config
            .as_ref()
            .ok_or("Config must be set before initializing tracing")?;

        tracing_subscriber::registry()
            .with(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
            )
            .with(tracing_subscriber::fmt::layer())
            .try_init()?;

        Ok(self)
    }

    /// Install the Prometheus exporter and describe the business metrics.
    ///
    /// # Errors
    ///
    /// Returns error if config is not set, the metrics address is invalid, or the exporter
    /// cannot bind.
    pub fn with_metrics(self) -> Result<Self, Box<dyn std::error::Error>> {
        let config = self
            .config
            .as_ref()
            .ok_or("Config must be set before initializing metrics")?;

        let addr: SocketAddr = config.metrics_address().parse()?;
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        crate::metrics::register_business_metrics();
        info!(address = %addr, "Prometheus exporter listening");

        Ok(self)
    }

    /// Connect to `PostgreSQL` and Redis.
    ///
    /// # Errors
    ///
    /// Returns error if config is not set, or a connection or migration fails.
    pub async fn with_resources(mut self) -> Result<Self, Box<dyn std::error::Error>> {
        let config = self
            .config
            .as_ref()
            .ok_or("Config must be set before initializing resources")?;

        self.resources = Some(ResourceManager::from_config(config).await?);
        Ok(self)
    }

    /// Use already-built resources instead of connecting.
    #[must_use]
    pub fn with_prepared_resources(mut self, resources: ResourceManager) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Wire the services, build the router and bind the listener.
    ///
    /// # Errors
    ///
    /// Returns error if a previous step is missing or the listener cannot bind.
    pub async fn build(self) -> Result<Application, Box<dyn std::error::Error>> {
        let config = self.config.ok_or("Config must be set before building")?;
        let resources = self
            .resources
            .ok_or("Resources must be initialized before building")?;

        let services = Services::wire(&resources, &config);
        let scheduler = services.scheduler(&config);
        let router = build_router(services.app_state());

        let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;

        Ok(Application::new(listener, router, scheduler, config))
    }
}
