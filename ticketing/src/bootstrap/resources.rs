//! Infrastructure setup.
//!
//! [`ResourceManager`] owns every backend the services talk to, as trait objects. In
//! production it connects to `PostgreSQL` (ledger, catalog, orders) and Redis (fast queue
//! store, locks); tests assemble one from in-memory implementations with
//! [`ResourceManager::new`].
//!
//! ```rust,ignore
//! let config = Config::from_env();
//! let resources = ResourceManager::from_config(&config).await?;
//! ```

use crate::config::Config;
use crate::payment_gateway::{MockPaymentGateway, PaymentGateway};
use fairsale_core::codes::{CodeGenerator, RandomCodeGenerator};
use fairsale_core::environment::{Clock, SystemClock};
use fairsale_core::fast_store::FastQueueStore;
use fairsale_core::ledger::QueueLedger;
use fairsale_core::lock::LockBackend;
use fairsale_core::store::{Catalog, OrderStore};
use fairsale_postgres::{PostgresLedger, PostgresSaleStore};
use fairsale_redis::{RedisFastStore, RedisLockBackend};
use std::sync::Arc;
use tracing::info;

/// Every backend the services depend on.
#[derive(Clone)]
pub struct ResourceManager {
    /// Sessions, ticket types and coupons
    pub catalog: Arc<dyn Catalog>,
    /// Orders, tickets and stock
    pub orders: Arc<dyn OrderStore>,
    /// Durable waiting-room ledger
    pub ledger: Arc<dyn QueueLedger>,
    /// Fast queue store
    pub fast_store: Arc<dyn FastQueueStore>,
    /// Distributed lock backend
    pub lock_backend: Arc<dyn LockBackend>,
    /// Ticket code source
    pub codes: Arc<dyn CodeGenerator>,
    /// Payment gateway (mock until a real provider is wired)
    pub payment_gateway: Arc<dyn PaymentGateway>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl ResourceManager {
    /// Assembles resources from already-built backends.
    ///
    /// `sale_store` serves both as catalog and order store.
    #[must_use]
    pub fn new<S>(
        sale_store: Arc<S>,
        ledger: Arc<dyn QueueLedger>,
        fast_store: Arc<dyn FastQueueStore>,
        lock_backend: Arc<dyn LockBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        S: Catalog + OrderStore + 'static,
    {
        let catalog: Arc<dyn Catalog> = sale_store.clone();
        let orders: Arc<dyn OrderStore> = sale_store;
        Self {
            catalog,
            orders,
            ledger,
            fast_store,
            lock_backend,
            codes: Arc::new(RandomCodeGenerator::default()),
            payment_gateway: MockPaymentGateway::shared(),
            clock,
        }
    }

    /// Replaces the ticket code source.
    #[must_use]
    pub fn with_codes(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    /// Replaces the payment gateway.
    #[must_use]
    pub fn with_payment_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.payment_gateway = gateway;
        self
    }

    /// Connects to `PostgreSQL` and Redis and runs the migrations.
    ///
    /// # Errors
    ///
    /// Returns error if a connection or a migration fails.
    pub async fn from_config(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        info!("Connecting to PostgreSQL...");
        let pool = fairsale_postgres::connect(&config.postgres.url, &config.postgres.pool_options()).await?;
        info!("Running database migrations...");
        fairsale_postgres::migrate(&pool).await?;

        info!("Connecting to Redis...");
        let redis = fairsale_redis::connect(&config.redis.url).await?;

        let resources = Self::new(
            Arc::new(PostgresSaleStore::new(pool.clone())),
            Arc::new(PostgresLedger::new(pool)),
            Arc::new(RedisFastStore::new(redis.clone())),
            Arc::new(RedisLockBackend::new(redis)),
            Arc::new(SystemClock),
        );
        info!("Infrastructure ready");
        Ok(resources)
    }
}
