//! `PostgreSQL` backends for fairsale.
//!
//! This crate provides the durable side of the system on top of sqlx:
//!
//! - [`PostgresLedger`]: the authoritative waiting-room ledger ([`QueueLedger`])
//! - [`PostgresSaleStore`]: catalog reads plus the order/inventory/coupon store
//!   ([`Catalog`], [`OrderStore`])
//! - [`migrate`]: embedded schema migrations
//!
//! Serialization points are the database itself: a transaction-scoped advisory lock per
//! session for ledger writes, and `SELECT ... FOR UPDATE NOWAIT` on inventory rows for
//! reservation commits.
//!
//! # Example
//!
//! ```no_run
//! use fairsale_postgres::{PostgresLedger, PostgresSaleStore, PoolOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = fairsale_postgres::connect("postgres://localhost/fairsale", &PoolOptions::default()).await?;
//! fairsale_postgres::migrate(&pool).await?;
//!
//! let ledger = PostgresLedger::new(pool.clone());
//! let orders = PostgresSaleStore::new(pool);
//! # Ok(())
//! # }
//! ```
//!
//! [`QueueLedger`]: fairsale_core::ledger::QueueLedger
//! [`Catalog`]: fairsale_core::store::Catalog
//! [`OrderStore`]: fairsale_core::store::OrderStore

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod convert;
mod ledger;
mod sale_store;

pub use ledger::PostgresLedger;
pub use sale_store::PostgresSaleStore;

use fairsale_core::error::StoreError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// Embedded migrations under `postgres/migrations`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Connection pool sizing.
#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    /// Upper bound on open connections.
    pub max_connections: u32,
    /// Connections kept open while idle.
    pub min_connections: u32,
    /// How long to wait for a free connection.
    pub acquire_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Opens a connection pool.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if the database cannot be reached.
pub async fn connect(url: &str, options: &PoolOptions) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(options.max_connections)
        .min_connections(options.min_connections)
        .acquire_timeout(options.acquire_timeout)
        .connect(url)
        .await
        .map_err(|e| StoreError::Unavailable(format!("Failed to connect to database: {e}")))?;

    tracing::info!(
        max_connections = options.max_connections,
        "PostgreSQL pool ready"
    );
    Ok(pool)
}

/// Applies pending migrations.
///
/// # Errors
///
/// Returns [`StoreError::Backend`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| StoreError::Backend(format!("Migration failed: {e}")))
}

/// Maps a sqlx failure to the shared storage error.
pub(crate) fn db_error(error: sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(error.to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Serialization(error.to_string())
        }
        other => StoreError::Backend(other.to_string()),
    }
}

/// Postgres SQLSTATE of a database error, if any.
pub(crate) fn sql_state(error: &sqlx::Error) -> Option<String> {
    error
        .as_database_error()
        .and_then(|db| db.code())
        .map(std::borrow::Cow::into_owned)
}

/// `lock_not_available`, raised by `NOWAIT`.
pub(crate) const LOCK_NOT_AVAILABLE: &str = "55P03";
/// `unique_violation`.
pub(crate) const UNIQUE_VIOLATION: &str = "23505";
