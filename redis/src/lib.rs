//! `Redis` backends for fairsale.
//!
//! - [`RedisFastStore`]: the per-session ordered queue, active-slot markers, sequence
//!   counters and purchase cooldowns ([`FastQueueStore`])
//! - [`RedisLockBackend`]: set-if-absent locks with token-checked release and extend
//!   ([`LockBackend`])
//!
//! Both share one [`ConnectionManager`], which reconnects on its own after a dropped
//! connection.
//!
//! # Key layout
//!
//! | Key | Type | Content |
//! |-----|------|---------|
//! | `fairsale:queue:{session}` | sorted set | user ids scored by promotion order |
//! | `fairsale:active:{session}:{user}` | string + PX | slot deadline (unix millis) |
//! | `fairsale:active-index:{session}` | set | users with an active marker |
//! | `fairsale:seq:{session}` | integer | last queue number handed out |
//! | `fairsale:cooldown:{user}` | string + PX | purchase cooldown |
//! | `fairsale:lock:{key}` | string + PX | lock token |
//!
//! [`FastQueueStore`]: fairsale_core::fast_store::FastQueueStore
//! [`LockBackend`]: fairsale_core::lock::LockBackend

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod fast_store;
mod lock;

pub use fast_store::RedisFastStore;
pub use lock::RedisLockBackend;

use fairsale_core::error::StoreError;
use redis::Client;
use redis::aio::ConnectionManager;
use std::time::Duration;

/// Opens a connection manager for `redis_url`.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if the server cannot be reached.
pub async fn connect(redis_url: &str) -> Result<ConnectionManager, StoreError> {
    let client = Client::open(redis_url)
        .map_err(|e| StoreError::Unavailable(format!("Failed to create Redis client: {e}")))?;
    let manager = ConnectionManager::new(client).await.map_err(|e| {
        StoreError::Unavailable(format!("Failed to create Redis connection manager: {e}"))
    })?;
    tracing::info!("Redis connection manager ready");
    Ok(manager)
}

pub(crate) fn redis_error(error: &redis::RedisError) -> StoreError {
    if error.is_io_error()
        || error.is_connection_dropped()
        || error.is_connection_refusal()
        || error.is_timeout()
    {
        StoreError::Unavailable(error.to_string())
    } else {
        StoreError::Backend(error.to_string())
    }
}

/// TTL in milliseconds, at least 1 (Redis rejects `PX 0`).
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2_000);
    }
}
