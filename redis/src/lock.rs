//! Lock backend on `SET NX PX` plus compare-and-act scripts.

use crate::ttl_millis;
use fairsale_core::BoxFuture;
use fairsale_core::lock::{LockBackend, LockError};
use redis::Script;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;

const RELEASE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

const EXTEND: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
";

/// `Redis` lock backend.
///
/// Release and extend run as Lua scripts so the token check and the write are one atomic
/// step on the server.
#[derive(Clone)]
pub struct RedisLockBackend {
    conn_manager: ConnectionManager,
    release: Arc<Script>,
    extend: Arc<Script>,
}

impl RedisLockBackend {
    /// Creates a backend over an existing connection manager.
    #[must_use]
    pub fn new(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            release: Arc::new(Script::new(RELEASE)),
            extend: Arc::new(Script::new(EXTEND)),
        }
    }

    fn lock_key(key: &str) -> String {
        format!("fairsale:lock:{key}")
    }
}

fn unavailable(error: &redis::RedisError) -> LockError {
    LockError::Unavailable(error.to_string())
}

impl LockBackend for RedisLockBackend {
    fn try_acquire<'a>(
        &'a self,
        key: &'a str,
        token: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, LockError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let reply: Option<String> = redis::cmd("SET")
                .arg(Self::lock_key(key))
                .arg(token)
                .arg("NX")
                .arg("PX")
                .arg(ttl_millis(ttl))
                .query_async(&mut conn)
                .await
                .map_err(|e| unavailable(&e))?;
            Ok(reply.is_some())
        })
    }

    fn release<'a>(&'a self, key: &'a str, token: &'a str) -> BoxFuture<'a, Result<bool, LockError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let deleted: i64 = self
                .release
                .key(Self::lock_key(key))
                .arg(token)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| unavailable(&e))?;
            Ok(deleted == 1)
        })
    }

    fn extend<'a>(
        &'a self,
        key: &'a str,
        token: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<bool, LockError>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let extended: i64 = self
                .extend
                .key(Self::lock_key(key))
                .arg(token)
                .arg(ttl_millis(ttl))
                .invoke_async(&mut conn)
                .await
                .map_err(|e| unavailable(&e))?;
            Ok(extended == 1)
        })
    }
}
