//! Fast queue store on sorted sets and TTL keys.

use crate::{redis_error, ttl_millis};
use chrono::{DateTime, Utc};
use fairsale_core::BoxFuture;
use fairsale_core::fast_store::{FastQueueStore, FastResult};
use fairsale_core::ids::{SessionId, UserId};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::sync::Arc;
use std::time::Duration;

const SEED: &str = r"
local current = tonumber(redis.call('GET', KEYS[1]) or '0')
if current < tonumber(ARGV[1]) then
    redis.call('SET', KEYS[1], ARGV[1])
end
return 0
";

/// `Redis` fast queue store.
///
/// Scores are exact in a sorted set: the largest score produced by
/// [`PromotionOrder::score`](fairsale_core::PromotionOrder::score) stays far below 2^53.
#[derive(Clone)]
pub struct RedisFastStore {
    conn_manager: ConnectionManager,
    seed: Arc<Script>,
}

fn queue_key(session: SessionId) -> String {
    format!("fairsale:queue:{session}")
}

fn active_key(session: SessionId, user: UserId) -> String {
    format!("fairsale:active:{session}:{user}")
}

fn active_index_key(session: SessionId) -> String {
    format!("fairsale:active-index:{session}")
}

fn sequence_key(session: SessionId) -> String {
    format!("fairsale:seq:{session}")
}

fn cooldown_key(user: UserId) -> String {
    format!("fairsale:cooldown:{user}")
}

fn parse_user(raw: &str) -> Option<UserId> {
    match raw.parse() {
        Ok(user) => Some(user),
        Err(e) => {
            tracing::warn!(member = raw, error = %e, "Dropping malformed queue member");
            None
        }
    }
}

impl RedisFastStore {
    /// Creates a store over an existing connection manager.
    #[must_use]
    pub fn new(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            seed: Arc::new(Script::new(SEED)),
        }
    }

    fn conn(&self) -> ConnectionManager {
        self.conn_manager.clone()
    }
}

impl FastQueueStore for RedisFastStore {
    fn enqueue(&self, session: SessionId, user: UserId, score: u64) -> BoxFuture<'_, FastResult<bool>> {
        Box::pin(async move {
            let mut conn = self.conn();
            let added: i64 = redis::cmd("ZADD")
                .arg(queue_key(session))
                .arg("NX")
                .arg(score)
                .arg(user.to_string())
                .query_async(&mut conn)
                .await
                .map_err(|e| redis_error(&e))?;
            Ok(added == 1)
        })
    }

    fn position(&self, session: SessionId, user: UserId) -> BoxFuture<'_, FastResult<Option<u64>>> {
        Box::pin(async move {
            let mut conn = self.conn();
            let rank: Option<u64> = conn
                .zrank(queue_key(session), user.to_string())
                .await
                .map_err(|e| redis_error(&e))?;
            Ok(rank.map(|r| r + 1))
        })
    }

    fn queue_length(&self, session: SessionId) -> BoxFuture<'_, FastResult<u64>> {
        Box::pin(async move {
            let mut conn = self.conn();
            let length: u64 = conn
                .zcard(queue_key(session))
                .await
                .map_err(|e| redis_error(&e))?;
            Ok(length)
        })
    }

    fn pop_front(&self, session: SessionId, count: u64) -> BoxFuture<'_, FastResult<Vec<(UserId, u64)>>> {
        Box::pin(async move {
            if count == 0 {
                return Ok(Vec::new());
            }
            let mut conn = self.conn();
            let popped: Vec<(String, u64)> = redis::cmd("ZPOPMIN")
                .arg(queue_key(session))
                .arg(count)
                .query_async(&mut conn)
                .await
                .map_err(|e| redis_error(&e))?;
            Ok(popped
                .iter()
                .filter_map(|(member, score)| parse_user(member).map(|user| (user, *score)))
                .collect())
        })
    }

    fn remove(&self, session: SessionId, user: UserId) -> BoxFuture<'_, FastResult<bool>> {
        Box::pin(async move {
            let mut conn = self.conn();
            let removed: i64 = conn
                .zrem(queue_key(session), user.to_string())
                .await
                .map_err(|e| redis_error(&e))?;
            Ok(removed == 1)
        })
    }

    fn set_active(
        &self,
        session: SessionId,
        user: UserId,
        expires_at: DateTime<Utc>,
        ttl: Duration,
    ) -> BoxFuture<'_, FastResult<()>> {
        Box::pin(async move {
            let mut conn = self.conn();
            let () = redis::pipe()
                .atomic()
                .cmd("SET")
                .arg(active_key(session, user))
                .arg(expires_at.timestamp_millis())
                .arg("PX")
                .arg(ttl_millis(ttl))
                .ignore()
                .sadd(active_index_key(session), user.to_string())
                .ignore()
                .query_async(&mut conn)
                .await
                .map_err(|e| redis_error(&e))?;
            Ok(())
        })
    }

    fn active_slot(
        &self,
        session: SessionId,
        user: UserId,
    ) -> BoxFuture<'_, FastResult<Option<DateTime<Utc>>>> {
        Box::pin(async move {
            let mut conn = self.conn();
            let millis: Option<i64> = conn
                .get(active_key(session, user))
                .await
                .map_err(|e| redis_error(&e))?;
            Ok(millis.and_then(DateTime::<Utc>::from_timestamp_millis))
        })
    }

    fn clear_active(&self, session: SessionId, user: UserId) -> BoxFuture<'_, FastResult<()>> {
        Box::pin(async move {
            let mut conn = self.conn();
            let () = redis::pipe()
                .atomic()
                .del(active_key(session, user))
                .ignore()
                .srem(active_index_key(session), user.to_string())
                .ignore()
                .query_async(&mut conn)
                .await
                .map_err(|e| redis_error(&e))?;
            Ok(())
        })
    }

    fn next_sequence(&self, session: SessionId) -> BoxFuture<'_, FastResult<i64>> {
        Box::pin(async move {
            let mut conn = self.conn();
            let next: i64 = conn
                .incr(sequence_key(session), 1)
                .await
                .map_err(|e| redis_error(&e))?;
            Ok(next)
        })
    }

    fn seed_sequence(&self, session: SessionId, value: i64) -> BoxFuture<'_, FastResult<()>> {
        Box::pin(async move {
            let mut conn = self.conn();
            let _: i64 = self
                .seed
                .key(sequence_key(session))
                .arg(value)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| redis_error(&e))?;
            Ok(())
        })
    }

    fn set_cooldown(&self, user: UserId, ttl: Duration) -> BoxFuture<'_, FastResult<()>> {
        Box::pin(async move {
            let mut conn = self.conn();
            let () = conn
                .pset_ex(cooldown_key(user), 1, ttl_millis(ttl))
                .await
                .map_err(|e| redis_error(&e))?;
            Ok(())
        })
    }

    fn cooldown(&self, user: UserId) -> BoxFuture<'_, FastResult<Option<Duration>>> {
        Box::pin(async move {
            let mut conn = self.conn();
            let remaining: i64 = conn
                .pttl(cooldown_key(user))
                .await
                .map_err(|e| redis_error(&e))?;
            // -2: no key, -1: no expiry
            Ok(u64::try_from(remaining)
                .ok()
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis))
        })
    }

    fn purge_session(&self, session: SessionId) -> BoxFuture<'_, FastResult<()>> {
        Box::pin(async move {
            let mut conn = self.conn();
            let users: Vec<String> = conn
                .smembers(active_index_key(session))
                .await
                .map_err(|e| redis_error(&e))?;

            let mut pipe = redis::pipe();
            pipe.atomic();
            for user in users.iter().filter_map(|u| parse_user(u)) {
                pipe.del(active_key(session, user)).ignore();
            }
            pipe.del(active_index_key(session))
                .ignore()
                .del(queue_key(session))
                .ignore()
                .del(sequence_key(session))
                .ignore();
            let () = pipe.query_async(&mut conn).await.map_err(|e| redis_error(&e))?;

            tracing::debug!(session_id = %session, "Purged fast-store session");
            Ok(())
        })
    }

    fn ping(&self) -> BoxFuture<'_, FastResult<()>> {
        Box::pin(async move {
            let mut conn = self.conn();
            let _: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|e| redis_error(&e))?;
            Ok(())
        })
    }
}
