// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Redis-backed [`StoreClient`] (feature `redis-backend`).
//!
//! Uses `redis::aio::ConnectionManager` for automatic reconnection (spec
//! §4.0 "the store client must tolerate transient connection loss without
//! surfacing it to every caller") and `redis::Script` for the two
//! operations that require server-side atomicity: the claim move and the
//! token-bucket refill+consume.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::collections::HashMap;
use std::time::Duration;
use wq_core::AuditEvent;
use wq_storage::{StoreClient, StoreError, TokenBucketResult};

fn map_err(err: redis::RedisError) -> StoreError {
    if err.is_timeout() {
        StoreError::Timeout(Duration::from_secs(0))
    } else if err.is_connection_dropped() || err.is_connection_refusal() {
        StoreError::Transient(err.to_string())
    } else {
        StoreError::Backend(err.to_string())
    }
}

/// Lua: atomically pop the head of `src` and push it to the tail of `dst`.
/// `RPOPLPUSH`/`LMOVE` already do this server-side; wrapped in a script
/// only so the in-memory and Redis backends share one call shape that also
/// needs to express a client-side poll-with-timeout loop when empty.
const CLAIM_MOVE_SCRIPT: &str = r#"
local item = redis.call('RPOP', KEYS[1])
if item then
    redis.call('LPUSH', KEYS[2], item)
end
return item
"#;

/// Lua: atomic token bucket refill + consume (spec §4.1).
const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local requested = tonumber(ARGV[1])
local capacity = tonumber(ARGV[2])
local refill_per_sec = tonumber(ARGV[3])
local now_ms = tonumber(ARGV[4])
local ttl_sec = tonumber(ARGV[5])
local dry_run = ARGV[6] == '1'

local state = redis.call('HMGET', key, 'tokens', 'last_refill_ms')
local tokens = tonumber(state[1]) or capacity
local last_refill_ms = tonumber(state[2]) or now_ms

local elapsed_ms = math.max(0, now_ms - last_refill_ms)
local refilled = (elapsed_ms / 1000.0) * refill_per_sec
local tokens_after = math.min(capacity, tokens + refilled)

local would_allow = tokens_after >= requested
local allowed = would_allow and not dry_run
local final_tokens = tokens_after
if allowed then
    final_tokens = tokens_after - requested
end

redis.call('HSET', key, 'tokens', tostring(final_tokens), 'last_refill_ms', tostring(now_ms))
redis.call('EXPIRE', key, ttl_sec)

local retry_after_ms = 0
if not would_allow then
    if refill_per_sec > 0 then
        retry_after_ms = math.ceil(((requested - tokens_after) / refill_per_sec) * 1000.0)
    else
        retry_after_ms = -1
    end
end

return {allowed and 1 or 0, tostring(final_tokens), tostring(final_tokens), retry_after_ms, would_allow and 1 or 0}
"#;

/// Lua: atomically remove a DLQ entry hash field and push the replacement
/// payload onto the target queue. Returns 0 if the entry was already gone.
const DLQ_REQUEUE_SCRIPT: &str = r#"
local dlq_key = KEYS[1]
local target_queue_key = KEYS[2]
local entry_id = ARGV[1]
local payload = ARGV[2]

local existed = redis.call('HDEL', dlq_key, entry_id)
if existed == 0 then
    return 0
end
redis.call('RPUSH', target_queue_key, payload)
return 1
"#;

pub struct RedisStore {
    conn: ConnectionManager,
    claim_move: Script,
    token_bucket: Script,
    dlq_requeue: Script,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(map_err)?;
        let conn = client.get_connection_manager().await.map_err(map_err)?;
        Ok(Self {
            conn,
            claim_move: Script::new(CLAIM_MOVE_SCRIPT),
            token_bucket: Script::new(TOKEN_BUCKET_SCRIPT),
            dlq_requeue: Script::new(DLQ_REQUEUE_SCRIPT),
        })
    }
}

#[async_trait]
impl StoreClient for RedisStore {
    async fn list_push_back(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(key, value).await.map_err(map_err)
    }

    async fn list_pop_front(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        conn.lpop(key, None).await.map_err(map_err)
    }

    async fn list_remove(&self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.lrem(key, 1, value).await.map_err(map_err)?;
        Ok(removed > 0)
    }

    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        conn.llen(key).await.map_err(map_err)
    }

    async fn list_items(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        conn.lrange(key, 0, -1).await.map_err(map_err)
    }

    async fn atomic_move(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let mut conn = self.conn.clone();
            let item: Option<Vec<u8>> =
                self.claim_move.key(src).key(dst).invoke_async(&mut conn).await.map_err(map_err)?;
            if item.is_some() {
                return Ok(item);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(20).min(deadline - tokio::time::Instant::now())).await;
        }
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        conn.hget(key, field).await.map_err(map_err)
    }

    async fn hash_set(&self, key: &str, field: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(key, field, value).await.map_err(map_err)
    }

    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        conn.hincr(key, field, delta).await.map_err(map_err)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        conn.hgetall(key).await.map_err(map_err)
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.hdel(key, field).await.map_err(map_err)?;
        Ok(removed > 0)
    }

    async fn key_set_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await.map_err(map_err)
    }

    async fn key_exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        conn.exists(key).await.map_err(map_err)
    }

    async fn key_delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(map_err)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(key, member).await.map_err(map_err)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(key, member).await.map_err(map_err)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.smembers(key).await.map_err(map_err)
    }

    async fn zadd(&self, key: &str, member: Vec<u8>, score: f64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(key, member, score).await.map_err(map_err)
    }

    async fn zpop_min_below(
        &self,
        key: &str,
        max_score: f64,
    ) -> Result<Option<(Vec<u8>, f64)>, StoreError> {
        let mut conn = self.conn.clone();
        let popped: Vec<(Vec<u8>, f64)> = conn.zpopmin(key, 1).await.map_err(map_err)?;
        let Some((member, score)) = popped.into_iter().next() else { return Ok(None) };
        if score > max_score {
            let mut conn = self.conn.clone();
            conn.zadd::<_, _, _, ()>(key, member, score).await.map_err(map_err)?;
            return Ok(None);
        }
        Ok(Some((member, score)))
    }

    #[allow(clippy::too_many_arguments)]
    async fn token_bucket_consume(
        &self,
        scope: &str,
        requested: f64,
        capacity: f64,
        refill_per_sec: f64,
        now_ms: u64,
        ttl_sec: u64,
        dry_run: bool,
    ) -> Result<TokenBucketResult, StoreError> {
        let mut conn = self.conn.clone();
        let (allowed, remaining, _remaining2, retry_after_ms, dry_run_would_allow): (
            i64,
            String,
            String,
            i64,
            i64,
        ) = self
            .token_bucket
            .key(scope)
            .arg(requested)
            .arg(capacity)
            .arg(refill_per_sec)
            .arg(now_ms)
            .arg(ttl_sec)
            .arg(if dry_run { "1" } else { "0" })
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)?;

        let remaining: f64 = remaining
            .parse()
            .map_err(|_| StoreError::Serialization("non-numeric token bucket state".into()))?;

        Ok(TokenBucketResult {
            allowed: allowed == 1,
            consumed: if allowed == 1 { requested } else { 0.0 },
            remaining,
            retry_after_ms: retry_after_ms.max(0) as u64,
            dry_run_would_allow: dry_run_would_allow == 1,
        })
    }

    async fn dlq_requeue_atomic(
        &self,
        dlq_key: &str,
        entry_id: &str,
        target_queue_key: &str,
        updated_payload: Vec<u8>,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let moved: i64 = self
            .dlq_requeue
            .key(dlq_key)
            .key(target_queue_key)
            .arg(entry_id)
            .arg(updated_payload)
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(moved == 1)
    }

    async fn append_audit(&self, event: AuditEvent) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let encoded = serde_json::to_vec(&event)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        conn.rpush::<_, _, ()>(wq_core::keys::audit_events_key(), encoded).await.map_err(map_err)
    }
}
