// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process [`StoreClient`] backed by `tokio::sync::Mutex`-guarded
//! collections. Used by the engine's own test suite and by any deployment
//! that doesn't need cross-process sharing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use wq_core::AuditEvent;
use wq_storage::{StoreClient, StoreError, TokenBucketResult};

struct TtlEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

#[derive(Default)]
struct TokenBucketState {
    tokens: f64,
    last_refill_ms: u64,
}

#[derive(Default)]
struct Inner {
    lists: HashMap<String, VecDeque<Vec<u8>>>,
    hashes: HashMap<String, HashMap<String, Vec<u8>>>,
    ttl_keys: HashMap<String, TtlEntry>,
    sets: HashMap<String, HashSet<String>>,
    zsets: HashMap<String, Vec<(Vec<u8>, f64)>>,
    buckets: HashMap<String, TokenBucketState>,
    audit: Vec<AuditEvent>,
}

/// In-memory store. Not durable, not shared across processes: a stand-in
/// for the Redis-backed production client in tests and single-node runs.
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    poll_interval: Duration,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()), poll_interval: Duration::from_millis(5) }
    }

    /// Snapshot of every appended audit event, for assertions in tests.
    pub async fn audit_log(&self) -> Vec<AuditEvent> {
        self.inner.lock().await.audit.clone()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreClient for InMemoryStore {
    async fn list_push_back(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.inner.lock().await.lists.entry(key.to_string()).or_default().push_back(value);
        Ok(())
    }

    async fn list_pop_front(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.lock().await.lists.get_mut(key).and_then(|l| l.pop_front()))
    }

    async fn list_remove(&self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        let mut guard = self.inner.lock().await;
        let Some(list) = guard.lists.get_mut(key) else { return Ok(false) };
        if let Some(pos) = list.iter().position(|v| v.as_slice() == value) {
            list.remove(pos);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        Ok(self.inner.lock().await.lists.get(key).map(|l| l.len()).unwrap_or(0))
    }

    async fn list_items(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        Ok(self.inner.lock().await.lists.get(key).map(|l| l.iter().cloned().collect()).unwrap_or_default())
    }

    async fn atomic_move(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut guard = self.inner.lock().await;
                if let Some(item) = guard.lists.get_mut(src).and_then(|l| l.pop_front()) {
                    guard.lists.entry(dst.to_string()).or_default().push_back(item.clone());
                    return Ok(Some(item));
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - Instant::now())).await;
        }
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.inner.lock().await.hashes.get(key).and_then(|h| h.get(field)).cloned())
    }

    async fn hash_set(&self, key: &str, field: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value);
        Ok(())
    }

    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        let mut guard = self.inner.lock().await;
        let slot = guard.hashes.entry(key.to_string()).or_default().entry(field.to_string()).or_insert_with(|| b"0".to_vec());
        let current: i64 = std::str::from_utf8(slot)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| StoreError::Serialization(format!("non-integer hash field {key}.{field}")))?;
        let updated = current + delta;
        *slot = updated.to_string().into_bytes();
        Ok(updated)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Vec<u8>>, StoreError> {
        Ok(self.inner.lock().await.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .hashes
            .get_mut(key)
            .map(|h| h.remove(field).is_some())
            .unwrap_or(false))
    }

    async fn key_set_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .ttl_keys
            .insert(key.to_string(), TtlEntry { value, expires_at: Instant::now() + ttl });
        Ok(())
    }

    async fn key_exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut guard = self.inner.lock().await;
        let expired = guard.ttl_keys.get(key).map(|e| Instant::now() >= e.expires_at).unwrap_or(false);
        if expired {
            guard.ttl_keys.remove(key);
        }
        Ok(guard.ttl_keys.contains_key(key))
    }

    async fn key_delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.lock().await.ttl_keys.remove(key);
        Ok(())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.inner.lock().await.sets.entry(key.to_string()).or_default().insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        if let Some(set) = self.inner.lock().await.sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.inner.lock().await.sets.get(key).map(|s| s.iter().cloned().collect()).unwrap_or_default())
    }

    async fn zadd(&self, key: &str, member: Vec<u8>, score: f64) -> Result<(), StoreError> {
        let mut guard = self.inner.lock().await;
        let z = guard.zsets.entry(key.to_string()).or_default();
        z.retain(|(m, _)| m != &member);
        z.push((member, score));
        Ok(())
    }

    async fn zpop_min_below(
        &self,
        key: &str,
        max_score: f64,
    ) -> Result<Option<(Vec<u8>, f64)>, StoreError> {
        let mut guard = self.inner.lock().await;
        let Some(z) = guard.zsets.get_mut(key) else { return Ok(None) };
        let Some((idx, _)) = z
            .iter()
            .enumerate()
            .filter(|(_, (_, score))| *score <= max_score)
            .min_by(|a, b| a.1 .1.partial_cmp(&b.1 .1).unwrap_or(std::cmp::Ordering::Equal))
        else {
            return Ok(None);
        };
        Ok(Some(z.remove(idx)))
    }

    async fn token_bucket_consume(
        &self,
        scope: &str,
        requested: f64,
        capacity: f64,
        refill_per_sec: f64,
        now_ms: u64,
        _ttl_sec: u64,
        dry_run: bool,
    ) -> Result<TokenBucketResult, StoreError> {
        let mut guard = self.inner.lock().await;
        let state = guard.buckets.entry(scope.to_string()).or_insert(TokenBucketState {
            tokens: capacity,
            last_refill_ms: now_ms,
        });

        let elapsed_ms = now_ms.saturating_sub(state.last_refill_ms);
        let refilled = (elapsed_ms as f64 / 1000.0) * refill_per_sec;
        let tokens_after_refill = (state.tokens + refilled).min(capacity);

        let would_allow = tokens_after_refill >= requested;
        let allowed = would_allow && !dry_run;

        let final_tokens = if allowed { tokens_after_refill - requested } else { tokens_after_refill };

        state.tokens = final_tokens;
        state.last_refill_ms = now_ms;

        let retry_after_ms = if would_allow {
            0
        } else if refill_per_sec > 0.0 {
            (((requested - tokens_after_refill) / refill_per_sec) * 1000.0).ceil() as u64
        } else {
            u64::MAX
        };

        Ok(TokenBucketResult {
            allowed,
            consumed: if allowed { requested } else { 0.0 },
            remaining: final_tokens,
            retry_after_ms,
            dry_run_would_allow: would_allow,
        })
    }

    async fn dlq_requeue_atomic(
        &self,
        dlq_key: &str,
        entry_id: &str,
        target_queue_key: &str,
        updated_payload: Vec<u8>,
    ) -> Result<bool, StoreError> {
        let mut guard = self.inner.lock().await;
        let removed = guard.hashes.get_mut(dlq_key).and_then(|h| h.remove(entry_id));
        if removed.is_none() {
            return Ok(false);
        }
        guard.lists.entry(target_queue_key.to_string()).or_default().push_back(updated_payload);
        Ok(true)
    }

    async fn append_audit(&self, event: AuditEvent) -> Result<(), StoreError> {
        self.inner.lock().await.audit.push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wq_core::AuditOutcome;

    #[tokio::test]
    async fn push_pop_is_fifo() {
        let store = InMemoryStore::new();
        store.list_push_back("q", b"a".to_vec()).await.unwrap();
        store.list_push_back("q", b"b".to_vec()).await.unwrap();
        assert_eq!(store.list_pop_front("q").await.unwrap(), Some(b"a".to_vec()));
        assert_eq!(store.list_pop_front("q").await.unwrap(), Some(b"b".to_vec()));
        assert_eq!(store.list_pop_front("q").await.unwrap(), None);
    }

    #[tokio::test]
    async fn atomic_move_relocates_item() {
        let store = InMemoryStore::new();
        store.list_push_back("src", b"job".to_vec()).await.unwrap();
        let moved = store.atomic_move("src", "dst", Duration::from_millis(50)).await.unwrap();
        assert_eq!(moved, Some(b"job".to_vec()));
        assert_eq!(store.list_len("src").await.unwrap(), 0);
        assert_eq!(store.list_len("dst").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn atomic_move_times_out_on_empty_source() {
        let store = InMemoryStore::new();
        let start = Instant::now();
        let moved = store.atomic_move("src", "dst", Duration::from_millis(20)).await.unwrap();
        assert!(moved.is_none());
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[tokio::test]
    async fn token_bucket_allows_then_denies_on_exhaustion() {
        let store = InMemoryStore::new();
        let first = store.token_bucket_consume("t1", 5.0, 10.0, 1.0, 0, 60, false).await.unwrap();
        assert!(first.allowed);
        assert_eq!(first.remaining, 5.0);

        let second = store.token_bucket_consume("t1", 8.0, 10.0, 1.0, 0, 60, false).await.unwrap();
        assert!(!second.allowed);
        assert_eq!(second.consumed, 0.0);
    }

    #[tokio::test]
    async fn token_bucket_refills_over_time() {
        let store = InMemoryStore::new();
        store.token_bucket_consume("t1", 10.0, 10.0, 5.0, 0, 60, false).await.unwrap();
        let refilled = store.token_bucket_consume("t1", 5.0, 10.0, 5.0, 1_000, 60, false).await.unwrap();
        assert!(refilled.allowed);
    }

    #[tokio::test]
    async fn dry_run_never_mutates_state() {
        let store = InMemoryStore::new();
        let before = store.token_bucket_consume("t1", 5.0, 10.0, 0.0, 0, 60, true).await.unwrap();
        assert!(!before.allowed);
        assert!(before.dry_run_would_allow);
        let real = store.token_bucket_consume("t1", 10.0, 10.0, 0.0, 0, 60, false).await.unwrap();
        assert!(real.allowed, "dry run must not have consumed capacity");
    }

    #[tokio::test]
    async fn dlq_requeue_moves_entry_to_target_queue() {
        let store = InMemoryStore::new();
        store.hash_set("dlq:entries", "dlq_1", b"payload".to_vec()).await.unwrap();
        let moved = store.dlq_requeue_atomic("dlq:entries", "dlq_1", "t:acme:queue:normal", b"updated".to_vec()).await.unwrap();
        assert!(moved);
        assert_eq!(store.list_items("t:acme:queue:normal").await.unwrap(), vec![b"updated".to_vec()]);
        assert!(store.hash_get("dlq:entries", "dlq_1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dlq_requeue_on_missing_entry_is_noop() {
        let store = InMemoryStore::new();
        let moved = store.dlq_requeue_atomic("dlq:entries", "missing", "q", vec![]).await.unwrap();
        assert!(!moved);
        assert_eq!(store.list_len("q").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn hash_delete_removes_field_and_reports_absence() {
        let store = InMemoryStore::new();
        store.hash_set("dlq:entries", "dlq_1", b"payload".to_vec()).await.unwrap();
        assert!(store.hash_delete("dlq:entries", "dlq_1").await.unwrap());
        assert!(store.hash_get("dlq:entries", "dlq_1").await.unwrap().is_none());
        assert!(!store.hash_delete("dlq:entries", "dlq_1").await.unwrap());
    }

    #[tokio::test]
    async fn audit_events_accumulate() {
        let store = InMemoryStore::new();
        store
            .append_audit(AuditEvent::new(0, "admin", "acme", "purge", "dlq_1", AuditOutcome::Success))
            .await
            .unwrap();
        assert_eq!(store.audit_log().await.len(), 1);
    }
}
