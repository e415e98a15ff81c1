// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend-agnostic store operations (spec §6 "Store operations required").
//!
//! Every concrete backend (in-memory, Redis) implements this trait once;
//! every other crate in the workspace (rate limiter, worker runtime,
//! reaper, DLQ, remediation engine) depends only on the trait, never on a
//! concrete backend. The claim move and token-bucket consume are
//! documented as server-side atomic scripts (spec §4.1/§5) and are
//! first-class trait methods rather than assembled client-side from
//! smaller primitives, so an implementation is free to back them with a
//! single Lua `EVAL` instead of a read-modify-write race.

use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use wq_core::AuditEvent;

/// Outcome of [`StoreClient::token_bucket_consume`] (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucketResult {
    pub allowed: bool,
    pub consumed: f64,
    pub remaining: f64,
    pub retry_after_ms: u64,
    /// What would have happened, for `dry_run` callers (spec §4.1).
    pub dry_run_would_allow: bool,
}

/// Backend-agnostic key-value + list + hash + sorted-set + streams store.
#[async_trait]
pub trait StoreClient: Send + Sync {
    // --- Lists (queues, in-flight lists, completed/DLQ ledgers) ---

    /// Tail-push a value onto a list (enqueue).
    async fn list_push_back(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Head-pop a value from a list without blocking. `None` if empty.
    async fn list_pop_front(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Remove the first occurrence of `value` from a list (remove-by-value).
    async fn list_remove(&self, key: &str, value: &[u8]) -> Result<bool, StoreError>;

    async fn list_len(&self, key: &str) -> Result<usize, StoreError>;

    async fn list_items(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError>;

    /// Atomically pop the head of `src` and push it to the tail of `dst`,
    /// blocking up to `timeout` for an item to appear in `src`. This is
    /// the claim primitive (spec §4.3 step 2, §5 "Atomicity"): the single
    /// server-side operation that moves a job from a source queue to a
    /// worker's in-flight list.
    async fn atomic_move(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, StoreError>;

    // --- Hashes (token bucket state, fairness state, worker records) ---

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn hash_set(&self, key: &str, field: &str, value: Vec<u8>) -> Result<(), StoreError>;

    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError>;

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Vec<u8>>, StoreError>;

    /// Remove a single field from a hash. Returns `false` if the field was
    /// absent. Used by the remediation engine's purge paths, which delete a
    /// DLQ entry outright rather than requeueing it (see
    /// `dlq_requeue_atomic` for the requeue-coupled delete).
    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError>;

    // --- Keys with TTL (heartbeats) ---

    async fn key_set_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError>;

    async fn key_exists(&self, key: &str) -> Result<bool, StoreError>;

    async fn key_delete(&self, key: &str) -> Result<(), StoreError>;

    // --- Sets (worker registry) ---

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError>;

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    // --- Sorted sets (scheduled/retry sets) ---

    async fn zadd(&self, key: &str, member: Vec<u8>, score: f64) -> Result<(), StoreError>;

    /// Pop and return the lowest-scored member if its score is `<= max_score`.
    async fn zpop_min_below(
        &self,
        key: &str,
        max_score: f64,
    ) -> Result<Option<(Vec<u8>, f64)>, StoreError>;

    // --- Atomic scripts ---

    /// Atomic refill + consume against a named scope (spec §4.1). The
    /// canonical `consume()` operation: load `{tokens, last_refill}`,
    /// compute the refill, deduct if eligible (and not `dry_run`),
    /// persist, and refresh TTL on every successful write.
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
    ) -> Result<TokenBucketResult, StoreError>;

    /// Atomically remove a DLQ entry and push the given payload onto a
    /// target queue. Returns `false` (and leaves the DLQ entry intact) if
    /// the entry no longer exists (spec §4.7 "On push failure, DLQ entry
    /// is preserved").
    async fn dlq_requeue_atomic(
        &self,
        dlq_key: &str,
        entry_id: &str,
        target_queue_key: &str,
        updated_payload: Vec<u8>,
    ) -> Result<bool, StoreError>;

    // --- Audit trail ---

    async fn append_audit(&self, event: AuditEvent) -> Result<(), StoreError>;
}
