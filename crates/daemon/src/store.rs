// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Backend selection (spec §6 "Store operations required").
//!
//! `Config::store.backend` names either `memory` or a `redis://` URL; this
//! module turns that string into a concrete, `Sized` [`StoreClient`] so the
//! generic worker/engine/ratelimit types never need a trait object. Adding a
//! third backend means adding a variant here, not touching anything that
//! depends on [`StoreClient`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use wq_core::AuditEvent;
use wq_storage::{StoreClient, StoreError, TokenBucketResult};

use crate::config::StoreSettings;

pub enum AnyStore {
    Memory(wq_adapters::InMemoryStore),
    #[cfg(feature = "redis-backend")]
    Redis(wq_adapters::RedisStore),
}

impl AnyStore {
    pub async fn connect(settings: &StoreSettings) -> Result<Self, StoreError> {
        if settings.backend == "memory" {
            return Ok(Self::Memory(wq_adapters::InMemoryStore::new()));
        }
        #[cfg(feature = "redis-backend")]
        if settings.backend.starts_with("redis://") {
            return Ok(Self::Redis(wq_adapters::RedisStore::connect(&settings.backend).await?));
        }
        Err(StoreError::Backend(format!(
            "unsupported store backend {:?} (expected \"memory\" or a redis:// url{})",
            settings.backend,
            if cfg!(feature = "redis-backend") { "" } else { "; build with --features redis-backend to enable redis://" }
        )))
    }
}

macro_rules! dispatch {
    ($self:expr, $method:ident($($arg:expr),*)) => {
        match $self {
            Self::Memory(s) => s.$method($($arg),*).await,
            #[cfg(feature = "redis-backend")]
            Self::Redis(s) => s.$method($($arg),*).await,
        }
    };
}

#[async_trait]
impl StoreClient for AnyStore {
    async fn list_push_back(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        dispatch!(self, list_push_back(key, value))
    }

    async fn list_pop_front(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        dispatch!(self, list_pop_front(key))
    }

    async fn list_remove(&self, key: &str, value: &[u8]) -> Result<bool, StoreError> {
        dispatch!(self, list_remove(key, value))
    }

    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        dispatch!(self, list_len(key))
    }

    async fn list_items(&self, key: &str) -> Result<Vec<Vec<u8>>, StoreError> {
        dispatch!(self, list_items(key))
    }

    async fn atomic_move(
        &self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        dispatch!(self, atomic_move(src, dst, timeout))
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<Vec<u8>>, StoreError> {
        dispatch!(self, hash_get(key, field))
    }

    async fn hash_set(&self, key: &str, field: &str, value: Vec<u8>) -> Result<(), StoreError> {
        dispatch!(self, hash_set(key, field, value))
    }

    async fn hash_incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError> {
        dispatch!(self, hash_incr(key, field, delta))
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, Vec<u8>>, StoreError> {
        dispatch!(self, hash_get_all(key))
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        dispatch!(self, hash_delete(key, field))
    }

    async fn key_set_ttl(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), StoreError> {
        dispatch!(self, key_set_ttl(key, value, ttl))
    }

    async fn key_exists(&self, key: &str) -> Result<bool, StoreError> {
        dispatch!(self, key_exists(key))
    }

    async fn key_delete(&self, key: &str) -> Result<(), StoreError> {
        dispatch!(self, key_delete(key))
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        dispatch!(self, set_add(key, member))
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError> {
        dispatch!(self, set_remove(key, member))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        dispatch!(self, set_members(key))
    }

    async fn zadd(&self, key: &str, member: Vec<u8>, score: f64) -> Result<(), StoreError> {
        dispatch!(self, zadd(key, member, score))
    }

    async fn zpop_min_below(
        &self,
        key: &str,
        max_score: f64,
    ) -> Result<Option<(Vec<u8>, f64)>, StoreError> {
        dispatch!(self, zpop_min_below(key, max_score))
    }

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
        dispatch!(self, token_bucket_consume(scope, requested, capacity, refill_per_sec, now_ms, ttl_sec, dry_run))
    }

    async fn dlq_requeue_atomic(
        &self,
        dlq_key: &str,
        entry_id: &str,
        target_queue_key: &str,
        updated_payload: Vec<u8>,
    ) -> Result<bool, StoreError> {
        dispatch!(self, dlq_requeue_atomic(dlq_key, entry_id, target_queue_key, updated_payload))
    }

    async fn append_audit(&self, event: AuditEvent) -> Result<(), StoreError> {
        dispatch!(self, append_audit(event))
    }
}
