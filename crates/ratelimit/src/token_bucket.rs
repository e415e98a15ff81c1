// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token Bucket Engine (spec §4.1).
//!
//! The atomic refill+consume happens server-side via
//! [`wq_storage::StoreClient::token_bucket_consume`]; this module only
//! wraps that call with the scope-naming and two-level (tenant-then-global)
//! layering the spec describes, so callers never hand-roll the key shape
//! or the overcommit behavior themselves.

use crate::error::RateLimitError;
use std::sync::Arc;
use wq_core::Clock;
use wq_storage::StoreClient;

#[derive(Debug, Clone, Copy)]
pub struct BucketConfig {
    pub capacity: f64,
    pub refill_per_sec: f64,
    pub ttl_sec: u64,
}

/// Outcome of a single-scope consume (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumeDecision {
    pub allowed: bool,
    pub consumed: f64,
    pub remaining: f64,
    pub retry_after_ms: u64,
    pub dry_run_would_allow: bool,
}

impl From<wq_storage::TokenBucketResult> for ConsumeDecision {
    fn from(r: wq_storage::TokenBucketResult) -> Self {
        Self {
            allowed: r.allowed,
            consumed: r.consumed,
            remaining: r.remaining,
            retry_after_ms: r.retry_after_ms,
            dry_run_would_allow: r.dry_run_would_allow,
        }
    }
}

/// Result of layering a tenant-scoped consume under a global-scoped one
/// (spec §4.1 "Callers layer two consume calls: tenant scope then global
/// scope", spec §9 "Overcommit in two-level rate limiting").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayeredDecision {
    pub allowed: bool,
    pub tenant: ConsumeDecision,
    /// `None` when the tenant check already denied (global is never called).
    pub global: Option<ConsumeDecision>,
    pub retry_after_ms: u64,
}

/// Atomic refill+consume against the store, with the tenant-then-global
/// layering rule from spec §4.1/§9 built in.
pub struct TokenBucketEngine<S, C> {
    store: Arc<S>,
    clock: C,
}

impl<S, C> TokenBucketEngine<S, C>
where
    S: StoreClient,
    C: Clock,
{
    pub fn new(store: Arc<S>, clock: C) -> Self {
        Self { store, clock }
    }

    /// Single-scope consume (spec §4.1 `consume`).
    pub async fn consume(
        &self,
        scope: &str,
        requested: f64,
        config: BucketConfig,
        dry_run: bool,
    ) -> Result<ConsumeDecision, RateLimitError> {
        let key = wq_core::keys::rate_limit_key(scope);
        let result = self
            .store
            .token_bucket_consume(
                &key,
                requested,
                config.capacity,
                config.refill_per_sec,
                self.clock.epoch_ms(),
                config.ttl_sec,
                dry_run,
            )
            .await?;
        Ok(result.into())
    }

    /// Tenant-scope-then-global-scope consume (spec §4.1 layering, §9
    /// "accepted because global denials are rare and tenants have their
    /// own caps"). On global deny, the tenant's consumption is NOT rolled
    /// back — the spec's deliberate overcommit tradeoff.
    pub async fn consume_layered(
        &self,
        tenant_scope: &str,
        global_scope: &str,
        requested: f64,
        tenant_config: BucketConfig,
        global_config: BucketConfig,
        dry_run: bool,
    ) -> Result<LayeredDecision, RateLimitError> {
        let tenant = self.consume(tenant_scope, requested, tenant_config, dry_run).await?;
        if !tenant.allowed {
            return Ok(LayeredDecision {
                allowed: false,
                retry_after_ms: tenant.retry_after_ms,
                tenant,
                global: None,
            });
        }
        let global = self.consume(global_scope, requested, global_config, dry_run).await?;
        Ok(LayeredDecision {
            allowed: global.allowed,
            retry_after_ms: global.retry_after_ms,
            tenant,
            global: Some(global),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wq_core::FakeClock;
    use wq_adapters::InMemoryStore;

    fn config(capacity: f64, rate: f64) -> BucketConfig {
        BucketConfig { capacity, refill_per_sec: rate, ttl_sec: 60 }
    }

    #[tokio::test]
    async fn basic_accept_scenario() {
        // spec §8 scenario 1: burst 20, rate 10/s, consume(t1, 5) -> allowed, remaining 15.
        let engine = TokenBucketEngine::new(Arc::new(InMemoryStore::new()), FakeClock::new(0));
        let decision = engine.consume("t1", 5.0, config(20.0, 10.0), false).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.consumed, 5.0);
        assert_eq!(decision.remaining, 15.0);
    }

    #[tokio::test]
    async fn burst_then_deny_scenario() {
        // spec §8 scenario 2: t1 drained to 0, consume(25) -> denied, retry_after ~= 2500ms at 10/s.
        let clock = FakeClock::new(0);
        let engine = TokenBucketEngine::new(Arc::new(InMemoryStore::new()), clock.clone());
        let drained = engine.consume("t1", 20.0, config(20.0, 10.0), false).await.unwrap();
        assert!(drained.allowed);
        assert_eq!(drained.remaining, 0.0);

        let denied = engine.consume("t1", 25.0, config(20.0, 10.0), false).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_ms, 2_500);
    }

    #[tokio::test]
    async fn dry_run_reports_without_mutating() {
        let engine = TokenBucketEngine::new(Arc::new(InMemoryStore::new()), FakeClock::new(0));
        let preview = engine.consume("t1", 5.0, config(10.0, 1.0), true).await.unwrap();
        assert!(!preview.allowed);
        assert!(preview.dry_run_would_allow);
        let real = engine.consume("t1", 10.0, config(10.0, 1.0), false).await.unwrap();
        assert!(real.allowed, "dry run must not have consumed capacity");
    }

    #[tokio::test]
    async fn layered_consume_denies_on_tenant_without_touching_global() {
        let engine = TokenBucketEngine::new(Arc::new(InMemoryStore::new()), FakeClock::new(0));
        let decision = engine
            .consume_layered(
                "tenant:acme",
                "global",
                100.0,
                config(10.0, 1.0),
                config(1_000.0, 100.0),
                false,
            )
            .await
            .unwrap();
        assert!(!decision.allowed);
        assert!(decision.global.is_none());
    }

    #[tokio::test]
    async fn layered_consume_overcommits_tenant_on_global_deny() {
        // Tenant has plenty of capacity; global is nearly exhausted. Spec §9:
        // the tenant bucket is still debited even though the overall request
        // is denied at the global layer.
        let engine = TokenBucketEngine::new(Arc::new(InMemoryStore::new()), FakeClock::new(0));
        let decision = engine
            .consume_layered(
                "tenant:acme",
                "global",
                10.0,
                config(100.0, 10.0),
                config(5.0, 1.0),
                false,
            )
            .await
            .unwrap();
        assert!(!decision.allowed);
        assert!(decision.tenant.allowed, "tenant layer should have accepted");
        assert!(!decision.global.unwrap().allowed);

        // Re-consuming against the tenant scope proves the first debit stuck.
        let follow_up = engine.consume("tenant:acme", 95.0, config(100.0, 10.0), false).await.unwrap();
        assert!(!follow_up.allowed, "tenant tokens should already be reduced by the overcommitted consume");
    }
}
