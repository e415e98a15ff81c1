// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dead-letter remediation (spec §4.7).
//!
//! `requeue` moves a DLQ entry back onto its source queue; `purge` drops
//! it outright. The bulk variants aggregate per-item outcomes rather than
//! failing the whole batch on one bad id (spec §7 "Configuration error"
//! policy applies only to the batch as a whole — bulk size and dry-run
//! flag — not to individual item failures within an accepted batch).

use crate::dlq::store::DlqStore;
use crate::error::EngineError;
use serde_json::json;
use std::sync::Arc;
use wq_core::{AuditEvent, AuditOutcome, Clock, Scope, TenantId};
use wq_storage::{paginate, DlqFilter, DlqSortKey, StoreClient};

/// Outcome of a single item within a bulk operation.
#[derive(Debug, Clone)]
pub struct BulkFailure {
    pub id: String,
    pub error: String,
}

/// Aggregated result of a bulk requeue/purge/purge-all (spec §4.7).
#[derive(Debug, Clone)]
pub struct BulkResult {
    pub total_requested: usize,
    pub successful: Vec<String>,
    pub failed: Vec<BulkFailure>,
    pub started_at_ms: u64,
    pub completed_at_ms: u64,
    pub dry_run: bool,
}

impl BulkResult {
    pub fn duration_ms(&self) -> u64 {
        self.completed_at_ms.saturating_sub(self.started_at_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BulkOp {
    Requeue,
    Purge,
}

pub struct RemediationEngine<S, C> {
    store: Arc<S>,
    dlq: DlqStore<S>,
    clock: C,
    bulk_limit: usize,
}

impl<S: StoreClient, C: Clock> RemediationEngine<S, C> {
    pub fn new(store: Arc<S>, clock: C, bulk_limit: usize) -> Self {
        let dlq = DlqStore::new(Arc::clone(&store));
        Self { store, dlq, clock, bulk_limit }
    }

    /// Requeue one entry: enrich the payload, push to its source queue,
    /// then remove from the DLQ. A push failure leaves the entry in
    /// place (spec §4.7); a push success followed by a delete failure is
    /// logged and tolerated, relying on consumer idempotency.
    pub async fn requeue(&self, id: &str, actor: &str) -> Result<(), EngineError> {
        let Some(entry) = self.dlq.get(id).await? else {
            return Err(EngineError::DlqEntryNotFound(id.to_string()));
        };

        let mut job = wq_wire::decode(&entry.payload)
            .map_err(|err| EngineError::PoisonPill(err.to_string()))?;
        job.extra.insert("requeued_from_dlq".to_string(), json!(true));
        job.extra.insert("original_dlq_id".to_string(), json!(entry.id.as_str()));
        job.extra.insert("requeued_at".to_string(), json!(self.clock.epoch_ms()));
        job.extra.insert("attempt_count".to_string(), json!(entry.attempts.len()));

        let encoded = wq_wire::encode(&job).map_err(|err| EngineError::Serialization(err.to_string()))?;
        let scope = TenantId::parse(entry.tenant_id.clone()).map(Scope::Tenant).unwrap_or(Scope::Global);
        let target_key = scope.queue_key(&entry.priority);

        if let Err(err) = self.store.list_push_back(&target_key, encoded).await {
            self.audit(actor, &entry.tenant_id, "requeue", id, AuditOutcome::Failure, Some(err.to_string()))
                .await;
            return Err(err.into());
        }

        match self.dlq.delete(id).await {
            Ok(_) => {
                self.audit(actor, &entry.tenant_id, "requeue", id, AuditOutcome::Success, None).await;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%id, %err, "requeued entry but failed to remove it from the DLQ, tolerating");
                self.audit(actor, &entry.tenant_id, "requeue", id, AuditOutcome::Success, Some(err.to_string()))
                    .await;
                Ok(())
            }
        }
    }

    /// Drop an entry without requeueing it.
    pub async fn purge(&self, id: &str, actor: &str) -> Result<(), EngineError> {
        let Some(entry) = self.dlq.get(id).await? else {
            return Err(EngineError::DlqEntryNotFound(id.to_string()));
        };
        let removed = self.dlq.delete(id).await?;
        let outcome = if removed { AuditOutcome::Success } else { AuditOutcome::Failure };
        self.audit(actor, &entry.tenant_id, "purge", id, outcome, None).await;
        Ok(())
    }

    pub async fn bulk_requeue(&self, ids: &[String], actor: &str, dry_run: bool) -> Result<BulkResult, EngineError> {
        self.run_bulk(ids, actor, dry_run, "bulk_requeue", BulkOp::Requeue).await
    }

    pub async fn bulk_purge(&self, ids: &[String], actor: &str, dry_run: bool) -> Result<BulkResult, EngineError> {
        self.run_bulk(ids, actor, dry_run, "bulk_purge", BulkOp::Purge).await
    }

    /// Purge every DLQ entry matching `filter`. A filter matching zero
    /// entries is a zero-count success, not an error (spec §8).
    pub async fn purge_all(&self, filter: &DlqFilter, actor: &str, dry_run: bool) -> Result<BulkResult, EngineError> {
        let all = self.dlq.list_all().await?;
        let matched = paginate(all, filter, DlqSortKey::FailedAt, 0, usize::MAX);
        let ids: Vec<String> = matched.entries.iter().map(|e| e.id.as_str().to_string()).collect();
        self.bulk_purge(&ids, actor, dry_run).await
    }

    async fn run_bulk(
        &self,
        ids: &[String],
        actor: &str,
        dry_run: bool,
        operation: &str,
        op: BulkOp,
    ) -> Result<BulkResult, EngineError> {
        if ids.len() > self.bulk_limit {
            return Err(EngineError::BulkSizeExceeded(ids.len(), self.bulk_limit));
        }

        let started_at_ms = self.clock.epoch_ms();
        let mut successful = Vec::new();
        let mut failed = Vec::new();

        if dry_run {
            for id in ids {
                match self.dlq.get(id).await? {
                    Some(_) => successful.push(id.clone()),
                    None => failed.push(BulkFailure { id: id.clone(), error: "not found".to_string() }),
                }
            }
        } else {
            for id in ids {
                let outcome = match op {
                    BulkOp::Requeue => self.requeue(id, actor).await,
                    BulkOp::Purge => self.purge(id, actor).await,
                };
                match outcome {
                    Ok(()) => successful.push(id.clone()),
                    Err(err) => failed.push(BulkFailure { id: id.clone(), error: err.to_string() }),
                }
            }
        }

        let completed_at_ms = self.clock.epoch_ms();
        tracing::info!(operation, requested = ids.len(), succeeded = successful.len(), failed = failed.len(), dry_run, "bulk remediation finished");
        metrics::counter!("wq_remediation_bulk_total").increment(1);

        Ok(BulkResult { total_requested: ids.len(), successful, failed, started_at_ms, completed_at_ms, dry_run })
    }

    async fn audit(&self, actor: &str, tenant: &str, operation: &str, target: &str, outcome: AuditOutcome, reason: Option<String>) {
        let mut event = AuditEvent::new(self.clock.epoch_ms(), actor, tenant, operation, target, outcome);
        if let Some(reason) = reason {
            event = event.with_reason(reason);
        }
        if let Err(err) = self.store.append_audit(event).await {
            tracing::warn!(%err, "failed to append audit event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlq::store::build_dlq_entry;
    use wq_adapters::InMemoryStore;
    use wq_core::{FakeClock, Job, JobId, PriorityClass, TenantId};

    fn job() -> Job {
        Job {
            job_id: JobId::new(),
            tenant_id: TenantId::parse("acme-corp").unwrap(),
            queue: "emails".into(),
            priority_class: PriorityClass::Normal,
            payload: b"hello".to_vec(),
            created_at_ms: 0,
            retries: 1,
            max_retries: 1,
            trace_id: None,
            span_id: None,
            file_size_hint: None,
            job_type: None,
            extra: Default::default(),
        }
    }

    async fn push_entry(store: &Arc<InMemoryStore>) -> String {
        let original = job();
        let encoded = wq_wire::encode(&original).unwrap();
        let mut entry = build_dlq_entry(&original, "boom", "w1", &FakeClock::new(0));
        entry.payload = encoded;
        let id = entry.id.as_str().to_string();
        DlqStore::new(Arc::clone(store)).push(entry).await.unwrap();
        id
    }

    #[tokio::test]
    async fn requeue_pushes_to_source_queue_and_removes_from_dlq() {
        let store = Arc::new(InMemoryStore::new());
        let id = push_entry(&store).await;
        let engine = RemediationEngine::new(Arc::clone(&store), FakeClock::new(1_000), 100);

        engine.requeue(&id, "operator").await.unwrap();

        let scope = Scope::Tenant(TenantId::parse("acme-corp").unwrap());
        assert_eq!(store.list_len(&scope.queue_key(&PriorityClass::Normal)).await.unwrap(), 1);
        assert!(DlqStore::new(Arc::clone(&store)).get(&id).await.unwrap().is_none());

        let raw = store.list_pop_front(&scope.queue_key(&PriorityClass::Normal)).await.unwrap().unwrap();
        let requeued = wq_wire::decode(&raw).unwrap();
        assert_eq!(requeued.extra.get("original_dlq_id").unwrap(), &serde_json::json!(id));
    }

    #[tokio::test]
    async fn purge_removes_without_requeueing() {
        let store = Arc::new(InMemoryStore::new());
        let id = push_entry(&store).await;
        let engine = RemediationEngine::new(Arc::clone(&store), FakeClock::new(0), 100);

        engine.purge(&id, "operator").await.unwrap();
        assert!(DlqStore::new(Arc::clone(&store)).get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bulk_requeue_reports_per_item_failures() {
        let store = Arc::new(InMemoryStore::new());
        let id = push_entry(&store).await;
        let engine = RemediationEngine::new(Arc::clone(&store), FakeClock::new(0), 100);

        let result = engine.bulk_requeue(&[id.clone(), "missing".to_string()], "operator", false).await.unwrap();
        assert_eq!(result.total_requested, 2);
        assert_eq!(result.successful, vec![id]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].id, "missing");
    }

    #[tokio::test]
    async fn dry_run_does_not_mutate_the_dlq() {
        let store = Arc::new(InMemoryStore::new());
        let id = push_entry(&store).await;
        let engine = RemediationEngine::new(Arc::clone(&store), FakeClock::new(0), 100);

        let result = engine.bulk_purge(&[id.clone()], "operator", true).await.unwrap();
        assert!(result.dry_run);
        assert_eq!(result.successful, vec![id.clone()]);
        assert!(DlqStore::new(Arc::clone(&store)).get(&id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn bulk_size_over_limit_fails_synchronously() {
        let store = Arc::new(InMemoryStore::new());
        let engine = RemediationEngine::new(store, FakeClock::new(0), 1);
        let err = engine.bulk_purge(&["a".to_string(), "b".to_string()], "operator", false).await.unwrap_err();
        assert!(matches!(err, EngineError::BulkSizeExceeded(2, 1)));
    }

    #[tokio::test]
    async fn purge_all_with_zero_matches_is_a_zero_count_success() {
        let store = Arc::new(InMemoryStore::new());
        let engine = RemediationEngine::new(store, FakeClock::new(0), 100);
        let result = engine.purge_all(&DlqFilter::default(), "operator", false).await.unwrap();
        assert_eq!(result.total_requested, 0);
        assert!(result.successful.is_empty());
        assert!(result.failed.is_empty());
    }
}
