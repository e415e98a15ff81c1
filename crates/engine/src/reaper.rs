// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash recovery (spec §4.5 "Reaper").
//!
//! Periodically walks the worker registry set (never a full keyspace
//! scan, per spec §9's explicit ban on that pattern) and restores the
//! in-flight work of any worker whose heartbeat has expired.

use crate::error::EngineError;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wq_core::{Job, PriorityClass, Scope, WorkerRegistration};
use wq_storage::StoreClient;

#[derive(Debug, Clone, Copy)]
pub struct ReaperConfig {
    pub sweep_interval: Duration,
    /// Priority a job is requeued under when its own payload fails to
    /// decode enough to recover its original priority (spec §4.5 "push
    /// back ... or an inferred default").
    pub default_priority: PriorityClass,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self { sweep_interval: Duration::from_secs(10), default_priority: PriorityClass::Normal }
    }
}

/// Outcome of one [`Reaper::sweep`] pass, useful for tests and the
/// daemon's status report.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub dead_workers: usize,
    pub jobs_restored: usize,
}

pub struct Reaper<S> {
    store: Arc<S>,
    config: ReaperConfig,
}

impl<S: StoreClient> Reaper<S> {
    pub fn new(store: Arc<S>, config: ReaperConfig) -> Self {
        Self { store, config }
    }

    /// One sweep of the registry (spec §4.5). A dead worker's in-flight
    /// list is drained, each payload pushed back to its queue, then the
    /// worker is removed from the registry. Restoration is idempotent by
    /// construction: a second reaper racing the same dead worker finds
    /// an empty in-flight list and a no-op `set_remove` (spec §4.5
    /// "Concurrency").
    pub async fn sweep(&self) -> Result<SweepReport, EngineError> {
        let mut report = SweepReport::default();
        let members = self.store.set_members(wq_core::keys::workers_set_key()).await?;

        for raw in members {
            let Some(registration) = WorkerRegistration::decode(&raw) else {
                tracing::warn!(raw, "dropping unparseable worker registry entry");
                self.store.set_remove(wq_core::keys::workers_set_key(), &raw).await?;
                continue;
            };
            let scope = registration.scope();
            let heartbeat_key = scope.heartbeat_key(&registration.worker_id);
            if self.store.key_exists(&heartbeat_key).await? {
                continue;
            }

            report.dead_workers += 1;
            let inflight_key = scope.inflight_key(&registration.worker_id);
            let restored = self.restore_inflight(&scope, &inflight_key).await?;
            report.jobs_restored += restored;

            self.store.key_delete(&inflight_key).await?;
            self.store.set_remove(wq_core::keys::workers_set_key(), &raw).await?;
            tracing::info!(worker_id = %registration.worker_id, restored, "restored dead worker's in-flight jobs");
        }

        Ok(report)
    }

    async fn restore_inflight(&self, scope: &Scope, inflight_key: &str) -> Result<usize, EngineError> {
        let mut restored = 0;
        loop {
            let Some(raw) = self.store.list_pop_front(inflight_key).await? else { break };
            let target_key = match wq_wire::decode(&raw) {
                Ok(job) => scope.queue_key(&job.priority_class),
                Err(err) => {
                    tracing::warn!(%err, "in-flight payload undecodable, restoring under default priority");
                    scope.queue_key(&self.config.default_priority)
                }
            };
            self.store.list_push_back(&target_key, raw).await?;
            restored += 1;
        }
        Ok(restored)
    }

    /// Run sweeps on `sweep_interval` until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.sweep_interval) => {}
                _ = shutdown.cancelled() => return,
            }
            match self.sweep().await {
                Ok(report) if report.dead_workers > 0 => {
                    tracing::info!(?report, "reaper sweep restored dead workers");
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(%err, "reaper sweep failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wq_adapters::InMemoryStore;
    use wq_core::{JobId, TenantId};
    use wq_wire::encode;

    fn job(priority: PriorityClass) -> Job {
        Job {
            job_id: JobId::new(),
            tenant_id: TenantId::parse("acme-corp").unwrap(),
            queue: "emails".into(),
            priority_class: priority,
            payload: b"hello".to_vec(),
            created_at_ms: 0,
            retries: 0,
            max_retries: 3,
            trace_id: None,
            span_id: None,
            file_size_hint: None,
            job_type: None,
            extra: Default::default(),
        }
    }

    #[tokio::test]
    async fn heartbeat_present_leaves_inflight_untouched() {
        let store = Arc::new(InMemoryStore::new());
        let scope = Scope::Global;
        let registration = WorkerRegistration::new("w1", &scope);
        store.set_add(wq_core::keys::workers_set_key(), &registration.encode()).await.unwrap();
        store
            .key_set_ttl(&scope.heartbeat_key("w1"), b"alive".to_vec(), Duration::from_secs(30))
            .await
            .unwrap();
        store.list_push_back(&scope.inflight_key("w1"), encode(&job(PriorityClass::Normal)).unwrap()).await.unwrap();

        let reaper = Reaper::new(store.clone(), ReaperConfig::default());
        let report = reaper.sweep().await.unwrap();
        assert_eq!(report.dead_workers, 0);
        assert_eq!(store.list_len(&scope.inflight_key("w1")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expired_heartbeat_restores_inflight_jobs_to_source_queue() {
        let store = Arc::new(InMemoryStore::new());
        let scope = Scope::Global;
        let registration = WorkerRegistration::new("w1", &scope);
        store.set_add(wq_core::keys::workers_set_key(), &registration.encode()).await.unwrap();
        // No heartbeat key installed: presumed dead.
        store.list_push_back(&scope.inflight_key("w1"), encode(&job(PriorityClass::High)).unwrap()).await.unwrap();

        let reaper = Reaper::new(store.clone(), ReaperConfig::default());
        let report = reaper.sweep().await.unwrap();
        assert_eq!(report.dead_workers, 1);
        assert_eq!(report.jobs_restored, 1);
        assert_eq!(store.list_len(&scope.queue_key(&PriorityClass::High)).await.unwrap(), 1);
        assert_eq!(store.list_len(&scope.inflight_key("w1")).await.unwrap(), 0);
        assert!(store.set_members(wq_core::keys::workers_set_key()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn undecodable_payload_restores_under_default_priority() {
        let store = Arc::new(InMemoryStore::new());
        let scope = Scope::Global;
        let registration = WorkerRegistration::new("w1", &scope);
        store.set_add(wq_core::keys::workers_set_key(), &registration.encode()).await.unwrap();
        store.list_push_back(&scope.inflight_key("w1"), b"not json".to_vec()).await.unwrap();

        let reaper = Reaper::new(store.clone(), ReaperConfig::default());
        let report = reaper.sweep().await.unwrap();
        assert_eq!(report.jobs_restored, 1);
        assert_eq!(store.list_len(&scope.queue_key(&PriorityClass::Normal)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn purge_all_zero_matches_is_not_an_error() {
        let store = Arc::new(InMemoryStore::new());
        let reaper = Reaper::new(store, ReaperConfig::default());
        let report = reaper.sweep().await.unwrap();
        assert_eq!(report, SweepReport::default());
    }
}
