// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker Runtime (spec §4.3).
//!
//! A [`WorkerLoop`] owns exactly one cooperative loop: gate on the
//! breaker, claim a job by priority order, install a heartbeat with a
//! background renewer, run the handler under cancellation, then perform
//! the terminal transition (success / retry / dead-letter) in the fixed
//! order the survival invariant requires. Cancellation mid-execution
//! abandons the claimed job in place for the reaper rather than tearing
//! down in-flight/heartbeat state itself (spec §5 "Cancellation
//! semantics").

use crate::dlq::store::{build_dlq_entry, DlqStore};
use crate::error::EngineError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wq_breaker::Gate;
use wq_core::{Clock, Job, PriorityClass, Scope, WorkerId};
use wq_storage::StoreClient;

/// Tunables for a worker loop (spec §6 "Configuration": worker count,
/// claim timeout, heartbeat TTL, max retries, backoff base/max).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Priority classes claimed in this strict order (spec §4.3 step 2).
    pub priorities: Vec<PriorityClass>,
    pub claim_timeout: Duration,
    pub heartbeat_ttl: Duration,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// How long a loop sleeps after the breaker denies before re-checking.
    pub breaker_pause: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            priorities: PriorityClass::WELL_KNOWN.to_vec(),
            claim_timeout: Duration::from_millis(200),
            heartbeat_ttl: Duration::from_secs(30),
            backoff_base_ms: 500,
            backoff_max_ms: 60_000,
            breaker_pause: Duration::from_millis(250),
        }
    }
}

/// Application handler invoked once per claimed job (spec §4.3 step 4).
/// `Err` carries a human-readable reason that flows into the retry/DLQ
/// path and, on dead-letter, the DLQ entry's `error.message`.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job, cancel: CancellationToken) -> Result<(), String>;
}

/// One cooperative worker loop (spec §4.3: "a worker process launches N
/// cooperative worker loops").
pub struct WorkerLoop<S, C> {
    pub id: WorkerId,
    pub scope: Scope,
    pub store: Arc<S>,
    pub gate: Arc<dyn Gate>,
    pub handler: Arc<dyn JobHandler>,
    pub config: WorkerConfig,
    pub clock: C,
}

impl<S, C> WorkerLoop<S, C>
where
    S: StoreClient + 'static,
    C: Clock,
{
    pub fn new(
        id: WorkerId,
        scope: Scope,
        store: Arc<S>,
        gate: Arc<dyn Gate>,
        handler: Arc<dyn JobHandler>,
        config: WorkerConfig,
        clock: C,
    ) -> Self {
        Self { id, scope, store, gate, handler, config, clock }
    }

    /// Run until `shutdown` is cancelled. Each iteration gates, claims,
    /// and dispatches one job; an empty claim (timeout, no work) simply
    /// loops again.
    pub async fn run(&self, shutdown: CancellationToken) {
        while !shutdown.is_cancelled() {
            let decision = self.gate.allow();
            if !decision.allowed {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.breaker_pause) => {}
                    _ = shutdown.cancelled() => break,
                }
                continue;
            }

            let claimed = tokio::select! {
                c = self.claim() => c,
                _ = shutdown.cancelled() => break,
            };

            let Some((priority, src_key, raw)) = claimed else { continue };

            match wq_wire::decode(&raw) {
                Ok(job) => self.process_claimed(job, raw, priority, shutdown.clone()).await,
                Err(err) => {
                    // Poison pill (spec §4.3 "Poison-pill safety"): drop it
                    // from in-flight, never retry, just log.
                    let inflight_key = self.scope.inflight_key(self.id.as_str());
                    let _ = self.store.list_remove(&inflight_key, &raw).await;
                    tracing::warn!(worker_id = %self.id, %src_key, error = %err, "dropping poison-pill payload");
                    metrics::counter!("wq_poison_pills_total").increment(1);
                }
            }
        }
    }

    /// Iterate configured priorities in order; first non-empty claim wins
    /// (spec §4.3 step 2).
    async fn claim(&self) -> Option<(PriorityClass, String, Vec<u8>)> {
        let inflight_key = self.scope.inflight_key(self.id.as_str());
        for priority in &self.config.priorities {
            let src_key = self.scope.queue_key(priority);
            match self.store.atomic_move(&src_key, &inflight_key, self.config.claim_timeout).await {
                Ok(Some(raw)) => return Some((priority.clone(), src_key, raw)),
                Ok(None) => continue,
                Err(err) => {
                    if err.is_breaker_significant() {
                        self.gate.record_failure();
                    }
                    tracing::warn!(worker_id = %self.id, %src_key, %err, "claim attempt failed");
                }
            }
        }
        None
    }

    /// Heartbeat install, handler execution, and terminal transition
    /// (spec §4.3 steps 3-6).
    async fn process_claimed(
        &self,
        job: Job,
        raw: Vec<u8>,
        priority: PriorityClass,
        shutdown: CancellationToken,
    ) {
        let span = tracing::info_span!(
            "job_execution",
            job_id = %job.job_id,
            tenant_id = %job.tenant_id,
            queue = %job.queue,
            priority = %priority,
            worker_id = %self.id,
            attempt = job.retries + 1,
        );
        let _entered = span.enter();

        let heartbeat_key = self.scope.heartbeat_key(self.id.as_str());
        let inflight_key = self.scope.inflight_key(self.id.as_str());

        if let Err(err) = self.store.key_set_ttl(&heartbeat_key, raw.clone(), self.config.heartbeat_ttl).await {
            tracing::warn!(%err, "failed to install heartbeat");
        }

        // Renewer refreshes TTL at ttl/3 and MUST exit before the terminal
        // transition runs, so no stale heartbeat survives the job it was
        // protecting (spec §9 "the specification MANDATES the renewer").
        let renew_stop = CancellationToken::new();
        let renew_handle = {
            let store = Arc::clone(&self.store);
            let heartbeat_key = heartbeat_key.clone();
            let raw = raw.clone();
            let ttl = self.config.heartbeat_ttl;
            let interval = (ttl / 3).max(Duration::from_millis(10));
            let stop = renew_stop.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {
                            if store.key_set_ttl(&heartbeat_key, raw.clone(), ttl).await.is_err() {
                                tracing::warn!("heartbeat renewal failed");
                            }
                        }
                        _ = stop.cancelled() => break,
                    }
                }
            })
        };

        let outcome = tokio::select! {
            result = self.handler.handle(&job, shutdown.clone()) => Some(result),
            _ = shutdown.cancelled() => None,
        };

        renew_stop.cancel();
        let _ = renew_handle.await;

        let Some(result) = outcome else {
            // Shutdown mid-execution: abandon in place, the reaper
            // restores it once the heartbeat expires (spec §5).
            tracing::info!("shutdown during execution, abandoning in-flight job for reaper");
            return;
        };

        match result {
            Ok(()) => {
                self.gate.record_success();
                let completed_key = self.scope.completed_key();
                if let Err(err) = self.store.list_push_back(&completed_key, raw.clone()).await {
                    tracing::warn!(%err, "failed to append to completed ledger");
                }
                let _ = self.store.list_remove(&inflight_key, &raw).await;
                let _ = self.store.key_delete(&heartbeat_key).await;
                metrics::counter!("wq_jobs_completed_total").increment(1);
            }
            Err(reason) => {
                self.handle_failure(job, raw, priority, reason, &inflight_key, &heartbeat_key, shutdown).await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_failure(
        &self,
        mut job: Job,
        raw: Vec<u8>,
        priority: PriorityClass,
        reason: String,
        inflight_key: &str,
        heartbeat_key: &str,
        shutdown: CancellationToken,
    ) {
        self.gate.record_failure();
        job.retries += 1;
        let backoff = Job::backoff_ms(job.retries, self.config.backoff_base_ms, self.config.backoff_max_ms);
        tracing::warn!(job_id = %job.job_id, retries = job.retries, %reason, "job handler failed");

        if job.has_retries_remaining() {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(backoff)) => {}
                _ = shutdown.cancelled() => {
                    tracing::info!("shutdown during retry backoff, abandoning in-flight job for reaper");
                    return;
                }
            }
            let updated_raw = match wq_wire::encode(&job) {
                Ok(bytes) => bytes,
                Err(err) => {
                    tracing::error!(%err, "failed to re-encode job for retry, leaving in-flight for reaper");
                    return;
                }
            };
            let src_key = self.scope.queue_key(&priority);
            if let Err(err) = self.store.list_push_back(&src_key, updated_raw).await {
                tracing::error!(%err, "failed to requeue retried job, leaving in-flight for reaper");
                return;
            }
            let _ = self.store.list_remove(inflight_key, &raw).await;
            let _ = self.store.key_delete(heartbeat_key).await;
            metrics::counter!("wq_jobs_retried_total").increment(1);
            return;
        }

        let entry = build_dlq_entry(&job, &reason, self.id.as_str(), &self.clock);
        let dlq = DlqStore::new(Arc::clone(&self.store));
        match dlq.push(entry).await {
            Ok(()) => {
                let _ = self.store.list_remove(inflight_key, &raw).await;
                let _ = self.store.key_delete(heartbeat_key).await;
                metrics::counter!("wq_jobs_dead_lettered_total").increment(1);
            }
            Err(err) => {
                tracing::error!(%err, "failed to push DLQ entry, leaving in-flight for reaper");
            }
        }
    }
}

/// Errors surfaced by methods that return `Result` rather than logging
/// and degrading in place (reserved for callers outside the loop itself,
/// e.g. constructing a [`WorkerLoop`] fleet).
pub type WorkerResult<T> = Result<T, EngineError>;
