// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wq-daemon: wires the store, breaker, rate limiter, worker fleet, and
//! reaper built by the other crates into one runnable process (spec §2,
//! §6 "Configuration loading").
//!
//! This crate owns no domain logic of its own — every piece it assembles
//! (`StoreClient`, `BreakerRegistry`, `RateLimitedStore`, `WorkerLoop`,
//! `Reaper`) is implemented elsewhere. What lives here is the startup
//! sequence: turn a `Config` into a running fleet, and turn that fleet
//! back into a `StatusReport` on request.

pub mod config;
pub mod error;
pub mod handler;
pub mod status;
pub mod store;

pub use config::Config;
pub use error::DaemonError;
pub use handler::LoggingHandler;
pub use status::StatusReport;
pub use store::AnyStore;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use wq_breaker::{BreakerConfig, BreakerRegistry, Gate};
use wq_core::{PriorityClass, Scope, SystemClock, WorkerId, WorkerRegistration};
use wq_engine::{JobHandler, Reaper, ReaperConfig, WorkerConfig, WorkerLoop};
use wq_ratelimit::{BucketConfig, ClaimRateLimit, RateLimitedStore};
use wq_storage::StoreClient;

/// Resolve the worker-id host component (spec §4.3 `{host}-{pid}-{nanos}-{rand}-{i}`).
/// `HOSTNAME` is read first since it's set in most container runtimes
/// without a syscall; falling back to `/proc/sys/kernel/hostname` covers
/// bare Linux hosts, and a final literal avoids ever failing startup over
/// a missing hostname.
fn hostname() -> String {
    if let Ok(h) = std::env::var("HOSTNAME") {
        if !h.is_empty() {
            return h;
        }
    }
    if let Ok(h) = std::fs::read_to_string("/proc/sys/kernel/hostname") {
        let h = h.trim();
        if !h.is_empty() {
            return h.to_string();
        }
    }
    "localhost".to_string()
}

/// A fully assembled, runnable daemon instance (spec §2 component wiring).
pub struct Daemon {
    config: Config,
    store: Arc<AnyStore>,
    rate_limited_store: Arc<RateLimitedStore<AnyStore, SystemClock>>,
    breaker_registry: BreakerRegistry,
    scope: Scope,
    handler: Arc<dyn JobHandler>,
    started_at: Instant,
    dead_workers_reaped: Arc<AtomicUsize>,
}

impl Daemon {
    pub async fn new(config: Config, handler: Arc<dyn JobHandler>) -> Result<Self, DaemonError> {
        let store = Arc::new(AnyStore::connect(&config.store).await?);
        let scope = config.scope();

        let tenant_scope_name = if scope.tenant_str().is_empty() { "global" } else { scope.tenant_str() };
        let claim_limit = ClaimRateLimit {
            tenant_scope: format!("tenant:{tenant_scope_name}"),
            global_scope: "global".to_string(),
            tenant_config: BucketConfig {
                capacity: config.rate_limit.default_tenant_burst,
                refill_per_sec: config.rate_limit.default_tenant_rate,
                ttl_sec: config.rate_limit.key_ttl_sec,
            },
            global_config: BucketConfig {
                capacity: config.rate_limit.global_burst,
                refill_per_sec: config.rate_limit.global_rate,
                ttl_sec: config.rate_limit.key_ttl_sec,
            },
        };
        let rate_limited_store =
            Arc::new(RateLimitedStore::new(Arc::clone(&store), SystemClock, claim_limit));

        let breaker_config = BreakerConfig {
            window_size: config.breaker.window_size,
            min_requests: config.breaker.min_samples,
            failure_rate_threshold: config.breaker.failure_rate_threshold,
            open_duration: Duration::from_secs(config.breaker.cooldown_sec),
        };
        let breaker_registry = BreakerRegistry::new(breaker_config);

        Ok(Self {
            config,
            store,
            rate_limited_store,
            breaker_registry,
            scope,
            handler,
            started_at: Instant::now(),
            dead_workers_reaped: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Launch the worker fleet and reaper, and run until `shutdown` is
    /// cancelled. Each worker registers itself in the worker registry set
    /// before it starts claiming and deregisters on the way out (spec §4.5
    /// "the reaper ... scans the worker registry set").
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), DaemonError> {
        let gate: Arc<dyn Gate> = self.breaker_registry.get_or_create(self.scope.tenant_str());

        let worker_config = WorkerConfig {
            priorities: PriorityClass::WELL_KNOWN.to_vec(),
            claim_timeout: self.config.claim_timeout(),
            heartbeat_ttl: self.config.heartbeat_ttl(),
            backoff_base_ms: self.config.worker.backoff_base_ms,
            backoff_max_ms: self.config.worker.backoff_max_ms,
            breaker_pause: self.config.breaker_pause(),
        };

        let host = hostname();
        let pid = std::process::id();
        let mut registrations = Vec::with_capacity(self.config.worker.count);
        let mut handles = Vec::with_capacity(self.config.worker.count);

        for i in 0..self.config.worker.count {
            let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
            let rand_component: u32 = rand::random();
            let worker_id = WorkerId::generate(&host, pid, nanos, rand_component, i);
            let registration = WorkerRegistration::new(worker_id.as_str(), &self.scope);
            self.store.set_add(wq_core::keys::workers_set_key(), &registration.encode()).await?;

            let worker_loop = WorkerLoop::new(
                worker_id.clone(),
                self.scope.clone(),
                Arc::clone(&self.rate_limited_store),
                Arc::clone(&gate),
                Arc::clone(&self.handler),
                worker_config.clone(),
                SystemClock,
            );
            let worker_shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move { worker_loop.run(worker_shutdown).await }));
            registrations.push((worker_id, registration));
        }

        let reaper = Reaper::new(
            Arc::clone(&self.store),
            ReaperConfig {
                sweep_interval: Duration::from_secs(self.config.reaper_sweep_interval_sec.max(1)),
                default_priority: PriorityClass::Normal,
            },
        );
        let sweep_interval = Duration::from_secs(self.config.reaper_sweep_interval_sec.max(1));
        let reaper_shutdown = shutdown.clone();
        let dead_workers_reaped = Arc::clone(&self.dead_workers_reaped);
        let reaper_handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(sweep_interval) => {}
                    _ = reaper_shutdown.cancelled() => break,
                }
                match reaper.sweep().await {
                    Ok(report) if report.dead_workers > 0 => {
                        dead_workers_reaped.fetch_add(report.dead_workers, Ordering::Relaxed);
                        tracing::info!(?report, "reaper sweep restored dead workers");
                    }
                    Ok(_) => {}
                    Err(err) => tracing::warn!(%err, "reaper sweep failed"),
                }
            }
        });

        for handle in handles {
            let _ = handle.await;
        }
        let _ = reaper_handle.await;

        // Shutdown: deregister every worker this instance owns. In-flight
        // jobs, if any, were already abandoned in place by each worker loop
        // for the next reaper sweep (spec §5 "Cancellation semantics").
        for (worker_id, registration) in registrations {
            let _ = self.store.set_remove(wq_core::keys::workers_set_key(), &registration.encode()).await;
            let _ = self.store.key_delete(&self.scope.heartbeat_key(worker_id.as_str())).await;
        }

        Ok(())
    }

    pub async fn status(&self) -> Result<StatusReport, DaemonError> {
        let gate = self.breaker_registry.get_or_create(self.scope.tenant_str());
        let uptime_secs = self.started_at.elapsed().as_secs();
        let report = status::assemble(
            &self.store,
            &self.scope,
            uptime_secs,
            self.config.worker.count,
            gate.state(),
            gate.trip_count(),
            self.dead_workers_reaped.load(Ordering::Relaxed),
        )
        .await?;
        Ok(report)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
