// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `StatusReport` assembly for the admin CLI's `status` command
//! (SPEC_FULL.md ambient-stack supplement 2 — the equivalent of the
//! teacher's `MetricsHealthSummary` / `oj status`).

use serde::Serialize;
use std::sync::Arc;
use wq_breaker::CircuitState;
use wq_core::{PriorityClass, Scope};
use wq_storage::StoreClient;

#[derive(Debug, Clone, Serialize)]
pub struct QueueDepth {
    pub priority: String,
    pub depth: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub uptime_secs: u64,
    pub worker_count: usize,
    pub breaker_state: String,
    pub breaker_trip_count: u64,
    pub queue_depths: Vec<QueueDepth>,
    pub dlq_depth: usize,
    pub dead_workers_reaped: usize,
}

pub async fn assemble<S: StoreClient>(
    store: &Arc<S>,
    scope: &Scope,
    uptime_secs: u64,
    worker_count: usize,
    breaker_state: CircuitState,
    breaker_trip_count: u64,
    dead_workers_reaped: usize,
) -> Result<StatusReport, wq_storage::StoreError> {
    let mut queue_depths = Vec::with_capacity(PriorityClass::WELL_KNOWN.len());
    for priority in &PriorityClass::WELL_KNOWN {
        let depth = store.list_len(&scope.queue_key(priority)).await?;
        queue_depths.push(QueueDepth { priority: priority.to_string(), depth });
    }
    let dlq_depth = store.hash_get_all(wq_core::keys::dlq_entries_key()).await?.len();

    Ok(StatusReport {
        uptime_secs,
        worker_count,
        breaker_state: breaker_state.to_string(),
        breaker_trip_count,
        queue_depths,
        dlq_depth,
        dead_workers_reaped,
    })
}
