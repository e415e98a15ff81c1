// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The worker runtime is handler-agnostic by design (spec §4.3 "invoke
//! handler under a cancellable context"): business logic belongs to the
//! application embedding this crate, not to the queue platform itself.
//!
//! [`LoggingHandler`] is the handler `wqd` runs with out of the box. It
//! never fails a job, so it is only useful for exercising the platform
//! end to end (claim, heartbeat, completion ledger); a real deployment
//! supplies its own [`wq_engine::JobHandler`] and builds a [`crate::Daemon`]
//! around it instead of linking the `wqd` binary.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use wq_core::Job;
use wq_engine::JobHandler;

pub struct LoggingHandler;

#[async_trait]
impl JobHandler for LoggingHandler {
    async fn handle(&self, job: &Job, _cancel: CancellationToken) -> Result<(), String> {
        tracing::info!(job_id = %job.job_id, queue = %job.queue, payload_len = job.payload.len(), "handled job");
        Ok(())
    }
}
