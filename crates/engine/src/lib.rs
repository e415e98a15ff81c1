// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution core: worker runtime, crash recovery, and dead-letter
//! handling (spec §4.3, §4.5, §4.6, §4.7).
//!
//! This crate owns the pieces that run *after* a job has been accepted
//! and rate-limited: claiming and executing it ([`worker`]), restoring
//! the work of a worker that vanished mid-job ([`reaper`]), and
//! everything that happens once a job lands in the dead-letter queue
//! ([`dlq`], [`remediation`]).

pub mod dlq;
pub mod error;
pub mod reaper;
pub mod remediation;
pub mod worker;

pub use error::EngineError;
pub use reaper::{Reaper, ReaperConfig, SweepReport};
pub use remediation::{BulkFailure, BulkResult, RemediationEngine};
pub use worker::{JobHandler, WorkerConfig, WorkerLoop};
