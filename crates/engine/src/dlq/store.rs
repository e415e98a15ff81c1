// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DLQ persistence (spec §4.6 "DLQ entries are persisted as a mapping id
//! -> serialized entry").
//!
//! A thin wrapper over [`StoreClient`]'s hash operations plus the
//! `dlq:entries` key, so every caller (worker runtime on dead-letter,
//! remediation engine on requeue/purge, analyzer on listing) agrees on
//! the same encoding.

use crate::error::EngineError;
use std::sync::Arc;
use wq_core::{Clock, DlqEntryId, Job};
use wq_storage::{AttemptRecord, DlqEntry, DlqMetadata, ErrorDetail, StoreClient};

/// Build the DLQ entry for a job whose retries are exhausted (spec §4.3
/// step 5 "if exceeded, push original payload to DLQ").
pub fn build_dlq_entry<C: Clock>(job: &Job, reason: &str, worker_id: &str, clock: &C) -> DlqEntry {
    let now = clock.epoch_ms();
    DlqEntry {
        id: DlqEntryId::new(),
        job_id: job.job_id.clone(),
        job_type: job.job_type_or_queue().to_string(),
        queue: job.queue.clone(),
        payload: job.payload.clone(),
        error: ErrorDetail {
            error_type: "HandlerError".to_string(),
            message: reason.to_string(),
            stack: None,
            code: None,
            retryable: false,
            context: Default::default(),
            fingerprint: None,
        },
        metadata: DlqMetadata {
            worker_id: worker_id.to_string(),
            processing_time_ms: 0,
            started_at_ms: now,
            ended_at_ms: now,
            trace: Default::default(),
            environment: None,
            custom: Default::default(),
        },
        attempts: vec![AttemptRecord {
            number: job.retries,
            started_at_ms: now,
            ended_at_ms: now,
            duration_ms: 0,
            worker_id: worker_id.to_string(),
            error: Some(reason.to_string()),
            success: false,
            retry_delay_ms: 0,
        }],
        created_at_ms: job.created_at_ms,
        failed_at_ms: now,
        retry_count: job.retries,
        max_retries: job.max_retries,
        priority: job.priority_class.clone(),
        tenant_id: job.tenant_id.as_str().to_string(),
        tags: Vec::new(),
        size: job.payload.len(),
    }
}

/// CRUD over the `dlq:entries` hash.
pub struct DlqStore<S> {
    store: Arc<S>,
}

impl<S: StoreClient> DlqStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn push(&self, entry: DlqEntry) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec(&entry).map_err(|e| EngineError::Serialization(e.to_string()))?;
        self.store.hash_set(wq_core::keys::dlq_entries_key(), entry.id.as_str(), bytes).await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<DlqEntry>, EngineError> {
        let Some(bytes) = self.store.hash_get(wq_core::keys::dlq_entries_key(), id).await? else {
            return Ok(None);
        };
        let entry = serde_json::from_slice(&bytes).map_err(|e| EngineError::Serialization(e.to_string()))?;
        Ok(Some(entry))
    }

    /// Every persisted entry. Callers (analyzer, remediation `purge_all`,
    /// CLI listing) filter/sort/paginate in memory via
    /// `wq_storage::paginate` rather than pushing that logic into the
    /// store layer.
    pub async fn list_all(&self) -> Result<Vec<DlqEntry>, EngineError> {
        let raw = self.store.hash_get_all(wq_core::keys::dlq_entries_key()).await?;
        let mut entries = Vec::with_capacity(raw.len());
        for (id, bytes) in raw {
            match serde_json::from_slice::<DlqEntry>(&bytes) {
                Ok(entry) => entries.push(entry),
                Err(err) => tracing::warn!(%id, %err, "skipping corrupt DLQ entry"),
            }
        }
        Ok(entries)
    }

    /// Remove an entry outright, without requeueing (spec §4.7 `purge`).
    pub async fn delete(&self, id: &str) -> Result<bool, EngineError> {
        Ok(self.store.hash_delete(wq_core::keys::dlq_entries_key(), id).await?)
    }
}
