// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine-level error taxonomy (spec §7).

use thiserror::Error;
use wq_storage::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("job payload failed to deserialize: {0}")]
    PoisonPill(String),
    #[error("bulk operation size {0} exceeds limit {1}")]
    BulkSizeExceeded(usize, usize),
    #[error("dlq entry {0} not found")]
    DlqEntryNotFound(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}
