// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Transient-vs-terminal store error taxonomy (spec §7 "Transient store error").
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transient store error: {0}")]
    Transient(String),
    #[error("store operation timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether a caller should feed this outcome to the circuit breaker
    /// as a failure (spec §7: "surface to breaker after threshold").
    pub fn is_breaker_significant(&self) -> bool {
        matches!(self, StoreError::Transient(_) | StoreError::Timeout(_) | StoreError::Backend(_))
    }
}
