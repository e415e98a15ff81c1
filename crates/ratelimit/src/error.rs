// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rate limiter / fairness error taxonomy (spec §7 "Quota/rate denial is
//! not an error; a decision with `retry_after`" — this enum exists only
//! for the store-level and configuration failures underneath a decision,
//! never for a denial itself).

use thiserror::Error;
use wq_storage::StoreError;

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("invalid rate limit config for scope {scope:?}: {reason}")]
    Config { scope: String, reason: String },
}
