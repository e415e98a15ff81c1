// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration-time error taxonomy shared across crates (spec §7
//! "Configuration error"): invalid tenant ID, invalid rate, invalid bulk
//! size. These fail synchronously and never partially apply.

use crate::tenant::TenantIdError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid tenant id: {0}")]
    Tenant(#[from] TenantIdError),
    #[error("invalid rate for scope {scope:?}: {reason}")]
    Rate { scope: String, reason: String },
    #[error("invalid bulk operation size: {0} (must be 1..={1})")]
    BulkSize(usize, usize),
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: f64 },
}
