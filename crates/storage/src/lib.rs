// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]

pub mod client;
pub mod dlq_entry;
pub mod error;

pub use client::{StoreClient, TokenBucketResult};
pub use dlq_entry::{
    paginate, AttemptRecord, DlqEntry, DlqFilter, DlqMetadata, DlqPage, DlqSortKey, ErrorDetail,
    TraceContext,
};
pub use error::StoreError;
