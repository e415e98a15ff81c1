// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable audit events (spec §7 "Audit").
//!
//! Every requeue, purge, bulk operation, and quota-bypass decision SHOULD
//! emit one of these. The remediation engine and rate limiter construct
//! them; `StoreClient` implementations are responsible for appending them
//! to the audit stream.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp_ms: u64,
    pub actor: String,
    pub tenant: String,
    pub operation: String,
    pub target: String,
    pub outcome: AuditOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AuditEvent {
    pub fn new(
        timestamp_ms: u64,
        actor: impl Into<String>,
        tenant: impl Into<String>,
        operation: impl Into<String>,
        target: impl Into<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            timestamp_ms,
            actor: actor.into(),
            tenant: tenant.into(),
            operation: operation.into(),
            target: target.into(),
            outcome,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
