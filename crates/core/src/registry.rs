// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker registry entries (spec §3 "Worker registry", §4.5 "Reaper").
//!
//! The registry is a single global set (spec §6: `workers`), but the
//! reaper needs enough information from each member to reconstruct the
//! worker's in-flight/heartbeat keys without a full-keyspace scan (spec §9
//! "forbids these in favor of the worker registry set"). Each member is
//! therefore a small serialized record rather than a bare worker ID.

use crate::keys::Scope;
use crate::tenant::TenantId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRegistration {
    pub worker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
}

impl WorkerRegistration {
    pub fn new(worker_id: impl Into<String>, scope: &Scope) -> Self {
        let tenant = match scope {
            Scope::Tenant(t) => Some(t.as_str().to_string()),
            Scope::Global => None,
        };
        Self { worker_id: worker_id.into(), tenant }
    }

    pub fn scope(&self) -> Scope {
        match &self.tenant {
            Some(t) => TenantId::parse(t.clone())
                .map(Scope::Tenant)
                .unwrap_or(Scope::Global),
            None => Scope::Global,
        }
    }

    /// Serialize to the exact string stored as a set member, so
    /// registration and deregistration agree byte-for-byte.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn decode(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}
