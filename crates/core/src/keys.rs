// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key namespace construction (spec §6 "Key namespace").
//!
//! Centralizing key formatting here means every crate that touches the
//! store agrees on the exact same strings; the store-client layer never
//! builds a key by ad hoc string concatenation.

use crate::priority::PriorityClass;
use crate::tenant::TenantId;

/// `t:{tenant}:queue:{priority}`
pub fn queue_key(tenant: &str, priority: &PriorityClass) -> String {
    format!("t:{tenant}:queue:{priority}")
}

/// `t:{tenant}:inflight:{worker}`
pub fn inflight_key(tenant: &str, worker: &str) -> String {
    format!("t:{tenant}:inflight:{worker}")
}

/// `t:{tenant}:heartbeat:{worker}`
pub fn heartbeat_key(tenant: &str, worker: &str) -> String {
    format!("t:{tenant}:heartbeat:{worker}")
}

/// `queue:{priority}` — single key per priority, non-tenant mode (spec §3
/// "Queue": "...or a single key per priority in non-tenant mode").
pub fn queue_key_global(priority: &PriorityClass) -> String {
    format!("queue:{priority}")
}

/// `inflight:{worker}` — non-tenant mode.
pub fn inflight_key_global(worker: &str) -> String {
    format!("inflight:{worker}")
}

/// `heartbeat:{worker}` — non-tenant mode.
pub fn heartbeat_key_global(worker: &str) -> String {
    format!("heartbeat:{worker}")
}

/// Resolves the tenant-aware or non-tenant key namespace a worker runtime,
/// reaper, or rate limiter operates within, so every caller derives the
/// same strings from the same scope rather than branching on
/// `Option<TenantId>` at every call site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Tenant(TenantId),
    Global,
}

impl Scope {
    pub fn tenant_str(&self) -> &str {
        match self {
            Self::Tenant(t) => t.as_str(),
            Self::Global => "",
        }
    }

    pub fn queue_key(&self, priority: &PriorityClass) -> String {
        match self {
            Self::Tenant(t) => queue_key(t.as_str(), priority),
            Self::Global => queue_key_global(priority),
        }
    }

    pub fn inflight_key(&self, worker: &str) -> String {
        match self {
            Self::Tenant(t) => inflight_key(t.as_str(), worker),
            Self::Global => inflight_key_global(worker),
        }
    }

    pub fn heartbeat_key(&self, worker: &str) -> String {
        match self {
            Self::Tenant(t) => heartbeat_key(t.as_str(), worker),
            Self::Global => heartbeat_key_global(worker),
        }
    }

    pub fn completed_key(&self) -> String {
        match self {
            Self::Tenant(t) => completed_key(t.as_str()),
            Self::Global => "completed".to_string(),
        }
    }

    pub fn scheduled_key(&self, queue: &str) -> String {
        match self {
            Self::Tenant(t) => scheduled_key(&format!("{}:{queue}", t.as_str())),
            Self::Global => scheduled_key(queue),
        }
    }
}

/// `dlq:entries`
pub fn dlq_entries_key() -> &'static str {
    "dlq:entries"
}

/// `rl:{scope}`
pub fn rate_limit_key(scope: &str) -> String {
    format!("rl:{scope}")
}

/// `fairness:state:{priority}`
pub fn fairness_state_key(priority: &PriorityClass) -> String {
    format!("fairness:state:{priority}")
}

/// `sched:{queue}`
pub fn scheduled_key(queue: &str) -> String {
    format!("sched:{queue}")
}

/// `workers` (the worker registry set).
pub fn workers_set_key() -> &'static str {
    "workers"
}

/// `completed:{tenant}` — append-only completed ledger.
pub fn completed_key(tenant: &str) -> String {
    format!("t:{tenant}:completed")
}

/// `audit:events` — durable audit trail (spec §7 "Audit").
pub fn audit_events_key() -> &'static str {
    "audit:events"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_match_documented_shape() {
        assert_eq!(queue_key("acme", &PriorityClass::High), "t:acme:queue:high");
        assert_eq!(inflight_key("acme", "w1"), "t:acme:inflight:w1");
        assert_eq!(heartbeat_key("acme", "w1"), "t:acme:heartbeat:w1");
        assert_eq!(dlq_entries_key(), "dlq:entries");
        assert_eq!(rate_limit_key("tenant:acme"), "rl:tenant:acme");
        assert_eq!(fairness_state_key(&PriorityClass::Low), "fairness:state:low");
        assert_eq!(scheduled_key("emails"), "sched:emails");
        assert_eq!(workers_set_key(), "workers");
    }

    #[test]
    fn scope_derives_tenant_and_global_keys() {
        let tenant = Scope::Tenant(crate::tenant::TenantId::parse("acme-corp").unwrap());
        assert_eq!(tenant.queue_key(&PriorityClass::High), "t:acme-corp:queue:high");
        assert_eq!(tenant.inflight_key("w1"), "t:acme-corp:inflight:w1");
        assert_eq!(tenant.heartbeat_key("w1"), "t:acme-corp:heartbeat:w1");
        assert_eq!(tenant.completed_key(), "t:acme-corp:completed");

        let global = Scope::Global;
        assert_eq!(global.queue_key(&PriorityClass::High), "queue:high");
        assert_eq!(global.inflight_key("w1"), "inflight:w1");
        assert_eq!(global.heartbeat_key("w1"), "heartbeat:w1");
        assert_eq!(global.completed_key(), "completed");
    }
}
