// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job identifier and the job record itself (spec §3 "Job").

use crate::priority::PriorityClass;
use crate::tenant::TenantId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

crate::define_id! {
    /// Unique identifier for a job instance.
    pub struct JobId("job_");
}

crate::define_id! {
    /// Unique identifier for a worker-loop instance.
    ///
    /// Produced by [`WorkerId::generate`] in the `{host}-{pid}-{nanos}-{rand}-{i}`
    /// shape spec §4.3 mandates; `define_id!` is only used here for the
    /// `Display`/`Serialize`/newtype plumbing, not for the prefix+nanoid shape.
    pub struct WorkerId("");
}

impl WorkerId {
    /// Build a worker ID in the `{host}-{pid}-{nanos}-{rand}-{i}` shape.
    pub fn generate(host: &str, pid: u32, nanos: u128, rand: u32, loop_index: usize) -> Self {
        Self(format!("{host}-{pid}-{nanos}-{rand}-{loop_index}"))
    }
}

crate::define_id! {
    /// Unique identifier for a dead-letter queue entry.
    pub struct DlqEntryId("dlq_");
}

/// An immutable-by-convention job record (spec §3).
///
/// `extra` preserves any fields this build of the daemon doesn't know about
/// so that a deserialize -> mutate -> serialize round trip during retry
/// never silently drops data written by a newer producer (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub tenant_id: TenantId,
    pub queue: String,
    pub priority_class: PriorityClass,
    #[serde(with = "payload_b64")]
    pub payload: Vec<u8>,
    pub created_at_ms: u64,
    #[serde(default)]
    pub retries: u32,
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size_hint: Option<u64>,
    /// Job "type" used for DLQ filtering/grouping (spec §4.6/§6). Defaults
    /// to the queue name when a producer doesn't set one explicitly.
    #[serde(default)]
    pub job_type: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

mod payload_b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }

}

impl Job {
    /// Backoff-computed retry delay: `min(max, base * 2^(retries-1))` (spec §4.3).
    pub fn backoff_ms(retries: u32, base_ms: u64, max_ms: u64) -> u64 {
        if retries == 0 {
            return 0;
        }
        let shift = retries.saturating_sub(1).min(32);
        base_ms.saturating_mul(1u64 << shift).min(max_ms)
    }

    pub fn has_retries_remaining(&self) -> bool {
        self.retries <= self.max_retries
    }

    pub fn job_type_or_queue(&self) -> &str {
        self.job_type.as_deref().unwrap_or(&self.queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(retries: u32, max_retries: u32) -> Job {
        Job {
            job_id: JobId::new(),
            tenant_id: TenantId::parse("acme-corp").unwrap(),
            queue: "emails".into(),
            priority_class: PriorityClass::Normal,
            payload: b"hello".to_vec(),
            created_at_ms: 0,
            retries,
            max_retries,
            trace_id: None,
            span_id: None,
            file_size_hint: None,
            job_type: None,
            extra: HashMap::new(),
        }
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(Job::backoff_ms(0, 100, 10_000), 0);
        assert_eq!(Job::backoff_ms(1, 100, 10_000), 100);
        assert_eq!(Job::backoff_ms(2, 100, 10_000), 200);
        assert_eq!(Job::backoff_ms(3, 100, 10_000), 400);
        assert_eq!(Job::backoff_ms(10, 100, 10_000), 10_000);
    }

    #[test]
    fn retries_remaining_boundary() {
        let j = job(1, 1);
        assert!(j.has_retries_remaining());
        let j = job(2, 1);
        assert!(!j.has_retries_remaining());
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let mut j = job(0, 3);
        j.extra.insert("custom_field".into(), serde_json::json!("value"));
        let encoded = serde_json::to_string(&j).unwrap();
        let decoded: Job = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.extra.get("custom_field").unwrap(), "value");
        assert_eq!(decoded.payload, j.payload);
    }
}
