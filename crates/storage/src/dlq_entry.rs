// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dead-letter entry persisted layout (spec §6 "DLQ entry persisted layout").

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use wq_core::{DlqEntryId, JobId, PriorityClass};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub retryable: bool,
    #[serde(default)]
    pub context: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DlqMetadata {
    pub worker_id: String,
    pub processing_time_ms: u64,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
    #[serde(default)]
    pub trace: TraceContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default)]
    pub custom: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub number: u32,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
    pub duration_ms: u64,
    pub worker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub success: bool,
    #[serde(default)]
    pub retry_delay_ms: u64,
}

/// A single dead-lettered job (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub id: DlqEntryId,
    pub job_id: JobId,
    #[serde(rename = "type")]
    pub job_type: String,
    pub queue: String,
    pub payload: Vec<u8>,
    pub error: ErrorDetail,
    #[serde(default)]
    pub metadata: DlqMetadata,
    #[serde(default)]
    pub attempts: Vec<AttemptRecord>,
    pub created_at_ms: u64,
    pub failed_at_ms: u64,
    pub retry_count: u32,
    pub max_retries: u32,
    pub priority: PriorityClass,
    pub tenant_id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub size: usize,
}

/// Filter criteria for listing DLQ entries (spec §4.6).
#[derive(Debug, Clone, Default)]
pub struct DlqFilter {
    pub queue: Option<String>,
    pub job_type: Option<String>,
    pub error_substring: Option<String>,
    pub failed_after_ms: Option<u64>,
    pub failed_before_ms: Option<u64>,
    pub min_attempts: Option<u32>,
    pub max_attempts: Option<u32>,
    pub tenant_id: Option<String>,
    pub tags: Vec<String>,
    pub min_size: Option<usize>,
    pub max_size: Option<usize>,
}

impl DlqFilter {
    pub fn matches(&self, entry: &DlqEntry) -> bool {
        if let Some(q) = &self.queue {
            if &entry.queue != q {
                return false;
            }
        }
        if let Some(t) = &self.job_type {
            if &entry.job_type != t {
                return false;
            }
        }
        if let Some(needle) = &self.error_substring {
            if !entry.error.message.contains(needle.as_str()) {
                return false;
            }
        }
        if let Some(after) = self.failed_after_ms {
            if entry.failed_at_ms < after {
                return false;
            }
        }
        if let Some(before) = self.failed_before_ms {
            if entry.failed_at_ms > before {
                return false;
            }
        }
        if let Some(min) = self.min_attempts {
            if entry.attempts.len() < min as usize {
                return false;
            }
        }
        if let Some(max) = self.max_attempts {
            if entry.attempts.len() > max as usize {
                return false;
            }
        }
        if let Some(tenant) = &self.tenant_id {
            if &entry.tenant_id != tenant {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().all(|t| entry.tags.contains(t)) {
            return false;
        }
        if let Some(min) = self.min_size {
            if entry.size < min {
                return false;
            }
        }
        if let Some(max) = self.max_size {
            if entry.size > max {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DlqSortKey {
    FailedAt,
    CreatedAt,
    Queue,
    JobType,
    Attempts,
}

/// Paginated listing result (spec §4.6 "Pagination").
#[derive(Debug, Clone)]
pub struct DlqPage {
    pub entries: Vec<DlqEntry>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
}

impl DlqPage {
    pub fn has_next(&self) -> bool {
        (self.page + 1) * self.page_size < self.total
    }

    pub fn has_prev(&self) -> bool {
        self.page > 0
    }
}

/// Apply filter, sort, and pagination to a full entry set. Pure function
/// so both the in-memory and Redis-backed analyzers share one
/// implementation regardless of how the entries were fetched.
pub fn paginate(
    mut entries: Vec<DlqEntry>,
    filter: &DlqFilter,
    sort_key: DlqSortKey,
    page: usize,
    page_size: usize,
) -> DlqPage {
    entries.retain(|e| filter.matches(e));
    match sort_key {
        DlqSortKey::FailedAt => entries.sort_by_key(|e| e.failed_at_ms),
        DlqSortKey::CreatedAt => entries.sort_by_key(|e| e.created_at_ms),
        DlqSortKey::Queue => entries.sort_by(|a, b| a.queue.cmp(&b.queue)),
        DlqSortKey::JobType => entries.sort_by(|a, b| a.job_type.cmp(&b.job_type)),
        DlqSortKey::Attempts => entries.sort_by_key(|e| e.attempts.len()),
    }
    let total = entries.len();
    let page_size = page_size.max(1);
    let start = page.saturating_mul(page_size).min(total);
    let end = (start + page_size).min(total);
    DlqPage { entries: entries[start..end].to_vec(), page, page_size, total }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, queue: &str, failed_at_ms: u64, attempts: usize) -> DlqEntry {
        DlqEntry {
            id: DlqEntryId::from_string(id),
            job_id: JobId::new(),
            job_type: "send_email".into(),
            queue: queue.into(),
            payload: vec![],
            error: ErrorDetail {
                error_type: "Timeout".into(),
                message: "Connection timeout after 30 seconds".into(),
                stack: None,
                code: None,
                retryable: true,
                context: HashMap::new(),
                fingerprint: None,
            },
            metadata: DlqMetadata::default(),
            attempts: (0..attempts)
                .map(|i| AttemptRecord {
                    number: i as u32 + 1,
                    started_at_ms: 0,
                    ended_at_ms: 0,
                    duration_ms: 0,
                    worker_id: "w1".into(),
                    error: None,
                    success: false,
                    retry_delay_ms: 0,
                })
                .collect(),
            created_at_ms: 0,
            failed_at_ms,
            retry_count: attempts as u32,
            max_retries: 3,
            priority: PriorityClass::Normal,
            tenant_id: "acme-corp".into(),
            tags: vec![],
            size: 10,
        }
    }

    #[test]
    fn filters_by_queue_and_attempts() {
        let entries = vec![entry("a", "q1", 100, 1), entry("b", "q2", 200, 5)];
        let filter = DlqFilter { queue: Some("q1".into()), ..Default::default() };
        let page = paginate(entries, &filter, DlqSortKey::FailedAt, 0, 10);
        assert_eq!(page.total, 1);
        assert_eq!(page.entries[0].id, DlqEntryId::from_string("a"));
    }

    #[test]
    fn pagination_derives_has_next_has_prev() {
        let entries: Vec<_> = (0..5).map(|i| entry(&format!("e{i}"), "q1", i as u64, 1)).collect();
        let page = paginate(entries, &DlqFilter::default(), DlqSortKey::FailedAt, 0, 2);
        assert_eq!(page.entries.len(), 2);
        assert!(page.has_next());
        assert!(!page.has_prev());

        let entries: Vec<_> = (0..5).map(|i| entry(&format!("e{i}"), "q1", i as u64, 1)).collect();
        let last_page = paginate(entries, &DlqFilter::default(), DlqSortKey::FailedAt, 2, 2);
        assert!(!last_page.has_next());
        assert!(last_page.has_prev());
    }

    #[test]
    fn zero_matches_returns_zero_count_result() {
        let entries = vec![entry("a", "q1", 100, 1)];
        let filter = DlqFilter { queue: Some("nonexistent".into()), ..Default::default() };
        let page = paginate(entries, &filter, DlqSortKey::FailedAt, 0, 10);
        assert_eq!(page.total, 0);
        assert!(page.entries.is_empty());
    }
}
