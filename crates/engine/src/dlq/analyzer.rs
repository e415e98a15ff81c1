// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DLQ pattern analyzer (spec §4.6 "Pattern analyzer").
//!
//! Groups DLQ entries by a stable signature derived from the error
//! message after normalization, so an operator sees "one pattern, N
//! occurrences" instead of N individual entries with cosmetically
//! different messages (differing request IDs, timestamps, addresses).

use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use wq_core::DlqEntryId;
use wq_storage::DlqEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A cluster of DLQ entries sharing a normalized error signature.
#[derive(Debug, Clone)]
pub struct ErrorPattern {
    pub signature: String,
    pub normalized_message: String,
    pub count: usize,
    pub first_seen_ms: u64,
    pub last_seen_ms: u64,
    pub affected_queues: Vec<String>,
    pub affected_types: Vec<String>,
    pub sample_entry_ids: Vec<DlqEntryId>,
    pub severity: Severity,
    pub suggested_action: String,
}

// Allow expect here as each regex is a constant pattern verified valid below.
#[allow(clippy::expect_used)]
static QUOTED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""[^"]*"|'[^']*'"#).expect("constant regex pattern is valid"));

#[allow(clippy::expect_used)]
static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
        .expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:?\d{2})?")
        .expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static HEX_ADDR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b0x[0-9a-f]+\b").expect("constant regex pattern is valid"));

#[allow(clippy::expect_used)]
static DIGIT_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("constant regex pattern is valid"));

const PLACEHOLDERS: [&str; 5] = ["STRING", "UUID", "TIMESTAMP", "ADDR", "N"];

/// Normalize an error message so structurally-identical errors collapse
/// to one signature regardless of embedded IDs/timestamps/addresses
/// (spec §4.6). Substitution order matters: quoted strings, UUIDs,
/// timestamps, and hex addresses are matched before the catch-all digit
/// run, since each of those patterns itself contains digits.
///
/// Placeholders are left uppercase and every other token lowercased as
/// the final step (rather than lowercasing the whole string up front),
/// so that `normalize(normalize(x)) == normalize(x)` (spec §8) — a
/// second pass never re-lowers an already-inserted placeholder into
/// something a pattern would match again.
pub fn normalize(message: &str) -> String {
    let s = QUOTED_RE.replace_all(message, " STRING ");
    let s = UUID_RE.replace_all(&s, " UUID ");
    let s = TIMESTAMP_RE.replace_all(&s, " TIMESTAMP ");
    let s = HEX_ADDR_RE.replace_all(&s, " ADDR ");
    let s = DIGIT_RUN_RE.replace_all(&s, " N ");

    s.split_whitespace()
        .map(|word| {
            if PLACEHOLDERS.contains(&word) {
                word.to_string()
            } else {
                word.to_lowercase()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the grouping signature: `queue | type | normalize(message) [| code]`.
pub fn signature(entry: &DlqEntry) -> String {
    let normalized = normalize(&entry.error.message);
    match &entry.error.code {
        Some(code) => format!("{}|{}|{}|{code}", entry.queue, entry.job_type, normalized),
        None => format!("{}|{}|{}", entry.queue, entry.job_type, normalized),
    }
}

fn severity_of(count: usize) -> Severity {
    if count >= 100 {
        Severity::Critical
    } else if count >= 50 {
        Severity::High
    } else if count >= 10 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Keyword-rule remediation suggestion with a frequency-driven fallback
/// (spec §4.6).
fn suggest_remediation(normalized_message: &str, count: usize) -> String {
    let m = normalized_message;
    if m.contains("timeout") {
        "Increase timeout threshold or investigate downstream latency".to_string()
    } else if m.contains("connection") || m.contains("refused") || m.contains("unreachable") {
        "Verify network connectivity and connection pool limits".to_string()
    } else if m.contains("unauthorized") || m.contains("forbidden") || m.contains("permission") {
        "Check credentials or permissions for the affected integration".to_string()
    } else if m.contains("not found") {
        "Confirm the referenced resource exists before retrying".to_string()
    } else if m.contains("validation") || m.contains("invalid") {
        "Review the payload schema for the affected job type".to_string()
    } else if count >= 50 {
        "High-frequency failure; investigate as a priority".to_string()
    } else {
        "Review individual error details; no clear pattern detected".to_string()
    }
}

/// Cluster entries into [`ErrorPattern`]s. Groups of size 1 are dropped
/// (spec §4.6 "Groups of size >= 2 become patterns").
pub fn analyze(entries: &[DlqEntry]) -> Vec<ErrorPattern> {
    let mut groups: HashMap<String, Vec<&DlqEntry>> = HashMap::new();
    for entry in entries {
        groups.entry(signature(entry)).or_default().push(entry);
    }

    let mut patterns: Vec<ErrorPattern> = groups
        .into_iter()
        .filter(|(_, members)| members.len() >= 2)
        .map(|(sig, members)| {
            let count = members.len();
            let normalized_message = normalize(&members[0].error.message);
            let first_seen_ms = members.iter().map(|e| e.failed_at_ms).min().unwrap_or(0);
            let last_seen_ms = members.iter().map(|e| e.failed_at_ms).max().unwrap_or(0);
            let affected_queues: Vec<String> = members
                .iter()
                .map(|e| e.queue.clone())
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .collect();
            let affected_types: Vec<String> = members
                .iter()
                .map(|e| e.job_type.clone())
                .collect::<std::collections::BTreeSet<_>>()
                .into_iter()
                .collect();
            let sample_entry_ids = members.iter().take(5).map(|e| e.id.clone()).collect();
            ErrorPattern {
                severity: severity_of(count),
                suggested_action: suggest_remediation(&normalized_message, count),
                signature: sig,
                normalized_message,
                count,
                first_seen_ms,
                last_seen_ms,
                affected_queues,
                affected_types,
                sample_entry_ids,
            }
        })
        .collect();

    patterns.sort_by(|a, b| b.count.cmp(&a.count));
    patterns
}

/// Bounded cache of recent analyses, keyed by a hash of the analyzed
/// id+message list (spec §4.6 "bounded LRU-like cache ... oldest entry
/// evicted when full").
pub struct PatternAnalyzer {
    capacity: usize,
    cache: Mutex<Vec<(u64, Vec<ErrorPattern>)>>,
}

fn cache_key(entries: &[DlqEntry]) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for e in entries {
        e.id.as_str().hash(&mut hasher);
        e.error.message.hash(&mut hasher);
    }
    hasher.finish()
}

impl PatternAnalyzer {
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), cache: Mutex::new(Vec::new()) }
    }

    /// Analyze `entries`, serving a cached result on an exact repeat
    /// input. A cache hit is promoted to most-recently-used.
    pub fn analyze(&self, entries: &[DlqEntry]) -> Vec<ErrorPattern> {
        let key = cache_key(entries);
        let mut cache = self.cache.lock();
        if let Some(pos) = cache.iter().position(|(k, _)| *k == key) {
            let (_, patterns) = cache.remove(pos);
            cache.push((key, patterns.clone()));
            return patterns;
        }

        let patterns = analyze(entries);
        if cache.len() >= self.capacity {
            cache.remove(0);
        }
        cache.push((key, patterns.clone()));
        patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wq_core::{JobId, PriorityClass};
    use wq_storage::{DlqMetadata, ErrorDetail};

    fn entry(id: &str, message: &str) -> DlqEntry {
        DlqEntry {
            id: DlqEntryId::from_string(id),
            job_id: JobId::new(),
            job_type: "send_email".into(),
            queue: "queue1".into(),
            payload: vec![],
            error: ErrorDetail {
                error_type: "Timeout".into(),
                message: message.into(),
                stack: None,
                code: None,
                retryable: true,
                context: Default::default(),
                fingerprint: None,
            },
            metadata: DlqMetadata::default(),
            attempts: vec![],
            created_at_ms: 0,
            failed_at_ms: 0,
            retry_count: 1,
            max_retries: 3,
            priority: PriorityClass::Normal,
            tenant_id: "acme-corp".into(),
            tags: vec![],
            size: 0,
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        let msg = "Connection to \"10.0.0.1\" timed out after 4500ms, id=550e8400-e29b-41d4-a716-446655440000";
        let once = normalize(msg);
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_collapses_digit_runs_and_addresses() {
        let a = normalize("Connection timeout after 30 seconds");
        let b = normalize("Connection timeout after 45 seconds");
        let c = normalize("Connection timeout after 60 seconds");
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn pattern_detection_scenario() {
        // spec §8 scenario 6.
        let entries = vec![
            entry("a", "Connection timeout after 30 seconds"),
            entry("b", "Connection timeout after 45 seconds"),
            entry("c", "Connection timeout after 60 seconds"),
        ];
        let patterns = analyze(&entries);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].count, 3);
        assert_eq!(patterns[0].severity, Severity::Low);
    }

    #[test]
    fn singleton_groups_are_dropped() {
        let entries = vec![entry("a", "Unique error one"), entry("b", "Totally different error")];
        assert!(analyze(&entries).is_empty());
    }

    #[test]
    fn severity_bands_match_thresholds() {
        assert_eq!(severity_of(5), Severity::Low);
        assert_eq!(severity_of(10), Severity::Medium);
        assert_eq!(severity_of(50), Severity::High);
        assert_eq!(severity_of(100), Severity::Critical);
    }

    #[test]
    fn analyzer_cache_evicts_oldest_when_full() {
        let analyzer = PatternAnalyzer::new(2);
        let batches: Vec<Vec<DlqEntry>> = (0..3)
            .map(|i| vec![entry(&format!("{i}a"), "same timeout error"), entry(&format!("{i}b"), "same timeout error")])
            .collect();
        for batch in &batches {
            analyzer.analyze(batch);
        }
        assert_eq!(analyzer.cache.lock().len(), 2);
    }

    #[test]
    fn keyword_rules_pick_expected_remediation() {
        assert!(suggest_remediation("connection refused by host", 3).contains("network"));
        assert!(suggest_remediation("unauthorized access attempt", 3).contains("credentials"));
        assert!(suggest_remediation("resource not found", 3).contains("resource"));
    }
}
