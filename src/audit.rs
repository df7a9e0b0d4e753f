// src/audit.rs
//! Audit trail for records dropped at the PII boundary.
//!
//! Entries carry the hashed record id and pattern names only. The offending
//! text is never stored.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use std::sync::Mutex;

use crate::records::SourceKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub record_id: String,
    pub source: SourceKind,
    pub patterns: Vec<String>,
    pub at: DateTime<Utc>,
}

pub trait AuditSink: Send + Sync {
    fn flag(&self, entry: AuditEntry);
}

/// Bounded in-memory audit log (oldest entries evicted first).
#[derive(Debug)]
pub struct InMemoryAuditLog {
    inner: Mutex<Vec<AuditEntry>>,
    cap: usize,
}

impl InMemoryAuditLog {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Vec::with_capacity(cap.min(10_000))),
            cap: cap.clamp(1, 10_000),
        }
    }

    pub fn snapshot(&self) -> Vec<AuditEntry> {
        self.inner.lock().expect("audit mutex poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("audit mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::with_capacity(1_000)
    }
}

impl AuditSink for InMemoryAuditLog {
    fn flag(&self, entry: AuditEntry) {
        tracing::warn!(
            target: "anonymize",
            record = %entry.record_id,
            source = entry.source.as_str(),
            patterns = ?entry.patterns,
            "record dropped: residual PII after scrub"
        );
        counter!("sentinel_anonymization_violations_total").increment(1);

        let mut v = self.inner.lock().expect("audit mutex poisoned");
        v.push(entry);
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
    }
}
