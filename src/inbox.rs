// src/inbox.rs
//! Raw-record intake for the binary: a directory of JSON Lines files, one
//! `RawRecord` per line (tagged by `kind`).
//!
//! Files are renamed to `*.done` once read so the next tick does not replay
//! them. Replays are harmless anyway; the event store is idempotent.

use anyhow::Context;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::records::RawRecord;

pub const ENV_INBOX_DIR: &str = "SENTINEL_INBOX_DIR";
pub const DEFAULT_INBOX_DIR: &str = "inbox";

#[derive(Debug, Default)]
pub struct Batch {
    pub records: Vec<RawRecord>,
    pub malformed: usize,
    pub files: Vec<PathBuf>,
}

/// Parse one JSONL payload. Blank lines are skipped, bad lines counted.
pub fn parse_jsonl(content: &str) -> (Vec<RawRecord>, usize) {
    let mut out = Vec::new();
    let mut bad = 0usize;
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RawRecord>(line) {
            Ok(r) => out.push(r),
            Err(e) => {
                // serde errors can quote input; log position only.
                tracing::warn!(target: "pipeline", line = n + 1, column = e.column(), "malformed record skipped");
                bad += 1;
            }
        }
    }
    (out, bad)
}

/// Read every `*.jsonl` file in `dir` (sorted by name) and mark it done.
pub async fn drain_dir(dir: &Path) -> anyhow::Result<Batch> {
    let mut batch = Batch::default();
    let mut entries = match fs::read_dir(dir).await {
        Ok(e) => e,
        Err(_) => {
            tracing::debug!(target: "pipeline", dir = %dir.display(), "inbox missing; nothing to read");
            return Ok(batch);
        }
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.context("read inbox entry")? {
        let p = entry.path();
        if p.extension().and_then(|e| e.to_str()) == Some("jsonl") {
            paths.push(p);
        }
    }
    paths.sort();

    for p in paths {
        let content = fs::read_to_string(&p)
            .await
            .with_context(|| format!("read {}", p.display()))?;
        let (records, bad) = parse_jsonl(&content);
        batch.records.extend(records);
        batch.malformed += bad;

        let done = p.with_extension("jsonl.done");
        fs::rename(&p, &done)
            .await
            .with_context(|| format!("mark {} done", p.display()))?;
        batch.files.push(done);
    }
    Ok(batch)
}
