// src/alert/state.rs
//! Per-hotspot tier state, the only mutable state shared across runs.
//!
//! Writes are compare-and-set on a version counter: a writer that read
//! version `v` may only store `v + 1`. Absent keys are version 0.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::AlertTier;
use crate::aggregate::TimeWindow;
use crate::error::{PipelineError, PipelineResult};
use crate::severity::{SeverityHistory, SeverityTrail};

pub const STATE_FILE_NAME: &str = "hotspot_state.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierState {
    pub tier: AlertTier,
    pub version: u64,
    pub last_alert_at: Option<DateTime<Utc>>,
    pub last_alert_tier: Option<AlertTier>,
    pub updated_at: DateTime<Utc>,
}

pub trait TierStateStore: Send + Sync {
    fn load(&self, hotspot_id: &str) -> Option<TierState>;

    /// Store `next` if the current version equals `expected`. Returns the new
    /// version, or `StateConflict` when another writer got there first.
    fn compare_and_set(
        &self,
        hotspot_id: &str,
        expected: u64,
        next: TierState,
    ) -> PipelineResult<u64>;

    fn ids(&self) -> Vec<String>;
}

fn apply_cas(
    map: &mut BTreeMap<String, TierState>,
    hotspot_id: &str,
    expected: u64,
    mut next: TierState,
) -> PipelineResult<u64> {
    let found = map.get(hotspot_id).map(|s| s.version).unwrap_or(0);
    if found != expected {
        return Err(PipelineError::StateConflict {
            hotspot_id: hotspot_id.to_string(),
            expected,
            found,
        });
    }
    next.version = expected + 1;
    map.insert(hotspot_id.to_string(), next);
    Ok(expected + 1)
}

#[derive(Debug, Default)]
pub struct InMemoryTierStateStore {
    inner: Mutex<BTreeMap<String, TierState>>,
}

impl TierStateStore for InMemoryTierStateStore {
    fn load(&self, hotspot_id: &str) -> Option<TierState> {
        self.inner
            .lock()
            .expect("tier state mutex poisoned")
            .get(hotspot_id)
            .cloned()
    }

    fn compare_and_set(
        &self,
        hotspot_id: &str,
        expected: u64,
        next: TierState,
    ) -> PipelineResult<u64> {
        let mut g = self.inner.lock().expect("tier state mutex poisoned");
        apply_cas(&mut g, hotspot_id, expected, next)
    }

    fn ids(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("tier state mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    tiers: BTreeMap<String, TierState>,
    #[serde(default)]
    severities: BTreeMap<String, SeverityTrail>,
}

/// Single-host JSON store for tier state and severity history.
///
/// The whole file is rewritten (temp file + rename) on every change.
#[derive(Debug)]
pub struct JsonFileStateStore {
    path: PathBuf,
    inner: Mutex<StateFile>,
}

impl JsonFileStateStore {
    /// Open `<dir>/hotspot_state.json`, creating `dir` if needed. An unreadable
    /// or corrupt file starts empty with a warning.
    pub fn open<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).with_context(|| format!("create state dir {}", dir.display()))?;
        let path = dir.join(STATE_FILE_NAME);
        let state = match fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                tracing::warn!(target: "alert", path = %path.display(), error = %e, "state file unreadable; starting empty");
                StateFile::default()
            }),
            Err(_) => StateFile::default(),
        };
        Ok(Self {
            path,
            inner: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, state: &StateFile) -> PipelineResult<()> {
        let bytes = serde_json::to_vec_pretty(state)
            .map_err(|e| PipelineError::Config(format!("serialize state: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|e| PipelineError::Config(format!("write {}: {e}", self.path.display())))
    }
}

impl TierStateStore for JsonFileStateStore {
    fn load(&self, hotspot_id: &str) -> Option<TierState> {
        self.inner
            .lock()
            .expect("state file mutex poisoned")
            .tiers
            .get(hotspot_id)
            .cloned()
    }

    fn compare_and_set(
        &self,
        hotspot_id: &str,
        expected: u64,
        next: TierState,
    ) -> PipelineResult<u64> {
        let mut g = self.inner.lock().expect("state file mutex poisoned");
        let mut staged = g.clone();
        let v = apply_cas(&mut staged.tiers, hotspot_id, expected, next)?;
        self.persist(&staged)?;
        *g = staged;
        Ok(v)
    }

    fn ids(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("state file mutex poisoned")
            .tiers
            .keys()
            .cloned()
            .collect()
    }
}

impl SeverityHistory for JsonFileStateStore {
    fn previous(&self, hotspot_id: &str, window: &TimeWindow) -> Option<f64> {
        let g = self.inner.lock().expect("state file mutex poisoned");
        g.severities.get(hotspot_id).and_then(|t| t.previous_for(window))
    }

    fn record(&self, hotspot_id: &str, window: &TimeWindow, severity: f64) {
        let mut g = self.inner.lock().expect("state file mutex poisoned");
        g.severities
            .entry(hotspot_id.to_string())
            .or_default()
            .record(window, severity);
        if let Err(e) = self.persist(&g) {
            tracing::warn!(target: "alert", error = %e, "severity history not persisted");
        }
    }
}
