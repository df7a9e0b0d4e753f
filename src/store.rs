// src/store.rs
//! In-process stores for scored records and hotspots.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::aggregate::TimeWindow;
use crate::cluster::Hotspot;
use crate::records::ScoredRecord;

/// Scored-record store keyed by record id. Writing the same id twice keeps
/// the first copy, so replaying a batch is harmless.
#[derive(Debug, Default)]
pub struct EventStore {
    inner: Mutex<BTreeMap<String, ScoredRecord>>,
}

impl EventStore {
    /// Returns `false` when the record id was already present.
    pub fn upsert(&self, rec: ScoredRecord) -> bool {
        let mut g = self.inner.lock().expect("event store mutex poisoned");
        if g.contains_key(rec.record_id()) {
            return false;
        }
        g.insert(rec.record_id().to_string(), rec);
        true
    }

    /// Records whose day falls inside `window`, ordered by record id.
    pub fn in_window(&self, window: &TimeWindow) -> Vec<ScoredRecord> {
        self.inner
            .lock()
            .expect("event store mutex poisoned")
            .values()
            .filter(|r| window.contains(r.record.day))
            .cloned()
            .collect()
    }

    /// Drop records older than `day`. Returns how many were removed.
    pub fn prune_before(&self, day: NaiveDate) -> usize {
        let mut g = self.inner.lock().expect("event store mutex poisoned");
        let before = g.len();
        g.retain(|_, r| r.record.day >= day);
        before - g.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("event store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
struct HotspotBook {
    hotspots: BTreeMap<String, Hotspot>,
    deactivated_at: BTreeMap<String, DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct HotspotStore {
    inner: Mutex<HotspotBook>,
}

impl HotspotStore {
    /// Upsert this run's hotspots and deactivate active ones that were not
    /// detected again. Returns the deactivated ids.
    pub fn refresh(&self, current: &[Hotspot], now: DateTime<Utc>) -> Vec<String> {
        let mut g = self.inner.lock().expect("hotspot store mutex poisoned");
        let book = &mut *g;

        for h in current {
            let mut next = h.clone();
            if let Some(prev) = book.hotspots.get(&h.id) {
                if prev.is_active {
                    next.created_at = prev.created_at;
                }
            }
            next.is_active = true;
            book.deactivated_at.remove(&next.id);
            book.hotspots.insert(next.id.clone(), next);
        }

        let mut deactivated = Vec::new();
        for (id, h) in book.hotspots.iter_mut() {
            if h.is_active && !current.iter().any(|c| &c.id == id) {
                h.is_active = false;
                book.deactivated_at.insert(id.clone(), now);
                deactivated.push(id.clone());
            }
        }
        if !deactivated.is_empty() {
            tracing::info!(target: "pipeline", count = deactivated.len(), at = %now, "hotspots deactivated");
        }
        deactivated
    }

    /// Forget hotspots deactivated before `cutoff`. Returns how many went.
    pub fn prune_inactive(&self, cutoff: DateTime<Utc>) -> usize {
        let mut g = self.inner.lock().expect("hotspot store mutex poisoned");
        let book = &mut *g;
        let stale: Vec<String> = book
            .deactivated_at
            .iter()
            .filter(|(_, at)| **at < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            book.deactivated_at.remove(id);
            book.hotspots.remove(id);
        }
        stale.len()
    }

    pub fn get(&self, id: &str) -> Option<Hotspot> {
        self.inner
            .lock()
            .expect("hotspot store mutex poisoned")
            .hotspots
            .get(id)
            .cloned()
    }

    pub fn active(&self) -> Vec<Hotspot> {
        self.inner
            .lock()
            .expect("hotspot store mutex poisoned")
            .hotspots
            .values()
            .filter(|h| h.is_active)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("hotspot store mutex poisoned").hotspots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
