// src/aggregate.rs
//! Window aggregation: scored records → one feature vector per location.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::indicator::Indicator;
use crate::location::{GeoPoint, LocationDirectory};
use crate::records::ScoredRecord;

/// Inclusive day range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeWindow {
    /// Trailing window of `days_back` days ending on `now`'s day.
    pub fn trailing(now: DateTime<Utc>, days_back: i64) -> Self {
        let end = now.date_naive();
        let start = end - Duration::days(days_back.max(1) - 1);
        Self { start, end }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Window of equal length immediately before this one.
    pub fn preceding(&self) -> Self {
        let len = (self.end - self.start).num_days() + 1;
        Self {
            start: self.start - Duration::days(len),
            end: self.start - Duration::days(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFeatureVector {
    pub location_id: String,
    pub centroid: GeoPoint,
    pub record_count: usize,
    pub mean_crisis: f64,
    pub mean_sentiment: f64,
    pub indicator_freq: BTreeMap<Indicator, usize>,
    pub window: TimeWindow,
}

/// Group in-window records by location. Duplicate record ids count once and
/// records at locations without a known centroid are skipped.
pub fn aggregate(
    records: &[ScoredRecord],
    window: &TimeWindow,
    directory: &LocationDirectory,
) -> Vec<LocationFeatureVector> {
    #[derive(Default)]
    struct Acc {
        count: usize,
        crisis: f64,
        sentiment: f64,
        freq: BTreeMap<Indicator, usize>,
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut groups: BTreeMap<&str, Acc> = BTreeMap::new();
    let mut unplaced = 0usize;

    for r in records {
        if !window.contains(r.record.day) || !seen.insert(r.record_id()) {
            continue;
        }
        let loc = r.record.location_id.as_str();
        if directory.centroid(loc).is_none() {
            unplaced += 1;
            continue;
        }
        let acc = groups.entry(loc).or_default();
        acc.count += 1;
        acc.crisis += r.crisis_score;
        acc.sentiment += r.sentiment;
        for ind in &r.indicators {
            *acc.freq.entry(*ind).or_default() += 1;
        }
    }

    if unplaced > 0 {
        tracing::debug!(target: "aggregate", unplaced, "records skipped: location has no centroid");
    }

    groups
        .into_iter()
        .filter_map(|(loc, acc)| {
            let centroid = directory.centroid(loc)?;
            let n = acc.count as f64;
            Some(LocationFeatureVector {
                location_id: loc.to_string(),
                centroid,
                record_count: acc.count,
                mean_crisis: acc.crisis / n,
                mean_sentiment: acc.sentiment / n,
                indicator_freq: acc.freq,
                window: *window,
            })
        })
        .collect()
}
