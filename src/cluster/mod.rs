// src/cluster/mod.rs
//! # Hotspot Clusterer
//!
//! Groups per-location feature vectors into spatial clusters and turns each
//! accepted cluster into a [`Hotspot`].
//!
//! - Distance is geodesic (haversine, km) between city-level centroids.
//! - A location's weight is its record count; a cluster must carry at least
//!   `min_samples` records. That floor is also the privacy floor.
//! - Density pass first; if it refuses, the greedy pass runs with the same floor.
//! - A cluster sharing locations with an active hotspot keeps that hotspot's
//!   id, so a shifting anchor does not look like a new hotspot. New clusters
//!   get an id from their anchor location.

pub mod dbscan;
pub mod greedy;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::aggregate::{aggregate, LocationFeatureVector, TimeWindow};
use crate::alert::AlertTier;
use crate::anonymize::anon_hash;
use crate::config::pipeline::ClusteringConfig;
use crate::config::ClusterAlgorithm;
use crate::indicator::Indicator;
use crate::location::{GeoPoint, LocationDirectory};
use crate::records::ScoredRecord;
use crate::severity::{SeverityHistory, SeverityScorer, Trend};

/// One location as seen by the clustering passes.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterPoint {
    pub id: String,
    pub point: GeoPoint,
    pub weight: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterParams {
    pub min_samples: usize,
    pub eps_km: f64,
    pub algorithm: ClusterAlgorithm,
    pub max_density_points: usize,
    pub top_k: usize,
    pub people_per_record: u64,
}

impl From<&ClusteringConfig> for ClusterParams {
    fn from(c: &ClusteringConfig) -> Self {
        Self {
            min_samples: c.min_samples.max(1),
            eps_km: c.eps_km,
            algorithm: c.algorithm,
            max_density_points: c.max_density_points,
            top_k: c.top_k_indicators.max(1),
            people_per_record: c.people_per_record,
        }
    }
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self::from(&ClusteringConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    pub id: String,
    pub centroid: GeoPoint,
    /// Contributing locations, sorted.
    pub location_ids: Vec<String>,
    /// Contributing location with the most records.
    pub anchor_location: String,
    pub record_count: usize,
    pub mean_crisis: f64,
    pub mean_sentiment: f64,
    pub indicator_freq: BTreeMap<Indicator, usize>,
    pub primary_indicators: Vec<Indicator>,
    pub severity: f64,
    pub tier: AlertTier,
    pub trend: Trend,
    pub previous_severity: Option<f64>,
    pub affected_population: u64,
    pub window: TimeWindow,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

impl Hotspot {
    pub fn cluster_size(&self) -> usize {
        self.location_ids.len()
    }

    pub fn has_indicator(&self, ind: Indicator) -> bool {
        self.primary_indicators.contains(&ind)
    }
}

/// Stable hotspot id for an anchor location.
pub fn hotspot_id(anchor_location: &str) -> String {
    format!("hs-{}", anon_hash(anchor_location, 6))
}

pub struct HotspotDetector {
    directory: Arc<LocationDirectory>,
    params: ClusterParams,
    scorer: SeverityScorer,
}

impl HotspotDetector {
    pub fn new(directory: Arc<LocationDirectory>, params: ClusterParams, hysteresis: f64) -> Self {
        let scorer = SeverityScorer::new(hysteresis, params.min_samples);
        Self {
            directory,
            params,
            scorer,
        }
    }

    pub fn params(&self) -> &ClusterParams {
        &self.params
    }

    pub fn scorer(&self) -> &SeverityScorer {
        &self.scorer
    }

    /// Aggregate, cluster and score one window.
    ///
    /// `history` is only read here; the caller records the new severities
    /// once the run commits. `known` are the hotspots active before this run.
    pub fn detect(
        &self,
        records: &[ScoredRecord],
        window: &TimeWindow,
        history: Option<&dyn SeverityHistory>,
        known: &[Hotspot],
        now: DateTime<Utc>,
    ) -> Vec<Hotspot> {
        let vectors = aggregate(records, window, &self.directory);
        self.detect_from_vectors(&vectors, history, known, now)
    }

    pub fn detect_from_vectors(
        &self,
        vectors: &[LocationFeatureVector],
        history: Option<&dyn SeverityHistory>,
        known: &[Hotspot],
        now: DateTime<Utc>,
    ) -> Vec<Hotspot> {
        let mut sorted: Vec<&LocationFeatureVector> = vectors.iter().collect();
        sorted.sort_by(|a, b| a.location_id.cmp(&b.location_id));

        let points: Vec<ClusterPoint> = sorted
            .iter()
            .map(|v| ClusterPoint {
                id: v.location_id.clone(),
                point: v.centroid,
                weight: v.record_count,
            })
            .collect();

        let groups: Vec<Vec<&LocationFeatureVector>> = self
            .cluster(&points)
            .iter()
            .map(|g| g.iter().map(|&i| sorted[i]).collect())
            .collect();
        let ids = assign_ids(&groups, known);
        let mut hotspots: Vec<Hotspot> = groups
            .iter()
            .zip(ids)
            .map(|(members, id)| self.build_hotspot(id, members, history, now))
            .collect();
        hotspots.sort_by(|a, b| a.id.cmp(&b.id));

        tracing::info!(
            target: "cluster",
            locations = points.len(),
            hotspots = hotspots.len(),
            "clustering complete"
        );
        hotspots
    }

    fn cluster(&self, points: &[ClusterPoint]) -> Vec<Vec<usize>> {
        let p = &self.params;
        match p.algorithm {
            ClusterAlgorithm::Greedy => greedy::greedy(points, p.eps_km, p.min_samples),
            ClusterAlgorithm::Density => {
                match dbscan::dbscan(points, p.eps_km, p.min_samples, p.max_density_points) {
                    Ok(groups) => groups,
                    Err(e) => {
                        tracing::warn!(target: "cluster", error = %e, "density clustering unavailable; using greedy grouping");
                        greedy::greedy(points, p.eps_km, p.min_samples)
                    }
                }
            }
        }
    }

    fn build_hotspot(
        &self,
        id: String,
        members: &[&LocationFeatureVector],
        history: Option<&dyn SeverityHistory>,
        now: DateTime<Utc>,
    ) -> Hotspot {
        let record_count: usize = members.iter().map(|v| v.record_count).sum();
        let n = record_count.max(1) as f64;

        let mut lat = 0.0;
        let mut lon = 0.0;
        let mut crisis = 0.0;
        let mut sentiment = 0.0;
        let mut freq: BTreeMap<Indicator, usize> = BTreeMap::new();
        let mut affected = 0u64;

        for v in members {
            let w = v.record_count as f64;
            lat += v.centroid.lat * w;
            lon += v.centroid.lon * w;
            crisis += v.mean_crisis * w;
            sentiment += v.mean_sentiment * w;
            for (ind, c) in &v.indicator_freq {
                *freq.entry(*ind).or_default() += c;
            }
            let estimate = v.record_count as u64 * self.params.people_per_record;
            affected += match self.directory.population(&v.location_id) {
                0 => estimate,
                pop => estimate.min(pop),
            };
        }

        let anchor = anchor_of(members);
        let mean_crisis = crisis / n;
        let window = members.first().map(|v| v.window).unwrap_or(TimeWindow {
            start: now.date_naive(),
            end: now.date_naive(),
        });

        let severity = self.scorer.severity(mean_crisis, &freq, record_count);
        let previous_severity = history.and_then(|h| h.previous(&id, &window));
        let trend = self.scorer.trend(severity, previous_severity);

        let primary_indicators = rank_indicators(&freq, self.params.top_k);

        tracing::debug!(
            target: "cluster",
            hotspot = %id,
            records = record_count,
            severity,
            trend = %trend,
            "hotspot scored"
        );

        Hotspot {
            id,
            centroid: GeoPoint::new(lat / n, lon / n),
            location_ids: members.iter().map(|v| v.location_id.clone()).collect(),
            anchor_location: anchor,
            record_count,
            mean_crisis,
            mean_sentiment: sentiment / n,
            indicator_freq: freq,
            primary_indicators,
            severity,
            tier: AlertTier::from_severity(severity),
            trend,
            previous_severity,
            affected_population: affected,
            window,
            created_at: now,
            is_active: true,
        }
    }
}

/// Member with the most records. Members arrive sorted by id, so ties keep
/// the lowest id.
fn anchor_of(members: &[&LocationFeatureVector]) -> String {
    members
        .iter()
        .rev()
        .max_by_key(|v| v.record_count)
        .map(|v| v.location_id.clone())
        .unwrap_or_default()
}

/// Pair clusters with active hotspots by shared locations, largest overlap
/// first, each id used once. Unpaired clusters get an anchor id, or a
/// member-set id when the anchor id is already in use.
fn assign_ids(groups: &[Vec<&LocationFeatureVector>], known: &[Hotspot]) -> Vec<String> {
    let mut pairs: Vec<(usize, &str, usize)> = Vec::new();
    for (gi, members) in groups.iter().enumerate() {
        for k in known.iter().filter(|k| k.is_active) {
            let overlap = members
                .iter()
                .filter(|v| k.location_ids.contains(&v.location_id))
                .count();
            if overlap > 0 {
                pairs.push((overlap, k.id.as_str(), gi));
            }
        }
    }
    pairs.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)).then_with(|| a.2.cmp(&b.2)));

    let mut ids: Vec<Option<String>> = vec![None; groups.len()];
    let mut claimed: HashSet<&str> = HashSet::new();
    for (_, id, gi) in pairs {
        if ids[gi].is_none() && claimed.insert(id) {
            ids[gi] = Some(id.to_string());
        }
    }

    let mut taken: HashSet<String> = known
        .iter()
        .filter(|k| k.is_active)
        .map(|k| k.id.clone())
        .collect();
    let mut out = Vec::with_capacity(groups.len());
    for (members, id) in groups.iter().zip(ids) {
        let id = match id {
            Some(id) => id,
            None => {
                let fresh = hotspot_id(&anchor_of(members));
                if taken.contains(&fresh) {
                    let all: Vec<&str> = members.iter().map(|v| v.location_id.as_str()).collect();
                    hotspot_id(&all.join(","))
                } else {
                    fresh
                }
            }
        };
        taken.insert(id.clone());
        out.push(id);
    }
    out
}

/// Top-k by frequency, then severity weight, then taxonomy order.
pub fn rank_indicators(freq: &BTreeMap<Indicator, usize>, k: usize) -> Vec<Indicator> {
    let mut ranked: Vec<(Indicator, usize)> = freq
        .iter()
        .filter(|(_, c)| **c > 0)
        .map(|(i, c)| (*i, *c))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| b.0.severity_weight().total_cmp(&a.0.severity_weight()))
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked.into_iter().take(k).map(|(i, _)| i).collect()
}

/// One-shot detection over a trailing window ending at `now`, no history.
pub fn detect_hotspots(
    records: &[ScoredRecord],
    days_back: i64,
    min_samples: usize,
    eps_km: f64,
    directory: Arc<LocationDirectory>,
    now: DateTime<Utc>,
) -> Vec<Hotspot> {
    let params = ClusterParams {
        min_samples: min_samples.max(1),
        eps_km,
        ..ClusterParams::default()
    };
    let detector = HotspotDetector::new(directory, params, 0.15);
    let window = TimeWindow::trailing(now, days_back);
    detector.detect(records, &window, None, &[], now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::tests::scored;
    use crate::location::tests::sample_directory;
    use chrono::{NaiveDate, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn ranks_by_frequency_then_weight() {
        let freq = BTreeMap::from([
            (Indicator::Stress, 3),
            (Indicator::Anxiety, 3),
            (Indicator::Crisis, 1),
            (Indicator::Depression, 0),
        ]);
        assert_eq!(
            rank_indicators(&freq, 2),
            vec![Indicator::Anxiety, Indicator::Stress]
        );
    }

    #[test]
    fn nearby_locations_merge_into_one_hotspot() {
        let dir = Arc::new(sample_directory());
        let mut recs = Vec::new();
        for i in 0..3 {
            recs.push(scored(&format!("s{i}"), "springfield-il", day(2), 7.0, &[Indicator::Crisis]));
        }
        for i in 0..2 {
            recs.push(scored(&format!("c{i}"), "chatham-il", day(3), 6.0, &[Indicator::Anxiety]));
        }
        // Peoria is 100 km away and alone below the floor.
        recs.push(scored("p0", "peoria-il", day(3), 9.0, &[Indicator::Crisis]));

        let hs = detect_hotspots(&recs, 7, 5, 15.0, dir, now());
        assert_eq!(hs.len(), 1);
        let h = &hs[0];
        assert_eq!(h.location_ids, vec!["chatham-il", "springfield-il"]);
        assert_eq!(h.anchor_location, "springfield-il");
        assert_eq!(h.id, hotspot_id("springfield-il"));
        assert_eq!(h.record_count, 5);
        assert_eq!(h.primary_indicators[0], Indicator::Crisis);
        assert_eq!(h.affected_population, 500);
        assert!((h.mean_crisis - 6.6).abs() < 1e-9);
    }

    #[test]
    fn greedy_fallback_keeps_the_floor() {
        let dir = Arc::new(sample_directory());
        let params = ClusterParams {
            max_density_points: 1,
            ..ClusterParams::default()
        };
        let det = HotspotDetector::new(dir, params, 0.15);
        let recs: Vec<_> = (0..4)
            .map(|i| scored(&format!("r{i}"), "springfield-il", day(4), 8.0, &[]))
            .chain((0..2).map(|i| scored(&format!("q{i}"), "peoria-il", day(4), 8.0, &[])))
            .collect();
        let w = TimeWindow { start: day(1), end: day(7) };
        assert!(det.detect(&recs, &w, None, &[], now()).is_empty());
    }

    #[test]
    fn shifting_anchor_keeps_the_active_id() {
        let dir = Arc::new(sample_directory());
        let params = ClusterParams {
            eps_km: 15.0,
            ..ClusterParams::default()
        };
        let det = HotspotDetector::new(dir, params, 0.15);
        let w = TimeWindow { start: day(1), end: day(7) };

        let mut recs: Vec<_> = (0..3)
            .map(|i| scored(&format!("s{i}"), "springfield-il", day(2), 8.0, &[Indicator::Crisis]))
            .chain((0..4).map(|i| scored(&format!("c{i}"), "chatham-il", day(2), 8.0, &[Indicator::Crisis])))
            .collect();
        let first = det.detect(&recs, &w, None, &[], now());
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].anchor_location, "chatham-il");

        recs.extend((3..6).map(|i| scored(&format!("s{i}"), "springfield-il", day(3), 8.0, &[Indicator::Crisis])));
        let second = det.detect(&recs, &w, None, &first, now());
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].anchor_location, "springfield-il");
        assert_eq!(second[0].id, first[0].id);

        // Without the earlier hotspot the anchor decides.
        let fresh = det.detect(&recs, &w, None, &[], now());
        assert_eq!(fresh[0].id, hotspot_id("springfield-il"));
    }

    #[test]
    fn split_cluster_hands_the_id_to_the_larger_overlap() {
        let dir = Arc::new(sample_directory());
        let det = HotspotDetector::new(dir, ClusterParams::default(), 0.15);
        let w = TimeWindow { start: day(1), end: day(7) };
        let recs: Vec<_> = (0..5)
            .map(|i| scored(&format!("s{i}"), "springfield-il", day(2), 8.0, &[]))
            .chain((0..5).map(|i| scored(&format!("p{i}"), "peoria-il", day(2), 8.0, &[])))
            .collect();

        let mut known = det.detect(&recs, &w, None, &[], now());
        assert_eq!(known.len(), 2);
        // Pretend one earlier hotspot spanned both cities under one id.
        known.truncate(1);
        known[0].id = "hs-merged".into();
        known[0].location_ids = vec!["peoria-il".into(), "springfield-il".into()];

        let got = det.detect(&recs, &w, None, &known, now());
        let ids: Vec<&str> = got.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids.iter().filter(|id| **id == "hs-merged").count(), 1);
        assert_eq!(got.len(), 2);
        assert_ne!(got[0].id, got[1].id);
    }
}
