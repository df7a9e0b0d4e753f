// tests/hotspot_scenarios.rs
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use mh_hotspot_sentinel::alert::state::InMemoryTierStateStore;
use mh_hotspot_sentinel::location::{GeoPoint, LocationDirectory, LocationEntry};
use mh_hotspot_sentinel::records::{
    AnonymizedRecord, ScoreSource, ScoredRecord, SourceHints, SourceKind,
};
use mh_hotspot_sentinel::resources::{ResourceRegistry, ResourceType};
use mh_hotspot_sentinel::severity::Trend;
use mh_hotspot_sentinel::{
    detect_hotspots, AlertGenerator, AlertTier, Indicator, ResourceRecommender,
};
use std::sync::Arc;

fn directory() -> Arc<LocationDirectory> {
    Arc::new(LocationDirectory::new([
        LocationEntry {
            id: "springfield-il".into(),
            name: "Springfield".into(),
            region: "IL".into(),
            centroid: GeoPoint::new(39.7817, -89.6501),
            population: 114_000,
        },
        LocationEntry {
            id: "peoria-il".into(),
            name: "Peoria".into(),
            region: "IL".into(),
            centroid: GeoPoint::new(40.6936, -89.5890),
            population: 113_000,
        },
    ]))
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 7, 18, 0, 0).unwrap()
}

fn scored(id: &str, loc: &str, day: u32, crisis: f64, inds: &[Indicator]) -> ScoredRecord {
    ScoredRecord {
        record: AnonymizedRecord {
            record_id: id.into(),
            source: SourceKind::Hotline,
            location_id: loc.into(),
            day: NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            age_bucket: None,
            gender: None,
            text: None,
            keywords_detected: vec![],
            themes: None,
            aggregate: None,
            hints: SourceHints::default(),
            metadata: None,
        },
        sentiment: -0.7,
        indicators: inds.iter().copied().collect(),
        crisis_score: crisis,
        confidence: 0.9,
        source: ScoreSource::Rules,
    }
}

/// Six records in one city, mean crisis 8.2, four flagged CRISIS.
fn crisis_cluster() -> Vec<ScoredRecord> {
    let c = [Indicator::Crisis];
    let d = [Indicator::Depression];
    vec![
        scored("r1", "springfield-il", 2, 9.0, &c),
        scored("r2", "springfield-il", 3, 8.5, &c),
        scored("r3", "springfield-il", 4, 8.0, &c),
        scored("r4", "springfield-il", 5, 9.2, &c),
        scored("r5", "springfield-il", 6, 7.3, &d),
        scored("r6", "springfield-il", 6, 7.2, &d),
    ]
}

#[test]
fn dense_crisis_cluster_becomes_critical_hotspot() {
    let dir = directory();
    let hotspots = detect_hotspots(&crisis_cluster(), 7, 5, 10.0, dir.clone(), now());
    assert_eq!(hotspots.len(), 1);

    let h = &hotspots[0];
    assert_eq!(h.location_ids, vec!["springfield-il".to_string()]);
    assert_eq!(h.record_count, 6);
    assert!((h.mean_crisis - 8.2).abs() < 1e-9);
    assert_eq!(h.primary_indicators[0], Indicator::Crisis);
    assert!(h.severity >= 8.0, "severity {}", h.severity);
    assert_eq!(h.tier, AlertTier::Critical);
    assert_eq!(h.trend, Trend::Stable);
    assert!(h.affected_population > 0);

    let alerts = AlertGenerator::new(Arc::new(InMemoryTierStateStore::default()), dir.clone(), 86_400);
    let alert = alerts.generate_alert(h, now()).unwrap().expect("first CRITICAL emits");
    assert_eq!(alert.tier, AlertTier::Critical);
    assert!(alert.message.contains("CRITICAL"));
    assert!(alert.message.contains("Springfield"));
    assert!(!alert.actions.is_empty());
    assert!(!alert.recipients.is_empty());

    let recommender = ResourceRecommender::new(Arc::new(ResourceRegistry::default()), dir);
    let recs = recommender.recommend_resources(h, 5);
    let hotline = recs
        .iter()
        .find(|r| r.resource_type == ResourceType::CrisisHotline)
        .expect("a crisis hotline is always offered");
    assert!(hotline.relevance > 0.7, "relevance {}", hotline.relevance);
}

#[test]
fn below_privacy_floor_yields_nothing() {
    let c = [Indicator::Crisis];
    let records = vec![
        scored("a", "springfield-il", 5, 9.5, &c),
        scored("b", "springfield-il", 6, 9.5, &c),
        scored("c", "springfield-il", 6, 9.5, &c),
    ];
    let hotspots = detect_hotspots(&records, 7, 5, 10.0, directory(), now());
    assert!(hotspots.is_empty());
}

#[test]
fn records_outside_the_window_do_not_count() {
    let mut records = crisis_cluster();
    // Two of the six fall before the 7-day window ending on the 7th.
    records[0].record.day = NaiveDate::from_ymd_opt(2026, 2, 20).unwrap();
    records[1].record.day = NaiveDate::from_ymd_opt(2026, 2, 21).unwrap();
    let hotspots = detect_hotspots(&records, 7, 5, 10.0, directory(), now());
    assert!(hotspots.is_empty());
}

#[test]
fn distant_cities_stay_separate() {
    let c = [Indicator::Crisis];
    let mut records = crisis_cluster();
    for i in 0..5 {
        records.push(scored(&format!("p{i}"), "peoria-il", 6, 6.0, &c));
    }
    let hotspots = detect_hotspots(&records, 7, 5, 10.0, directory(), now());
    assert_eq!(hotspots.len(), 2);
    assert!(hotspots.iter().all(|h| h.location_ids.len() == 1));
    let ids: Vec<&str> = hotspots.iter().map(|h| h.id.as_str()).collect();
    assert_ne!(ids[0], ids[1]);
}
