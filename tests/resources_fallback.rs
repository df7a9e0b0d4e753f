// tests/resources_fallback.rs
use chrono::{NaiveDate, TimeZone, Utc};
use mh_hotspot_sentinel::aggregate::TimeWindow;
use mh_hotspot_sentinel::location::{GeoPoint, LocationDirectory, LocationEntry};
use mh_hotspot_sentinel::resources::{ResourceRegistry, ResourceType};
use mh_hotspot_sentinel::severity::Trend;
use mh_hotspot_sentinel::{AlertTier, Hotspot, Indicator, ResourceRecommender};
use std::collections::BTreeMap;
use std::fs;
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

fn anxiety_hotspot() -> Hotspot {
    let end = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
    Hotspot {
        id: "hs-spfld".into(),
        centroid: GeoPoint::new(39.7817, -89.6501),
        location_ids: vec!["springfield-il".into()],
        anchor_location: "springfield-il".into(),
        record_count: 9,
        mean_crisis: 5.1,
        mean_sentiment: -0.3,
        indicator_freq: BTreeMap::from([(Indicator::Anxiety, 7), (Indicator::Depression, 3)]),
        primary_indicators: vec![Indicator::Anxiety, Indicator::Depression],
        severity: 5.4,
        tier: AlertTier::Warning,
        trend: Trend::Increasing,
        previous_severity: Some(4.1),
        affected_population: 900,
        window: TimeWindow { start: end - chrono::Duration::days(6), end },
        created_at: Utc.with_ymd_and_hms(2026, 6, 1, 6, 0, 0).unwrap(),
        is_active: true,
    }
}

const REGISTRY: &str = r#"{
  "resources": [
    { "id": "spfld-counsel", "name": "Capitol Counseling", "resource_type": "counselor",
      "location_id": "springfield-il", "services": ["Anxiety counseling"], "availability": "available" },
    { "id": "spfld-detox", "name": "Prairie Detox", "resource_type": "detox_center",
      "location_id": "springfield-il", "services": ["Detox"], "availability": "available" },
    { "id": "peoria-therapy", "name": "Peoria Therapy", "resource_type": "therapist",
      "location_id": "peoria-il", "services": ["Anxiety and depression"], "availability": "available" }
  ]
}"#;

#[test]
fn missing_or_broken_registry_falls_back_to_national_lines() {
    let dir = tempfile::tempdir().unwrap();
    let missing = ResourceRegistry::load_from_file(dir.path().join("nope.json"));
    assert!(missing.is_empty());

    let bad = dir.path().join("bad.json");
    fs::write(&bad, "{ not json").unwrap();
    let broken = ResourceRegistry::load_from_file(&bad);
    assert!(broken.is_empty());

    let rec = ResourceRecommender::new(Arc::new(broken), directory());
    let out = rec.recommend_resources(&anxiety_hotspot(), 5);
    assert_eq!(out.len(), 3);
    assert!(out.iter().all(|r| r.national));
    assert!(out.iter().any(|r| r.contact.as_deref() == Some("988")));
}

#[test]
fn local_matches_rank_first_and_far_or_irrelevant_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resources.json");
    fs::write(&path, REGISTRY).unwrap();
    let registry = ResourceRegistry::load_from_file(&path);
    assert_eq!(registry.len(), 3);

    let rec = ResourceRecommender::new(Arc::new(registry), directory());
    let out = rec.recommend_resources(&anxiety_hotspot(), 5);

    let ids: Vec<&str> = out.iter().map(|r| r.resource_id.as_str()).collect();
    assert_eq!(ids[0], "spfld-counsel");
    // Detox serves neither indicator; Peoria is ~100 km away.
    assert!(!ids.contains(&"spfld-detox"));
    assert!(!ids.contains(&"peoria-therapy"));
    assert_eq!(out.iter().filter(|r| r.national).count(), 3);

    let top = &out[0];
    assert_eq!(top.resource_type, ResourceType::Counselor);
    assert_eq!(top.matched_indicators, vec![Indicator::Anxiety, Indicator::Depression]);
    assert!(top.relevance > 0.9);
}

#[test]
fn action_plan_splits_local_and_national() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resources.json");
    fs::write(&path, REGISTRY).unwrap();
    let rec = ResourceRecommender::new(Arc::new(ResourceRegistry::load_from_file(&path)), directory());

    let plan = rec.action_plan(&anxiety_hotspot(), 1);
    assert_eq!(plan.resources.len(), 1);
    assert_eq!(plan.national_resources.len(), 3);
    assert!(plan.immediate_actions.is_empty());
    assert!(!plan.monitoring_actions.is_empty());
}
