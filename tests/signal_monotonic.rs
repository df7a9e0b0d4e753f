// tests/signal_monotonic.rs
use mh_hotspot_sentinel::indicator::Indicator;
use mh_hotspot_sentinel::signal::lexicon::Lexicon;
use mh_hotspot_sentinel::signal::rules::{combine_crisis, RuleDetector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;

const CRISIS_TERMS: &[&str] = &["hopeless", "no way out", "overwhelmed", "suicidal", "giving up"];

#[test]
fn adding_crisis_terms_never_lowers_the_score() {
    let detector = RuleDetector::new(Arc::new(Lexicon::default_seed()));
    let mut text = String::from("we talked about the week");
    let mut last = detector.analyze_text(&text).crisis_score;
    assert_eq!(last, 0.0);

    for term in CRISIS_TERMS {
        text.push_str(", ");
        text.push_str(term);
        let now = detector.analyze_text(&text).crisis_score;
        assert!(now >= last, "`{term}` lowered {last} -> {now}");
        assert!((0.0..=10.0).contains(&now));
        last = now;
    }
    assert!(last >= 7.0, "stacked crisis language should score high, got {last}");
}

#[test]
fn combine_is_monotone_under_random_bumps() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..500 {
        let mut scores: BTreeMap<Indicator, f64> = BTreeMap::new();
        for ind in Indicator::ALL {
            if rng.random_bool(0.6) {
                scores.insert(ind, rng.random_range(0.0..10.0));
            }
        }
        let before = combine_crisis(&scores);

        let ind = Indicator::ALL[rng.random_range(0..Indicator::ALL.len())];
        let bump = rng.random_range(0.0..5.0);
        let entry = scores.entry(ind).or_insert(0.0);
        *entry = (*entry + bump).min(10.0);
        let after = combine_crisis(&scores);

        assert!(after + 1e-12 >= before, "{ind}: {before} -> {after}");
        assert!(after <= 10.0);
    }
}

#[test]
fn neutral_text_has_no_indicators() {
    let detector = RuleDetector::new(Arc::new(Lexicon::default_seed()));
    let a = detector.analyze_text("picked up groceries and went for a walk");
    assert!(a.flagged.is_empty());
    assert_eq!(a.crisis_score, 0.0);
    assert_eq!(a.confidence, 0.0);
}
