// src/signal/mod.rs
//! Per-record crisis scoring.
//!
//! Two strategies sit behind one detector: the rule path (always present)
//! and an optional model (`ClassifierStrategy`). When both answer they are
//! merged; when the model is unavailable the rule result stands.

pub mod classifier;
pub mod lexicon;
pub mod rules;

use metrics::counter;
use std::sync::Arc;

use crate::indicator::Indicator;
use crate::records::{AnonymizedRecord, ScoreSource, ScoredRecord};
use classifier::{DynClassifier, ModelVerdict};
use lexicon::Lexicon;
use rules::{RuleAnalysis, RuleDetector};

pub const DEFAULT_DISAGREEMENT_MARGIN: f64 = 3.0;
pub const DEFAULT_MODEL_INDICATOR_THRESHOLD: f64 = 0.5;

/// Confidence multiplier applied when the strategies disagree.
const DISAGREEMENT_CONFIDENCE_FACTOR: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergePolicy {
    /// Crisis-score gap above which the higher score wins outright.
    pub disagreement_margin: f64,
    /// Model probability needed to flag an indicator.
    pub model_indicator_threshold: f64,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            disagreement_margin: DEFAULT_DISAGREEMENT_MARGIN,
            model_indicator_threshold: DEFAULT_MODEL_INDICATOR_THRESHOLD,
        }
    }
}

#[derive(Clone)]
pub struct SignalDetector {
    rules: RuleDetector,
    model: Option<DynClassifier>,
    policy: MergePolicy,
}

impl SignalDetector {
    /// Rule path only.
    pub fn rules_only(lexicon: Arc<Lexicon>) -> Self {
        Self {
            rules: RuleDetector::new(lexicon),
            model: None,
            policy: MergePolicy::default(),
        }
    }

    /// Rule path plus a model strategy. A disabled strategy is dropped here so
    /// the per-record path never consults it.
    pub fn with_model(lexicon: Arc<Lexicon>, model: DynClassifier, policy: MergePolicy) -> Self {
        let model = if model.is_enabled() {
            tracing::info!(target: "signal", provider = model.name(), "model strategy enabled");
            Some(model)
        } else {
            tracing::info!(target: "signal", "model strategy disabled; rule-based scoring only");
            None
        };
        Self {
            rules: RuleDetector::new(lexicon),
            model,
            policy,
        }
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Score one anonymized record. Never fails: model problems degrade to the
    /// rule result with a warning.
    pub async fn score(&self, record: AnonymizedRecord) -> ScoredRecord {
        let rule = self.rules.analyze(&record);
        tracing::trace!(
            target: "signal",
            record = %record.record_id,
            crisis = rule.crisis_score,
            terms = rule.matched_terms,
            intensity = rule.patterns.emotional_intensity,
            "rule analysis"
        );

        let Some(model) = &self.model else {
            return rule.into_scored(record);
        };
        // The model only reads free text; aggregates stay on the rule path.
        let text = match record.text.as_deref() {
            Some(t) if !t.trim().is_empty() && record.aggregate.is_none() => t.to_string(),
            _ => return rule.into_scored(record),
        };

        match model.classify(&text).await {
            Ok(verdict) => merge(rule, &verdict, &self.policy).into_record(record),
            Err(e) => {
                tracing::warn!(
                    target: "signal",
                    record = %record.record_id,
                    provider = model.name(),
                    error = %e,
                    "model unavailable; using rule-based score"
                );
                counter!("sentinel_model_fallback_total").increment(1);
                rule.into_scored(record)
            }
        }
    }
}

/// Merged output of both strategies.
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    pub crisis_score: f64,
    pub sentiment: f64,
    pub confidence: f64,
    pub indicators: std::collections::BTreeSet<Indicator>,
}

impl Merged {
    fn into_record(self, record: AnonymizedRecord) -> ScoredRecord {
        ScoredRecord {
            record,
            sentiment: self.sentiment,
            indicators: self.indicators,
            crisis_score: self.crisis_score,
            confidence: self.confidence,
            source: ScoreSource::Merged,
        }
    }
}

/// Confidence-weighted average when the two scores agree; the higher score
/// with lowered confidence when they differ by more than the margin.
/// Indicators are the union of what each strategy flags on its own.
pub fn merge(rule: RuleAnalysis, model: &ModelVerdict, policy: &MergePolicy) -> Merged {
    let model = model.clone().sanitized();
    let (ra, ca) = (rule.crisis_score, rule.confidence);
    let (rb, cb) = (model.crisis_score, model.confidence);

    let weighted = |a: f64, b: f64| {
        if ca + cb > 0.0 {
            (a * ca + b * cb) / (ca + cb)
        } else {
            (a + b) / 2.0
        }
    };

    let (crisis_score, confidence) = if (ra - rb).abs() > policy.disagreement_margin {
        (ra.max(rb), (ca + cb) / 2.0 * DISAGREEMENT_CONFIDENCE_FACTOR)
    } else {
        (weighted(ra, rb), ca.max(cb))
    };

    let mut indicators = rule.flagged;
    indicators.extend(
        model
            .indicator_probs
            .iter()
            .filter(|(_, p)| **p >= policy.model_indicator_threshold)
            .map(|(i, _)| *i),
    );

    Merged {
        crisis_score: crisis_score.clamp(0.0, 10.0),
        sentiment: weighted(rule.sentiment, model.sentiment).clamp(-1.0, 1.0),
        confidence: confidence.clamp(0.0, 1.0),
        indicators,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{SourceHints, SourceKind};
    use crate::signal::classifier::{DisabledClassifier, MockClassifier};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn rec(text: Option<&str>) -> AnonymizedRecord {
        AnonymizedRecord {
            record_id: "feedfacecafebeef".into(),
            source: SourceKind::Counseling,
            location_id: "springfield-il".into(),
            day: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            age_bucket: None,
            gender: None,
            text: text.map(str::to_string),
            keywords_detected: vec![],
            themes: None,
            aggregate: None,
            hints: SourceHints::default(),
            metadata: None,
        }
    }

    fn mock(score: f64, conf: f64, probs: &[(Indicator, f64)]) -> DynClassifier {
        Arc::new(MockClassifier {
            fixed: ModelVerdict {
                crisis_score: score,
                sentiment: -0.5,
                confidence: conf,
                indicator_probs: probs.iter().copied().collect::<BTreeMap<_, _>>(),
            },
        })
    }

    fn lex() -> Arc<Lexicon> {
        Arc::new(Lexicon::default_seed())
    }

    #[tokio::test]
    async fn empty_text_is_no_signal() {
        let d = SignalDetector::rules_only(lex());
        for t in [None, Some(""), Some("   ")] {
            let s = d.score(rec(t)).await;
            assert_eq!(s.crisis_score, 0.0);
            assert!(s.indicators.is_empty());
            assert_eq!(s.confidence, 0.0);
        }
    }

    #[tokio::test]
    async fn disagreement_prefers_higher_and_lowers_confidence() {
        let d = SignalDetector::with_model(
            lex(),
            mock(9.5, 0.9, &[(Indicator::Ptsd, 0.8)]),
            MergePolicy::default(),
        );
        let s = d.score(rec(Some("a bit tired lately"))).await;
        assert_eq!(s.source, ScoreSource::Merged);
        assert_eq!(s.crisis_score, 9.5);
        assert!(s.confidence < 0.9);
        assert!(s.indicators.contains(&Indicator::Ptsd));
    }

    #[test]
    fn agreement_is_confidence_weighted() {
        let rule = RuleDetector::new(lex()).analyze_text("I feel hopeless and helpless");
        let verdict = ModelVerdict {
            crisis_score: rule.crisis_score + 1.0,
            sentiment: -1.0,
            confidence: rule.confidence,
            indicator_probs: BTreeMap::new(),
        };
        let m = merge(rule.clone(), &verdict, &MergePolicy::default());
        assert!((m.crisis_score - (rule.crisis_score + 0.5)).abs() < 1e-9);
        assert_eq!(m.indicators, rule.flagged);
    }

    #[tokio::test]
    async fn disabled_model_is_skipped() {
        let d = SignalDetector::with_model(lex(), Arc::new(DisabledClassifier), MergePolicy::default());
        assert!(!d.has_model());
        let s = d.score(rec(Some("panic attack again"))).await;
        assert_eq!(s.source, ScoreSource::Rules);
        assert!(s.indicators.contains(&Indicator::Anxiety));
    }
}
