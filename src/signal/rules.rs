//! Rule-based detector: weighted keyword matching per indicator, lexicon
//! sentiment with a negation window, and aggregate-record heuristics.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::lexicon::Lexicon;
use crate::indicator::Indicator;
use crate::records::{AggregateStats, AnonymizedRecord, ScoreSource, ScoredRecord};
use crate::text::{count_term, tokenize};

/// Repeats of one term beyond this add nothing.
const MAX_HITS_PER_TERM: usize = 3;

/// Score floor applied when a counselor flagged the session as a crisis.
const CRISIS_FLAG_FLOOR: f64 = 7.0;
/// Score floor for a counselor-declared primary concern.
const DECLARED_FLOOR: f64 = 5.0;

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "happy", "better", "improve", "improving", "hope", "hopeful", "help",
    "support", "calm", "safe", "grateful",
];
const NEGATIVE_WORDS: &[&str] = &[
    "bad", "terrible", "awful", "horrible", "worse", "hopeless", "helpless", "fear", "scared",
    "alone", "sad", "angry", "numb", "worthless", "empty",
];
const NEGATORS: &[&str] = &[
    "not", "no", "never", "isn't", "wasn't", "aren't", "won't", "can't", "cannot", "without",
    "don't", "didn't",
];
const INTENSIFIERS: &[&str] = &["very", "so", "extremely", "really", "totally", "completely"];
const FIRST_PERSON: &[&str] = &["i", "me", "my", "myself", "mine", "i'm", "i've", "i'd"];

/// Surface features of how something was said.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LanguagePatterns {
    pub exclamations: usize,
    pub questions: usize,
    pub negations: usize,
    pub first_person: usize,
    /// (exclamations + intensifiers) per token, capped at 1.
    pub emotional_intensity: f64,
}

pub fn language_patterns(text: &str) -> LanguagePatterns {
    let tokens = tokenize(text);
    let exclamations = text.matches('!').count();
    let intensifiers = tokens.iter().filter(|t| INTENSIFIERS.contains(&t.as_str())).count();
    LanguagePatterns {
        exclamations,
        questions: text.matches('?').count(),
        negations: tokens.iter().filter(|t| NEGATORS.contains(&t.as_str())).count(),
        first_person: tokens.iter().filter(|t| FIRST_PERSON.contains(&t.as_str())).count(),
        emotional_intensity: if tokens.is_empty() {
            0.0
        } else {
            ((exclamations + intensifiers) as f64 / tokens.len() as f64).min(1.0)
        },
    }
}

/// Lexicon sentiment in [-1, 1]. A negator within the previous three tokens
/// flips a word's polarity.
pub fn rule_sentiment(text: &str) -> f64 {
    let tokens = tokenize(text);
    let (mut pos, mut neg) = (0usize, 0usize);
    for i in 0..tokens.len() {
        let w = tokens[i].as_str();
        let polarity: i8 = if POSITIVE_WORDS.contains(&w) {
            1
        } else if NEGATIVE_WORDS.contains(&w) {
            -1
        } else {
            continue;
        };
        let negated = (1..=3).any(|k| i >= k && NEGATORS.contains(&tokens[i - k].as_str()));
        match (polarity > 0) != negated {
            true => pos += 1,
            false => neg += 1,
        }
    }
    if pos + neg == 0 {
        0.0
    } else {
        (pos as f64 - neg as f64) / (pos + neg) as f64
    }
}

/// Per-record combination of indicator scores. Monotone in every input.
pub fn combine_crisis(scores: &BTreeMap<Indicator, f64>) -> f64 {
    let contribs: Vec<f64> = scores
        .iter()
        .map(|(ind, s)| s.clamp(0.0, 10.0) * ind.crisis_contribution())
        .collect();
    let max = contribs.iter().copied().fold(0.0, f64::max);
    let sum: f64 = contribs.iter().sum();
    (0.9 * max + 0.1 * sum).min(10.0)
}

/// Output of the rule path before it becomes a `ScoredRecord`.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleAnalysis {
    pub indicator_scores: BTreeMap<Indicator, f64>,
    pub flagged: BTreeSet<Indicator>,
    pub crisis_score: f64,
    pub sentiment: f64,
    pub confidence: f64,
    pub matched_terms: usize,
    pub patterns: LanguagePatterns,
}

impl RuleAnalysis {
    fn no_signal() -> Self {
        Self {
            indicator_scores: BTreeMap::new(),
            flagged: BTreeSet::new(),
            crisis_score: 0.0,
            sentiment: 0.0,
            confidence: 0.0,
            matched_terms: 0,
            patterns: LanguagePatterns::default(),
        }
    }

    pub fn into_scored(self, record: AnonymizedRecord) -> ScoredRecord {
        ScoredRecord {
            record,
            sentiment: self.sentiment,
            indicators: self.flagged,
            crisis_score: self.crisis_score,
            confidence: self.confidence,
            source: ScoreSource::Rules,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuleDetector {
    lexicon: Arc<Lexicon>,
}

impl RuleDetector {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self { lexicon }
    }

    pub fn analyze(&self, rec: &AnonymizedRecord) -> RuleAnalysis {
        if let Some(agg) = &rec.aggregate {
            return analyze_aggregate(agg);
        }
        let Some(text) = rec.text.as_deref().filter(|t| !t.trim().is_empty()) else {
            return RuleAnalysis::no_signal();
        };

        let mut analysis = self.analyze_text(text);

        if rec.hints.crisis_flag {
            let s = analysis.indicator_scores.entry(Indicator::Crisis).or_insert(0.0);
            *s = s.max(CRISIS_FLAG_FLOOR);
        }
        if let Some(ind) = rec.hints.declared_indicator {
            let s = analysis.indicator_scores.entry(ind).or_insert(0.0);
            *s = s.max(DECLARED_FLOOR);
        }
        if rec.hints.crisis_flag || rec.hints.declared_indicator.is_some() {
            analysis.flagged = flagged(&analysis.indicator_scores);
            analysis.crisis_score = combine_crisis(&analysis.indicator_scores);
            analysis.confidence = confidence(analysis.matched_terms, analysis.crisis_score);
        }
        analysis
    }

    pub fn analyze_text(&self, text: &str) -> RuleAnalysis {
        let lower = text.to_lowercase();
        let mut indicator_scores = BTreeMap::new();
        let mut matched = BTreeSet::new();

        for (ind, cat) in &self.lexicon.categories {
            let mut raw = 0.0;
            for (term, weight) in &cat.terms {
                let hits = count_term(&lower, term).min(MAX_HITS_PER_TERM);
                if hits > 0 {
                    raw += weight * hits as f64;
                    matched.insert(term.as_str());
                }
            }
            if raw > 0.0 {
                indicator_scores.insert(*ind, (raw / cat.saturation * 10.0).min(10.0));
            }
        }

        let crisis_score = combine_crisis(&indicator_scores);
        RuleAnalysis {
            flagged: flagged(&indicator_scores),
            crisis_score,
            sentiment: rule_sentiment(text),
            confidence: confidence(matched.len(), crisis_score),
            matched_terms: matched.len(),
            patterns: language_patterns(text),
            indicator_scores,
        }
    }
}

fn flagged(scores: &BTreeMap<Indicator, f64>) -> BTreeSet<Indicator> {
    scores
        .iter()
        .filter(|(ind, s)| **s > ind.flag_threshold())
        .map(|(ind, _)| *ind)
        .collect()
}

/// More distinct terms and a stronger score both raise confidence.
fn confidence(matched_terms: usize, crisis_score: f64) -> f64 {
    if matched_terms == 0 && crisis_score == 0.0 {
        return 0.0;
    }
    let c = 0.6 * (matched_terms as f64 / 5.0).min(1.0) + 0.4 * (crisis_score / 7.0).min(1.0);
    c.clamp(0.3, 1.0)
}

fn analyze_aggregate(agg: &AggregateStats) -> RuleAnalysis {
    let mut scores = BTreeMap::new();
    let (sentiment, confidence) = match agg {
        AggregateStats::Social(s) => {
            let n = f64::from(s.sample_size.max(1));
            let share = |c: u32| f64::from(c) / n;
            scores.insert(Indicator::Crisis, (share(s.crisis_mentions) * 25.0).min(10.0));
            scores.insert(Indicator::Anxiety, (share(s.anxiety_mentions) * 20.0).min(10.0));
            scores.insert(Indicator::Depression, (share(s.depression_mentions) * 20.0).min(10.0));
            let stress = s.keyword_frequency.get("stress").copied().unwrap_or(0)
                + s.keyword_frequency.get("overwhelmed").copied().unwrap_or(0);
            scores.insert(Indicator::Stress, (share(stress) * 20.0).min(10.0));
            let conf = (0.3 + 0.7 * (n / 50.0).min(1.0)).min(1.0);
            (s.mean_sentiment.clamp(-1.0, 1.0), conf)
        }
        AggregateStats::Absenteeism(a) => {
            let mh_share = f64::from(a.mental_health_related) / f64::from(a.enrollment.max(1));
            scores.insert(Indicator::Stress, (mh_share * 30.0).min(10.0));
            scores.insert(Indicator::Depression, (a.chronic_rate_pct / 100.0 * 15.0).min(10.0));
            (-(mh_share * 2.0).min(1.0), 0.5)
        }
    };
    scores.retain(|_, s| *s > 0.0);
    let crisis_score = combine_crisis(&scores);
    RuleAnalysis {
        flagged: flagged(&scores),
        crisis_score,
        sentiment,
        confidence: if scores.is_empty() { 0.0 } else { confidence },
        matched_terms: 0,
        patterns: LanguagePatterns::default(),
        indicator_scores: scores,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> RuleDetector {
        RuleDetector::new(Arc::new(Lexicon::default_seed()))
    }

    #[test]
    fn crisis_language_scores_high() {
        let a = detector().analyze_text("I want to end my life, it feels hopeless, no way out");
        assert!(a.crisis_score >= 8.0, "got {}", a.crisis_score);
        assert!(a.flagged.contains(&Indicator::Crisis));
        assert!(a.flagged.contains(&Indicator::SuicidalIdeation));
        assert!(a.sentiment < 0.0);
        assert!(a.confidence >= 0.3);
    }

    #[test]
    fn neutral_text_scores_zero() {
        let a = detector().analyze_text("We talked about the weekend and the weather");
        assert_eq!(a.crisis_score, 0.0);
        assert!(a.flagged.is_empty());
        assert_eq!(a.confidence, 0.0);
    }

    #[test]
    fn repeated_term_is_capped() {
        let d = detector();
        let three = d.analyze_text("tired tired tired");
        let ten = d.analyze_text(&"tired ".repeat(10));
        assert_eq!(three.crisis_score, ten.crisis_score);
    }

    #[test]
    fn negation_flips_sentiment() {
        assert!(rule_sentiment("I feel good") > 0.0);
        assert!(rule_sentiment("I do not feel good") < 0.0);
        assert_eq!(rule_sentiment("nothing here"), 0.0);
    }

    #[test]
    fn language_patterns_counts() {
        let p = language_patterns("Why me?! I'm so tired!");
        assert_eq!(p.exclamations, 2);
        assert_eq!(p.questions, 1);
        assert_eq!(p.first_person, 2);
        assert!(p.emotional_intensity > 0.0);
    }

    #[test]
    fn combine_is_capped_at_ten() {
        let scores: BTreeMap<_, _> = Indicator::ALL.iter().map(|i| (*i, 10.0)).collect();
        assert_eq!(combine_crisis(&scores), 10.0);
    }
}
