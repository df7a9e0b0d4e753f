// src/anonymize/mod.rs
//! PII boundary: raw records in, anonymized records out.
//!
//! `Anonymizer::anonymize` is a pure transform followed by the validator; a
//! record either comes out clean or not at all. Callers own audit side
//! effects (see `crate::audit`).

pub mod patterns;
pub mod validator;

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult};
use crate::indicator::Indicator;
use crate::location::LocationDirectory;
use crate::records::{
    AbsenteeismAggregate, AgeBucket, AggregateStats, AnonymizedRecord, GenderGroup, RawRecord,
    SocialAggregate, SocialPost, SourceHints, SourceKind, StudentAbsence,
};
use crate::text::{contains_term, count_term, normalize_text};
use patterns::{find_pii, placeholder, PiiFinding, MENTAL_HEALTH_KEYWORDS};

/// Metadata keys containing any of these fragments are dropped outright.
const SENSITIVE_KEY_FRAGMENTS: &[&str] = &["name", "email", "phone", "address", "identifier"];
/// Metadata keys with any of these as a whole word (`client_id`, `sessionId`)
/// are dropped too.
const SENSITIVE_KEY_WORDS: &[&str] = &["id", "ids", "uuid", "ssn", "mrn", "dob"];

const ANXIETY_TERMS: &[&str] = &["anxiety", "panic"];
const DEPRESSION_TERMS: &[&str] = &["depression", "hopeless"];
const CRISIS_TERMS: &[&str] = &["crisis", "suicide", "self-harm", "emergency"];

/// Absence share above which a student counts as chronically absent.
const CHRONIC_ABSENCE_PCT: f64 = 10.0;

/// Hex of the first `bytes` bytes of SHA-256(text).
pub fn anon_hash(text: &str, bytes: usize) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(bytes * 2);
    for b in digest.iter().take(bytes) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Irreversible record id derived from the upstream event id.
pub fn record_id_for(kind: SourceKind, event_id: &str) -> String {
    anon_hash(&format!("{}:{}", kind.as_str(), event_id.trim()), 8)
}

#[derive(Debug, Clone)]
pub struct Anonymizer {
    directory: Arc<LocationDirectory>,
}

impl Anonymizer {
    pub fn new(directory: Arc<LocationDirectory>) -> Self {
        Self { directory }
    }

    /// Scrub and generalize one raw record, then re-validate the output.
    pub fn anonymize(&self, raw: &RawRecord) -> PipelineResult<AnonymizedRecord> {
        let rec = self.transform(raw)?;
        validator::validate(&rec)?;
        Ok(rec)
    }

    fn transform(&self, raw: &RawRecord) -> PipelineResult<AnonymizedRecord> {
        let header = raw.header();
        if header.event_id.trim().is_empty() {
            return Err(PipelineError::Validation("missing event_id".into()));
        }
        let kind = raw.source_kind();
        let location_id = self.directory.resolve(&header.location)?;

        let mut rec = AnonymizedRecord {
            record_id: record_id_for(kind, &header.event_id),
            source: kind,
            location_id,
            day: header.timestamp.date_naive(),
            age_bucket: None,
            gender: None,
            text: None,
            keywords_detected: Vec::new(),
            themes: None,
            aggregate: None,
            hints: SourceHints::default(),
            metadata: None,
        };

        match raw {
            RawRecord::CounselingSession(s) => {
                rec.age_bucket = s.age.map(AgeBucket::from_age).transpose()?;
                rec.gender = Some(GenderGroup::generalize(s.gender.as_deref()));
                rec.text = s.session_notes.as_deref().map(scrub_text).filter(|t| !t.is_empty());
                rec.keywords_detected = rec.text.as_deref().map(clinical_keywords).unwrap_or_default();
                rec.hints = SourceHints {
                    crisis_flag: s.is_crisis_session,
                    declared_indicator: s.primary_concern.as_deref().and_then(Indicator::parse_loose),
                };
                rec.metadata = s.metadata.clone().and_then(sanitize_metadata);
            }
            RawRecord::HotlineTranscript(t) => {
                rec.age_bucket = t.age.map(AgeBucket::from_age).transpose()?;
                rec.gender = Some(GenderGroup::generalize(t.gender.as_deref()));
                rec.text = t.transcript.as_deref().map(scrub_text).filter(|s| !s.is_empty());
                if let Some(text) = rec.text.as_deref() {
                    rec.keywords_detected = clinical_keywords(text);
                    rec.themes = Some(themes_summary(text));
                }
                rec.metadata = t.metadata.clone().and_then(sanitize_metadata);
            }
            RawRecord::SocialSentimentBatch(b) => {
                rec.aggregate = Some(AggregateStats::Social(social_aggregate(&b.posts)?));
            }
            RawRecord::SchoolAbsenteeism(a) => {
                rec.aggregate = Some(AggregateStats::Absenteeism(absenteeism_aggregate(&a.students)?));
            }
        }

        Ok(rec)
    }
}

/// Normalize and strip PII from free text. Runs until a pass finds nothing
/// (bounded), so the validator sees a fixed point.
pub fn scrub_text(input: &str) -> String {
    let mut text = normalize_text(input);
    for _ in 0..3 {
        let findings = merge_name_runs(&text, find_pii(&text));
        if findings.is_empty() {
            break;
        }
        let mut out = String::with_capacity(text.len());
        let mut cursor = 0;
        for f in &findings {
            out.push_str(&text[cursor..f.start]);
            out.push_str(placeholder(f.pattern));
            cursor = f.end;
        }
        out.push_str(&text[cursor..]);
        text = out;
    }
    text
}

fn is_name_pattern(p: &str) -> bool {
    matches!(p, patterns::HONORIFIC_NAME | patterns::NAME_LIST | patterns::CAPITALIZED_NAME)
}

/// Collapse "Mary Jones" style runs into a single `[NAME]`.
fn merge_name_runs(text: &str, findings: Vec<PiiFinding>) -> Vec<PiiFinding> {
    let mut out: Vec<PiiFinding> = Vec::with_capacity(findings.len());
    for f in findings {
        if let Some(last) = out.last_mut() {
            let gap = &text[last.end..f.start];
            if is_name_pattern(last.pattern)
                && is_name_pattern(f.pattern)
                && gap.chars().all(|c| c == ' ')
            {
                last.end = f.end;
                continue;
            }
        }
        out.push(f);
    }
    out
}

/// Whitelisted clinical keywords present in `text`, in list order.
pub fn clinical_keywords(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    MENTAL_HEALTH_KEYWORDS
        .iter()
        .filter(|k| contains_term(&lower, k))
        .map(|k| k.to_string())
        .collect()
}

/// "Themes detected: a, b, c" from the three most frequent keywords.
pub fn themes_summary(text: &str) -> String {
    let lower = text.to_lowercase();
    let mut counts: Vec<(&str, usize)> = MENTAL_HEALTH_KEYWORDS
        .iter()
        .map(|k| (*k, count_term(&lower, k)))
        .filter(|(_, n)| *n > 0)
        .collect();
    if counts.is_empty() {
        return "General mental health discussion".to_string();
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let top: Vec<&str> = counts.iter().take(3).map(|(k, _)| *k).collect();
    format!("Themes detected: {}", top.join(", "))
}

/// Split a key into lowercase words on `_`, `-`, `.`, spaces and
/// lower-to-upper case changes.
fn key_words(key: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut cur = String::new();
    let mut prev_lower = false;
    for c in key.chars() {
        if !c.is_alphanumeric() {
            if !cur.is_empty() {
                words.push(std::mem::take(&mut cur));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !cur.is_empty() {
            words.push(std::mem::take(&mut cur));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        cur.extend(c.to_lowercase());
    }
    if !cur.is_empty() {
        words.push(cur);
    }
    words
}

fn is_sensitive_key(key: &str) -> bool {
    let lk = key.to_ascii_lowercase();
    SENSITIVE_KEY_FRAGMENTS.iter().any(|f| lk.contains(f))
        || key_words(key).iter().any(|w| SENSITIVE_KEY_WORDS.contains(&w.as_str()))
}

/// Drop sensitive keys recursively and scrub every remaining string.
fn sanitize_metadata(v: Value) -> Option<Value> {
    fn walk(v: Value) -> Value {
        match v {
            Value::Object(map) => {
                let mut out = Map::new();
                for (k, val) in map {
                    if is_sensitive_key(&k) {
                        continue;
                    }
                    out.insert(k, walk(val));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.into_iter().map(walk).collect()),
            Value::String(s) => Value::String(scrub_text(&s)),
            other => other,
        }
    }
    match walk(v) {
        Value::Object(m) if m.is_empty() => None,
        Value::Null => None,
        other => Some(other),
    }
}

fn social_aggregate(posts: &[SocialPost]) -> PipelineResult<SocialAggregate> {
    if posts.is_empty() {
        return Err(PipelineError::Validation("social batch has no posts".into()));
    }

    let mut keyword_frequency: BTreeMap<String, u32> = BTreeMap::new();
    let (mut anxiety, mut depression, mut crisis) = (0u32, 0u32, 0u32);
    let mut sentiments = Vec::with_capacity(posts.len());

    for post in posts {
        if let Some(s) = post.sentiment {
            if !s.is_finite() || !(-1.0..=1.0).contains(&s) {
                return Err(PipelineError::Validation(format!("post sentiment {s} outside [-1, 1]")));
            }
            sentiments.push(s);
        }
        let lower = normalize_text(&post.text).to_lowercase();
        for k in MENTAL_HEALTH_KEYWORDS {
            if contains_term(&lower, k) {
                *keyword_frequency.entry(k.to_string()).or_default() += 1;
            }
        }
        let any = |terms: &[&str]| terms.iter().any(|t| contains_term(&lower, t));
        anxiety += any(ANXIETY_TERMS) as u32;
        depression += any(DEPRESSION_TERMS) as u32;
        crisis += any(CRISIS_TERMS) as u32;
    }

    let mean_sentiment = if sentiments.is_empty() {
        0.0
    } else {
        sentiments.iter().sum::<f64>() / sentiments.len() as f64
    };

    Ok(SocialAggregate {
        sample_size: posts.len() as u32,
        mean_sentiment,
        keyword_frequency,
        anxiety_mentions: anxiety,
        depression_mentions: depression,
        crisis_mentions: crisis,
    })
}

fn absenteeism_aggregate(students: &[StudentAbsence]) -> PipelineResult<AbsenteeismAggregate> {
    if students.is_empty() {
        return Err(PipelineError::Validation("absenteeism report has no students".into()));
    }

    let (mut absent, mut mh, mut chronic) = (0u32, 0u32, 0u32);
    let (mut days_absent, mut days_enrolled) = (0u64, 0u64);
    for s in students {
        if s.days_enrolled == 0 || s.days_absent > s.days_enrolled {
            return Err(PipelineError::Validation(
                "student absence exceeds enrolled days".into(),
            ));
        }
        days_absent += u64::from(s.days_absent);
        days_enrolled += u64::from(s.days_enrolled);
        if s.days_absent > 0 {
            absent += 1;
        }
        if s.mental_health_related {
            mh += 1;
        }
        let rate = f64::from(s.days_absent) / f64::from(s.days_enrolled) * 100.0;
        if rate > CHRONIC_ABSENCE_PCT {
            chronic += 1;
        }
    }

    let enrollment = students.len() as u32;
    Ok(AbsenteeismAggregate {
        enrollment,
        absent_count: absent,
        absence_rate_pct: days_absent as f64 / days_enrolled as f64 * 100.0,
        mental_health_related: mh,
        chronic_rate_pct: f64::from(chronic) / f64::from(enrollment) * 100.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::tests::sample_directory;
    use crate::records::{
        CounselingSession, HotlineTranscript, LocationRef, RecordHeader, SchoolAbsenteeism,
        SocialSentimentBatch,
    };
    use chrono::{TimeZone, Utc};

    fn header(event: &str) -> RecordHeader {
        RecordHeader {
            event_id: event.into(),
            location: LocationRef {
                address: Some("17 Maple Avenue, Springfield, IL".into()),
                ..Default::default()
            },
            timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 22, 15, 0).unwrap(),
        }
    }

    fn anonymizer() -> Anonymizer {
        Anonymizer::new(Arc::new(sample_directory()))
    }

    #[test]
    fn scrub_replaces_identifiers_and_keeps_clinical_terms() {
        let out = scrub_text(
            "Caller Mary Jones (mary.j@example.com, 217-555-0199) lives at 9 Elm Street. Panic Disorder, feels hopeless.",
        );
        assert!(out.contains("[NAME]"));
        assert!(out.contains("[EMAIL]"));
        assert!(out.contains("[PHONE]"));
        assert!(out.contains("[ADDRESS]"));
        assert!(out.contains("Panic Disorder"));
        assert!(out.contains("hopeless"));
        assert!(!out.contains("Mary"));
        assert!(!out.contains("Jones"));
        assert!(find_pii(&out).is_empty());
    }

    #[test]
    fn hotline_gets_keywords_and_themes() {
        let raw = RawRecord::HotlineTranscript(HotlineTranscript {
            header: header("call-1"),
            age: Some(29),
            gender: Some("F".into()),
            transcript: Some("Panic again. panic and anxiety, and I feel hopeless".into()),
            duration_secs: Some(600),
            metadata: None,
        });
        let rec = anonymizer().anonymize(&raw).unwrap();
        assert_eq!(rec.location_id, "springfield-il");
        assert_eq!(rec.age_bucket, Some(AgeBucket::Adult25));
        assert_eq!(rec.day.to_string(), "2026-03-02");
        assert_eq!(rec.keywords_detected, vec!["anxiety", "panic", "hopeless"]);
        assert_eq!(
            rec.themes.as_deref(),
            Some("Themes detected: panic, anxiety, hopeless")
        );
        assert_eq!(rec.record_id.len(), 16);
        assert_ne!(rec.record_id, "call-1");
    }

    #[test]
    fn metadata_drops_identifier_keys() {
        let raw = RawRecord::CounselingSession(CounselingSession {
            header: header("s-9"),
            age: None,
            gender: None,
            session_notes: None,
            is_crisis_session: true,
            primary_concern: Some("suicidal".into()),
            metadata: Some(serde_json::json!({
                "client_name": "Tobias Vancleave",
                "session_id": "A-77",
                "modality": "video",
                "notes": { "contact_phone": "555-111-2222", "risk": "high" }
            })),
        });
        let rec = anonymizer().anonymize(&raw).unwrap();
        let md = rec.metadata.unwrap();
        assert_eq!(md, serde_json::json!({ "modality": "video", "notes": { "risk": "high" } }));
        assert!(rec.hints.crisis_flag);
        assert_eq!(rec.hints.declared_indicator, Some(Indicator::SuicidalIdeation));
        assert!(rec.text.is_none());
    }

    #[test]
    fn id_only_matches_as_a_whole_word() {
        for k in ["id", "client_id", "sessionId", "record-id", "patient.ID", "uuid"] {
            assert!(is_sensitive_key(k), "{k} should be dropped");
        }
        for k in ["provider", "guidance", "residence", "video_mode", "midweek"] {
            assert!(!is_sensitive_key(k), "{k} should be kept");
        }
        assert_eq!(key_words("followUpVisit_2"), vec!["follow", "up", "visit", "2"]);
    }

    #[test]
    fn social_batch_is_reduced_to_counts() {
        let raw = RawRecord::SocialSentimentBatch(SocialSentimentBatch {
            header: header("batch-1"),
            posts: vec![
                SocialPost { text: "so much anxiety and panic".into(), sentiment: Some(-0.6) },
                SocialPost { text: "feeling hopeless, is this a crisis".into(), sentiment: Some(-0.8) },
                SocialPost { text: "nice weather".into(), sentiment: Some(0.4) },
            ],
        });
        let rec = anonymizer().anonymize(&raw).unwrap();
        let Some(AggregateStats::Social(agg)) = rec.aggregate else {
            panic!("expected social aggregate");
        };
        assert_eq!(agg.sample_size, 3);
        assert_eq!(agg.anxiety_mentions, 1);
        assert_eq!(agg.depression_mentions, 1);
        assert_eq!(agg.crisis_mentions, 1);
        assert!((agg.mean_sentiment + 1.0 / 3.0).abs() < 1e-9);
        assert!(rec.text.is_none());
    }

    #[test]
    fn absenteeism_rates() {
        let raw = RawRecord::SchoolAbsenteeism(SchoolAbsenteeism {
            header: header("school-1"),
            students: vec![
                StudentAbsence { student_id: Some("S1".into()), days_absent: 5, days_enrolled: 20, mental_health_related: true },
                StudentAbsence { student_id: Some("S2".into()), days_absent: 0, days_enrolled: 20, mental_health_related: false },
            ],
        });
        let rec = anonymizer().anonymize(&raw).unwrap();
        let Some(AggregateStats::Absenteeism(agg)) = rec.aggregate else {
            panic!("expected absenteeism aggregate");
        };
        assert_eq!(agg.enrollment, 2);
        assert_eq!(agg.absent_count, 1);
        assert!((agg.absence_rate_pct - 12.5).abs() < 1e-9);
        assert!((agg.chronic_rate_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn malformed_records_are_validation_errors() {
        let raw = RawRecord::SocialSentimentBatch(SocialSentimentBatch {
            header: header("batch-2"),
            posts: vec![],
        });
        assert!(matches!(anonymizer().anonymize(&raw), Err(PipelineError::Validation(_))));

        let mut h = header("x");
        h.event_id = "  ".into();
        let raw = RawRecord::HotlineTranscript(HotlineTranscript {
            header: h,
            age: None,
            gender: None,
            transcript: None,
            duration_secs: None,
            metadata: None,
        });
        assert!(matches!(anonymizer().anonymize(&raw), Err(PipelineError::Validation(_))));
    }
}
