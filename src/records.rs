// src/records.rs
//! Record shapes flowing through the pipeline.
//!
//! `RawRecord` exists only on the inbound side of the anonymizer. Everything
//! downstream works on `AnonymizedRecord` / `ScoredRecord`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::PipelineError;
use crate::indicator::Indicator;

/* ----------------------------
Inbound (pre-anonymization)
---------------------------- */

/// Where a raw record happened. At least one field must be usable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationRef {
    #[serde(default)]
    pub location_id: Option<String>,
    /// Free-form postal address, e.g. "12 Elm Street, Springfield, IL".
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordHeader {
    /// Upstream event id; used only to derive the hashed record id.
    pub event_id: String,
    pub location: LocationRef,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounselingSession {
    #[serde(flatten)]
    pub header: RecordHeader,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub session_notes: Option<String>,
    #[serde(default)]
    pub is_crisis_session: bool,
    /// Counselor-declared primary concern ("anxiety", "suicidal", ...).
    #[serde(default)]
    pub primary_concern: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotlineTranscript {
    #[serde(flatten)]
    pub header: RecordHeader,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
    #[serde(default)]
    pub duration_secs: Option<u32>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialPost {
    pub text: String,
    /// Upstream sentiment in [-1, 1].
    #[serde(default)]
    pub sentiment: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialSentimentBatch {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub posts: Vec<SocialPost>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentAbsence {
    #[serde(default)]
    pub student_id: Option<String>,
    pub days_absent: u32,
    pub days_enrolled: u32,
    #[serde(default)]
    pub mental_health_related: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchoolAbsenteeism {
    #[serde(flatten)]
    pub header: RecordHeader,
    pub students: Vec<StudentAbsence>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawRecord {
    CounselingSession(CounselingSession),
    HotlineTranscript(HotlineTranscript),
    SocialSentimentBatch(SocialSentimentBatch),
    SchoolAbsenteeism(SchoolAbsenteeism),
}

impl RawRecord {
    pub fn header(&self) -> &RecordHeader {
        match self {
            RawRecord::CounselingSession(r) => &r.header,
            RawRecord::HotlineTranscript(r) => &r.header,
            RawRecord::SocialSentimentBatch(r) => &r.header,
            RawRecord::SchoolAbsenteeism(r) => &r.header,
        }
    }

    pub fn source_kind(&self) -> SourceKind {
        match self {
            RawRecord::CounselingSession(_) => SourceKind::Counseling,
            RawRecord::HotlineTranscript(_) => SourceKind::Hotline,
            RawRecord::SocialSentimentBatch(_) => SourceKind::Social,
            RawRecord::SchoolAbsenteeism(_) => SourceKind::Absenteeism,
        }
    }
}

/* ----------------------------
Anonymized side
---------------------------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Counseling,
    Hotline,
    Social,
    Absenteeism,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Counseling => "counseling",
            SourceKind::Hotline => "hotline",
            SourceKind::Social => "social",
            SourceKind::Absenteeism => "absenteeism",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgeBucket {
    #[serde(rename = "0-12")]
    Child,
    #[serde(rename = "13-17")]
    Teen,
    #[serde(rename = "18-24")]
    YoungAdult,
    #[serde(rename = "25-34")]
    Adult25,
    #[serde(rename = "35-44")]
    Adult35,
    #[serde(rename = "45-54")]
    Adult45,
    #[serde(rename = "55-64")]
    Adult55,
    #[serde(rename = "65+")]
    Senior,
}

impl AgeBucket {
    pub fn from_age(age: u32) -> Result<Self, PipelineError> {
        Ok(match age {
            0..=12 => AgeBucket::Child,
            13..=17 => AgeBucket::Teen,
            18..=24 => AgeBucket::YoungAdult,
            25..=34 => AgeBucket::Adult25,
            35..=44 => AgeBucket::Adult35,
            45..=54 => AgeBucket::Adult45,
            55..=64 => AgeBucket::Adult55,
            65..=120 => AgeBucket::Senior,
            _ => {
                return Err(PipelineError::Validation(format!(
                    "age {age} outside plausible range"
                )))
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenderGroup {
    Male,
    Female,
    Unknown,
}

impl GenderGroup {
    pub fn generalize(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()) {
            Some(s) if matches!(s.as_str(), "m" | "male" | "man") => GenderGroup::Male,
            Some(s) if matches!(s.as_str(), "f" | "female" | "woman") => GenderGroup::Female,
            _ => GenderGroup::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialAggregate {
    pub sample_size: u32,
    pub mean_sentiment: f64,
    /// Posts mentioning each clinical keyword.
    pub keyword_frequency: BTreeMap<String, u32>,
    pub anxiety_mentions: u32,
    pub depression_mentions: u32,
    pub crisis_mentions: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsenteeismAggregate {
    pub enrollment: u32,
    pub absent_count: u32,
    pub absence_rate_pct: f64,
    pub mental_health_related: u32,
    pub chronic_rate_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AggregateStats {
    Social(SocialAggregate),
    Absenteeism(AbsenteeismAggregate),
}

/// Non-textual signals that survive anonymization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceHints {
    pub crisis_flag: bool,
    pub declared_indicator: Option<Indicator>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymizedRecord {
    /// First 16 hex chars of SHA-256(source kind + upstream event id).
    pub record_id: String,
    pub source: SourceKind,
    pub location_id: String,
    pub day: NaiveDate,
    pub age_bucket: Option<AgeBucket>,
    pub gender: Option<GenderGroup>,
    pub text: Option<String>,
    #[serde(default)]
    pub keywords_detected: Vec<String>,
    #[serde(default)]
    pub themes: Option<String>,
    #[serde(default)]
    pub aggregate: Option<AggregateStats>,
    #[serde(default)]
    pub hints: SourceHints,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Which detection path produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Rules,
    Model,
    Merged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub record: AnonymizedRecord,
    /// [-1, 1]
    pub sentiment: f64,
    pub indicators: BTreeSet<Indicator>,
    /// [0, 10]
    pub crisis_score: f64,
    /// [0, 1]
    pub confidence: f64,
    pub source: ScoreSource,
}

impl ScoredRecord {
    pub fn record_id(&self) -> &str {
        &self.record.record_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_buckets_cover_boundaries() {
        assert_eq!(AgeBucket::from_age(12).unwrap(), AgeBucket::Child);
        assert_eq!(AgeBucket::from_age(13).unwrap(), AgeBucket::Teen);
        assert_eq!(AgeBucket::from_age(24).unwrap(), AgeBucket::YoungAdult);
        assert_eq!(AgeBucket::from_age(65).unwrap(), AgeBucket::Senior);
        assert!(AgeBucket::from_age(150).is_err());
    }

    #[test]
    fn gender_generalizes_to_three_groups() {
        assert_eq!(GenderGroup::generalize(Some("F")), GenderGroup::Female);
        assert_eq!(GenderGroup::generalize(Some(" male ")), GenderGroup::Male);
        assert_eq!(GenderGroup::generalize(Some("nonbinary")), GenderGroup::Unknown);
        assert_eq!(GenderGroup::generalize(None), GenderGroup::Unknown);
    }

    #[test]
    fn raw_record_parses_tagged_json() {
        let js = r#"{
            "kind": "hotline_transcript",
            "event_id": "call-77",
            "location": { "location_id": "springfield-il" },
            "timestamp": "2026-03-02T14:30:00Z",
            "age": 31,
            "transcript": "I feel hopeless"
        }"#;
        let r: RawRecord = serde_json::from_str(js).unwrap();
        assert_eq!(r.source_kind(), SourceKind::Hotline);
        assert_eq!(r.header().event_id, "call-77");
    }
}
