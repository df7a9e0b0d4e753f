// src/resources.rs
//! # Resource Recommender
//!
//! Ranks intervention resources against a hotspot's indicator profile and
//! location, and always appends the national fallback lines.
//!
//! relevance = 0.6 · indicator overlap + 0.15 · proximity + 0.25 · availability
//!
//! - Overlap is rank-weighted over the hotspot's primary indicators
//!   (1, 1/2, 1/3, ...), normalized to [0, 1].
//! - Proximity is `1 - d / 50 km`; national lines count as 1.
//! - Availability weight outranks the whole proximity range, so an
//!   unavailable resource never sits above an available one with the same
//!   overlap.
//! - Unavailable resources rank after every other local match.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path, sync::Arc};

use crate::alert::AlertTier;
use crate::cluster::Hotspot;
use crate::indicator::Indicator;
use crate::location::{haversine_km, LocationDirectory};

pub const DEFAULT_RESOURCES_PATH: &str = "config/resources.json";

/// Local resources further than this from the hotspot centroid are ignored.
pub const LOCAL_RADIUS_KM: f64 = 50.0;

const W_OVERLAP: f64 = 0.6;
const W_PROXIMITY: f64 = 0.15;
const W_AVAILABILITY: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    CrisisHotline,
    CrisisCenter,
    EmergencyMentalHealth,
    SuicidePrevention,
    EmergencyServices,
    Counselor,
    Therapist,
    Psychiatrist,
    AnxietySupportGroup,
    DepressionSupportGroup,
    SupportGroup,
    StressManagement,
    SubstanceAbuseCenter,
    AddictionCounselor,
    DetoxCenter,
    TraumaTherapist,
    PtsdSupportGroup,
    EatingDisorderClinic,
    Nutritionist,
    InformationAndReferral,
}

impl ResourceType {
    fn is_hotline_or_crisis(self) -> bool {
        matches!(
            self,
            ResourceType::CrisisHotline | ResourceType::CrisisCenter | ResourceType::SuicidePrevention
        )
    }

    fn is_counseling(self) -> bool {
        matches!(
            self,
            ResourceType::Counselor
                | ResourceType::Therapist
                | ResourceType::AddictionCounselor
                | ResourceType::TraumaTherapist
        )
    }

    fn is_support_group(self) -> bool {
        matches!(
            self,
            ResourceType::SupportGroup
                | ResourceType::AnxietySupportGroup
                | ResourceType::DepressionSupportGroup
                | ResourceType::PtsdSupportGroup
        )
    }

    fn is_emergency(self) -> bool {
        matches!(
            self,
            ResourceType::EmergencyMentalHealth | ResourceType::EmergencyServices
        )
    }
}

/// Resource types that serve an indicator, most suitable first.
pub fn priority_types(ind: Indicator) -> &'static [ResourceType] {
    use ResourceType::*;
    match ind {
        Indicator::Crisis => &[CrisisHotline, CrisisCenter, EmergencyMentalHealth],
        Indicator::SuicidalIdeation => &[CrisisHotline, SuicidePrevention, EmergencyServices],
        Indicator::Anxiety => &[Counselor, Therapist, AnxietySupportGroup, CrisisHotline],
        Indicator::Depression => &[Counselor, Therapist, DepressionSupportGroup, Psychiatrist],
        Indicator::SubstanceAbuse => &[SubstanceAbuseCenter, AddictionCounselor, DetoxCenter],
        Indicator::Stress => &[Counselor, StressManagement, SupportGroup],
        Indicator::Ptsd => &[TraumaTherapist, PtsdSupportGroup, Psychiatrist],
        Indicator::EatingDisorder => &[EatingDisorderClinic, Nutritionist, Therapist],
    }
}

/// Service-description keywords that also count as serving an indicator.
fn service_keywords(ind: Indicator) -> &'static [&'static str] {
    match ind {
        Indicator::Crisis => &["crisis", "emergency", "hotline"],
        Indicator::SuicidalIdeation => &["crisis", "suicide"],
        Indicator::Anxiety => &["anxiety", "panic", "stress"],
        Indicator::Depression => &["depression", "mood", "mental health"],
        Indicator::SubstanceAbuse => &["substance", "addiction"],
        Indicator::Stress => &["stress"],
        Indicator::Ptsd => &["trauma", "ptsd"],
        Indicator::EatingDisorder => &["eating"],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Waitlist,
    #[default]
    Unknown,
    Unavailable,
}

impl Availability {
    pub fn weight(self) -> f64 {
        match self {
            Availability::Available => 1.0,
            Availability::Waitlist => 0.6,
            Availability::Unknown => 0.5,
            Availability::Unavailable => 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub resource_type: ResourceType,
    /// Directory id; `None` for national services.
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub availability: Availability,
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub contact: Option<String>,
}

impl Resource {
    /// Indicators from `wanted` this resource serves, in the given order.
    pub fn serves(&self, wanted: &[Indicator]) -> Vec<Indicator> {
        let services = self.services.join(" ").to_ascii_lowercase();
        wanted
            .iter()
            .copied()
            .filter(|ind| {
                priority_types(*ind).contains(&self.resource_type)
                    || service_keywords(*ind).iter().any(|kw| services.contains(kw))
            })
            .collect()
    }
}

/// 988 Lifeline, Crisis Text Line, SAMHSA helpline.
pub fn national_resources() -> Vec<Resource> {
    vec![
        Resource {
            id: "national-988-lifeline".into(),
            name: "988 Suicide & Crisis Lifeline".into(),
            resource_type: ResourceType::CrisisHotline,
            location_id: None,
            services: vec![
                "Crisis support".into(),
                "Suicide prevention".into(),
                "Mental health support".into(),
            ],
            availability: Availability::Available,
            capacity: None,
            contact: Some("988".into()),
        },
        Resource {
            id: "national-crisis-text-line".into(),
            name: "Crisis Text Line".into(),
            resource_type: ResourceType::CrisisHotline,
            location_id: None,
            services: vec!["Crisis support via text".into(), "Mental health support".into()],
            availability: Availability::Available,
            capacity: None,
            contact: Some("Text HOME to 741741".into()),
        },
        Resource {
            id: "national-samhsa-helpline".into(),
            name: "SAMHSA National Helpline".into(),
            resource_type: ResourceType::InformationAndReferral,
            location_id: None,
            services: vec![
                "Substance abuse support".into(),
                "Mental health referrals".into(),
                "Treatment locator".into(),
            ],
            availability: Availability::Available,
            capacity: None,
            contact: Some("1-800-662-4357".into()),
        },
    ]
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    resources: Vec<Resource>,
}

/// Local resource registry. National lines are not stored here.
#[derive(Debug, Clone, Default)]
pub struct ResourceRegistry {
    resources: Vec<Resource>,
}

impl ResourceRegistry {
    pub fn new(resources: Vec<Resource>) -> Self {
        Self { resources }
    }

    /// Load from JSON; empty registry on error (national lines still apply).
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(s) => match serde_json::from_str::<RegistryFile>(&s) {
                Ok(f) => Self::new(f.resources),
                Err(e) => {
                    tracing::warn!(target: "config", path = %path.display(), error = %e, "resource registry invalid; using national lines only");
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!(target: "config", path = %path.display(), "no resource registry; using national lines only");
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecommendation {
    pub resource_id: String,
    pub name: String,
    pub resource_type: ResourceType,
    pub relevance: f64,
    pub distance_km: Option<f64>,
    pub availability: Availability,
    pub matched_indicators: Vec<Indicator>,
    pub actions: Vec<String>,
    pub contact: Option<String>,
    pub national: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub hotspot_id: String,
    pub severity: f64,
    pub tier: AlertTier,
    pub immediate_actions: Vec<String>,
    pub resources: Vec<ResourceRecommendation>,
    pub national_resources: Vec<ResourceRecommendation>,
    pub monitoring_actions: Vec<String>,
    pub prevention_actions: Vec<String>,
}

/// Rank-weighted share of `primary` covered by `matched`.
fn overlap(primary: &[Indicator], matched: &[Indicator]) -> f64 {
    let total: f64 = (0..primary.len()).map(|r| 1.0 / (r as f64 + 1.0)).sum();
    if total == 0.0 {
        return 0.0;
    }
    let hit: f64 = primary
        .iter()
        .enumerate()
        .filter(|(_, ind)| matched.contains(ind))
        .map(|(r, _)| 1.0 / (r as f64 + 1.0))
        .sum();
    hit / total
}

fn resource_actions(r: &Resource) -> Vec<String> {
    let mut out = Vec::new();
    if r.resource_type.is_hotline_or_crisis() {
        out.push(format!("Promote {} in affected area", r.name));
        out.push("Distribute hotline number through public health channels".to_string());
    }
    if r.resource_type.is_counseling() {
        out.push(format!("Refer individuals to {}", r.name));
        out.push("Coordinate appointment scheduling".to_string());
    }
    if r.resource_type.is_support_group() {
        out.push("Organize support group meetings in affected area".to_string());
        out.push("Provide transportation assistance if needed".to_string());
    }
    if r.resource_type.is_emergency() {
        out.push("Pre-position emergency mental health services".to_string());
        out.push("Coordinate with emergency response teams".to_string());
    }
    if let Some(cap) = r.capacity {
        out.push(format!("Monitor capacity: {cap} available slots"));
    }
    out
}

fn rank(recs: &mut [ResourceRecommendation]) {
    recs.sort_by(|a, b| {
        let a_out = a.availability == Availability::Unavailable;
        let b_out = b.availability == Availability::Unavailable;
        a_out
            .cmp(&b_out)
            .then_with(|| b.relevance.total_cmp(&a.relevance))
            .then_with(|| b.availability.weight().total_cmp(&a.availability.weight()))
            .then_with(|| {
                let da = a.distance_km.unwrap_or(f64::INFINITY);
                let db = b.distance_km.unwrap_or(f64::INFINITY);
                da.total_cmp(&db)
            })
            .then_with(|| a.resource_id.cmp(&b.resource_id))
    });
}

pub struct ResourceRecommender {
    registry: Arc<ResourceRegistry>,
    directory: Arc<LocationDirectory>,
    national: Vec<Resource>,
}

impl ResourceRecommender {
    pub fn new(registry: Arc<ResourceRegistry>, directory: Arc<LocationDirectory>) -> Self {
        Self {
            registry,
            directory,
            national: national_resources(),
        }
    }

    fn score(&self, r: &Resource, h: &Hotspot) -> Option<ResourceRecommendation> {
        let matched = r.serves(&h.primary_indicators);
        let (distance_km, proximity, national) = match &r.location_id {
            None => (None, 1.0, true),
            Some(loc) => {
                let c = self.directory.centroid(loc)?;
                let d = haversine_km(h.centroid, c);
                if d > LOCAL_RADIUS_KM {
                    return None;
                }
                (Some(d), (1.0 - d / LOCAL_RADIUS_KM).clamp(0.0, 1.0), false)
            }
        };
        if !national && matched.is_empty() {
            return None;
        }
        let relevance = (W_OVERLAP * overlap(&h.primary_indicators, &matched)
            + W_PROXIMITY * proximity
            + W_AVAILABILITY * r.availability.weight())
        .clamp(0.0, 1.0);

        Some(ResourceRecommendation {
            resource_id: r.id.clone(),
            name: r.name.clone(),
            resource_type: r.resource_type,
            relevance,
            distance_km,
            availability: r.availability,
            matched_indicators: matched,
            actions: resource_actions(r),
            contact: r.contact.clone(),
            national,
        })
    }

    /// Top `max_n` local matches, then every national line.
    pub fn recommend_resources(&self, h: &Hotspot, max_n: usize) -> Vec<ResourceRecommendation> {
        let mut local: Vec<_> = self.registry.iter().filter_map(|r| self.score(r, h)).collect();
        rank(&mut local);
        local.truncate(max_n);

        let mut national: Vec<_> = self.national.iter().filter_map(|r| self.score(r, h)).collect();
        rank(&mut national);

        tracing::debug!(
            target: "resources",
            hotspot = %h.id,
            local = local.len(),
            national = national.len(),
            "resources ranked"
        );
        local.extend(national);
        local
    }

    pub fn action_plan(&self, h: &Hotspot, max_n: usize) -> ActionPlan {
        let (national_resources, resources): (Vec<_>, Vec<_>) = self
            .recommend_resources(h, max_n)
            .into_iter()
            .partition(|r| r.national);

        let mut immediate: Vec<&str> = match h.tier {
            AlertTier::Critical => vec![
                "Activate crisis response team immediately",
                "Deploy mobile mental health units",
                "Increase hotline staffing",
                "Coordinate with emergency services",
            ],
            AlertTier::Severe => vec![
                "Mobilize mental health resources",
                "Increase counseling availability",
                "Distribute crisis support information",
            ],
            _ => Vec::new(),
        };
        if h.has_indicator(Indicator::Crisis) || h.has_indicator(Indicator::SuicidalIdeation) {
            immediate.push("Implement suicide prevention protocols");
        }

        ActionPlan {
            hotspot_id: h.id.clone(),
            severity: h.severity,
            tier: h.tier,
            immediate_actions: immediate.into_iter().map(String::from).collect(),
            resources,
            national_resources,
            monitoring_actions: [
                "Monitor hotspot trend daily",
                "Track resource utilization",
                "Review alert effectiveness",
                "Collect feedback from providers",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            prevention_actions: [
                "Provide mental health education resources",
                "Promote community support programs",
                "Increase awareness of available resources",
                "Coordinate with schools and workplaces",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}
