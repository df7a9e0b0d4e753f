// src/alert/templates.rs
//! Tier-specific alert text, actions and recipients.

use std::fmt::Write as _;

use super::AlertTier;
use crate::cluster::Hotspot;
use crate::indicator::Indicator;
use crate::location::LocationDirectory;
use crate::severity::Trend;

const RECIPIENT_DOMAIN: &str = "sentinel.local";

fn prefix(tier: AlertTier) -> &'static str {
    match tier {
        AlertTier::Critical => "[CRITICAL]",
        AlertTier::Severe => "[SEVERE]",
        AlertTier::Warning => "[WARNING]",
        AlertTier::Info | AlertTier::NoAlert => "[INFO]",
    }
}

fn location_names(h: &Hotspot, dir: &LocationDirectory) -> String {
    let mut names: Vec<String> = Vec::with_capacity(h.location_ids.len());
    names.push(dir.display_name(&h.anchor_location));
    for id in h.location_ids.iter().filter(|id| **id != h.anchor_location) {
        names.push(dir.display_name(id));
    }
    names.join("; ")
}

pub fn message(h: &Hotspot, tier: AlertTier, dir: &LocationDirectory) -> String {
    let indicators = if h.primary_indicators.is_empty() {
        "none flagged".to_string()
    } else {
        h.primary_indicators
            .iter()
            .map(|i| i.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    let mut m = String::new();
    let _ = writeln!(m, "{} Mental health hotspot detected", prefix(tier));
    let _ = writeln!(m, "Location: {}", location_names(h, dir));
    let _ = writeln!(m, "Severity: {:.1}/10 ({})", h.severity, tier);
    let _ = writeln!(m, "Primary indicators: {indicators}");
    let _ = writeln!(m, "Affected population estimate: {}", h.affected_population);
    let _ = writeln!(m, "Trend: {}", h.trend);
    let _ = writeln!(m, "Cluster size: {} locations, {} records", h.cluster_size(), h.record_count);
    let _ = write!(m, "Average crisis score: {:.1}/10", h.mean_crisis);
    m
}

pub fn actions(h: &Hotspot, tier: AlertTier) -> Vec<String> {
    let mut out: Vec<&str> = Vec::new();
    match tier {
        AlertTier::NoAlert | AlertTier::Info => {
            out.push("Monitor trend");
        }
        AlertTier::Warning => {
            out.push("Increase mental health resource availability in affected area");
            out.push("Coordinate with local healthcare providers");
        }
        AlertTier::Severe | AlertTier::Critical => {
            out.push("Increase mental health resource availability in affected area");
            out.push("Coordinate with local healthcare providers");
            out.push("Activate crisis response team");
            out.push("Increase hotline capacity");
            out.push("Deploy mobile mental health units");
            if h.has_indicator(Indicator::Crisis) || h.has_indicator(Indicator::SuicidalIdeation) {
                out.push("Implement suicide prevention protocols");
                out.push("Coordinate with emergency services");
            }
        }
    }

    if h.has_indicator(Indicator::Anxiety) {
        out.push("Provide anxiety management resources and information");
    }
    if h.has_indicator(Indicator::Depression) {
        out.push("Increase depression screening and support services");
    }
    if h.has_indicator(Indicator::SubstanceAbuse) {
        out.push("Coordinate with substance abuse treatment centers");
    }
    if h.trend == Trend::Increasing {
        out.push("Monitor trend closely and prepare for escalation");
        out.push("Pre-position additional resources");
    }

    out.into_iter().map(String::from).collect()
}

pub fn recipients(h: &Hotspot, tier: AlertTier, dir: &LocationDirectory) -> Vec<String> {
    let mut out = vec![
        format!("mental_health_team@{RECIPIENT_DOMAIN}"),
        format!("public_health_department@{RECIPIENT_DOMAIN}"),
    ];
    if tier == AlertTier::Critical {
        out.push(format!("crisis_response_team@{RECIPIENT_DOMAIN}"));
        out.push(format!("emergency_services@{RECIPIENT_DOMAIN}"));
        out.push(format!("health_department_director@{RECIPIENT_DOMAIN}"));
    }
    if let Some(entry) = dir.get(&h.anchor_location) {
        let slug: String = entry
            .name
            .to_ascii_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_");
        out.push(format!("health_dept_{slug}@{RECIPIENT_DOMAIN}"));
    }
    out
}
