// src/indicator.rs
//! Closed mental-health indicator taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Indicator {
    Crisis,
    SuicidalIdeation,
    Anxiety,
    Depression,
    Stress,
    SubstanceAbuse,
    Ptsd,
    EatingDisorder,
}

impl Indicator {
    pub const ALL: [Indicator; 8] = [
        Indicator::Crisis,
        Indicator::SuicidalIdeation,
        Indicator::Anxiety,
        Indicator::Depression,
        Indicator::Stress,
        Indicator::SubstanceAbuse,
        Indicator::Ptsd,
        Indicator::EatingDisorder,
    ];

    /// Weight used by the severity scorer. Acute risk indicators dominate.
    pub fn severity_weight(self) -> f64 {
        match self {
            Indicator::Crisis | Indicator::SuicidalIdeation => 1.0,
            Indicator::SubstanceAbuse => 0.85,
            Indicator::Depression | Indicator::Ptsd => 0.8,
            Indicator::EatingDisorder => 0.75,
            Indicator::Anxiety => 0.6,
            Indicator::Stress => 0.5,
        }
    }

    /// Share of an indicator score that feeds the per-record crisis score.
    pub fn crisis_contribution(self) -> f64 {
        match self {
            Indicator::Crisis | Indicator::SuicidalIdeation => 1.0,
            Indicator::Depression => 0.8,
            Indicator::Anxiety | Indicator::SubstanceAbuse | Indicator::Ptsd => 0.7,
            Indicator::EatingDisorder => 0.6,
            Indicator::Stress => 0.5,
        }
    }

    /// Rule-detector flag threshold on the 0..10 indicator score.
    pub fn flag_threshold(self) -> f64 {
        match self {
            Indicator::Crisis => 3.0,
            _ => 2.0,
        }
    }

    pub fn is_acute(self) -> bool {
        matches!(self, Indicator::Crisis | Indicator::SuicidalIdeation)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Indicator::Crisis => "CRISIS",
            Indicator::SuicidalIdeation => "SUICIDAL_IDEATION",
            Indicator::Anxiety => "ANXIETY",
            Indicator::Depression => "DEPRESSION",
            Indicator::Stress => "STRESS",
            Indicator::SubstanceAbuse => "SUBSTANCE_ABUSE",
            Indicator::Ptsd => "PTSD",
            Indicator::EatingDisorder => "EATING_DISORDER",
        }
    }

    /// Lenient parse for hints coming from upstream systems ("suicidal", "self-harm", ...).
    pub fn parse_loose(s: &str) -> Option<Self> {
        let n = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match n.as_str() {
            "crisis" | "self_harm" => Some(Indicator::Crisis),
            "suicidal" | "suicidal_ideation" | "suicide" => Some(Indicator::SuicidalIdeation),
            "anxiety" | "panic" => Some(Indicator::Anxiety),
            "depression" => Some(Indicator::Depression),
            "stress" => Some(Indicator::Stress),
            "substance" | "substance_abuse" | "addiction" => Some(Indicator::SubstanceAbuse),
            "ptsd" | "trauma" => Some(Indicator::Ptsd),
            "eating" | "eating_disorder" => Some(Indicator::EatingDisorder),
            _ => None,
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suicidal_outweighs_stress() {
        assert!(Indicator::SuicidalIdeation.severity_weight() > Indicator::Stress.severity_weight());
    }

    #[test]
    fn serde_uses_screaming_case() {
        let s = serde_json::to_string(&Indicator::SuicidalIdeation).unwrap();
        assert_eq!(s, "\"SUICIDAL_IDEATION\"");
        let back: Indicator = serde_json::from_str("\"EATING_DISORDER\"").unwrap();
        assert_eq!(back, Indicator::EatingDisorder);
    }

    #[test]
    fn loose_parse_accepts_upstream_spellings() {
        assert_eq!(Indicator::parse_loose("Self-Harm"), Some(Indicator::Crisis));
        assert_eq!(Indicator::parse_loose("suicidal"), Some(Indicator::SuicidalIdeation));
        assert_eq!(Indicator::parse_loose("weather"), None);
    }
}
