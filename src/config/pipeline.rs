// src/config/pipeline.rs
//! `config/pipeline.toml` loader with env overrides.
//!
//! Missing file → defaults. A file that exists but does not parse is an
//! error; the binary refuses to start on a broken config.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

use super::classifier::ClassifierConfig;
use crate::alert::AlertTier;

pub const DEFAULT_PIPELINE_CONFIG_PATH: &str = "config/pipeline.toml";

pub const ENV_CONFIG_PATH: &str = "SENTINEL_CONFIG_PATH";
pub const ENV_MIN_SAMPLES: &str = "SENTINEL_MIN_SAMPLES";
pub const ENV_EPS_KM: &str = "SENTINEL_EPS_KM";
pub const ENV_DAYS_BACK: &str = "SENTINEL_DAYS_BACK";
pub const ENV_HYSTERESIS: &str = "SENTINEL_HYSTERESIS";
pub const ENV_RENOTIFY_SECS: &str = "SENTINEL_RENOTIFY_SECS";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub days_back: i64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { days_back: 7 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterAlgorithm {
    /// Weighted DBSCAN, falling back to greedy when refused.
    Density,
    Greedy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Privacy floor: minimum records behind any hotspot.
    pub min_samples: usize,
    pub eps_km: f64,
    pub algorithm: ClusterAlgorithm,
    /// Above this many locations the density pass refuses and greedy runs.
    pub max_density_points: usize,
    pub top_k_indicators: usize,
    /// People represented by one record when estimating affected population.
    pub people_per_record: u64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_samples: 5,
            eps_km: 10.0,
            algorithm: ClusterAlgorithm::Density,
            max_density_points: 5_000,
            top_k_indicators: 3,
            people_per_record: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Relative severity change needed to leave STABLE.
    pub hysteresis: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self { hysteresis: 0.15 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub renotify_interval_secs: i64,
    /// Alerts below this tier are recorded but not handed to notifiers.
    pub min_notify_tier: AlertTier,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            renotify_interval_secs: 86_400,
            min_notify_tier: AlertTier::Warning,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub disagreement_margin: f64,
    pub model_indicator_threshold: f64,
    pub lexicon_path: String,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            disagreement_margin: crate::signal::DEFAULT_DISAGREEMENT_MARGIN,
            model_indicator_threshold: crate::signal::DEFAULT_MODEL_INDICATOR_THRESHOLD,
            lexicon_path: crate::signal::lexicon::DEFAULT_LEXICON_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Concurrent anonymize+score workers.
    pub workers: usize,
    /// Directory for the tier-state file store.
    pub state_dir: String,
    pub locations_path: String,
    pub resources_path: String,
    pub max_recommendations: usize,
    /// Days a deactivated hotspot stays in the hotspot store.
    pub hotspot_retention_days: i64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            state_dir: "state".to_string(),
            locations_path: crate::location::DEFAULT_LOCATIONS_PATH.to_string(),
            resources_path: crate::resources::DEFAULT_RESOURCES_PATH.to_string(),
            max_recommendations: 5,
            hotspot_retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub window: WindowConfig,
    pub clustering: ClusteringConfig,
    pub trend: TrendConfig,
    pub alerts: AlertsConfig,
    pub signal: SignalConfig,
    pub pipeline: RunConfig,
    pub classifier: ClassifierConfig,
}

impl PipelineConfig {
    /// Load from `SENTINEL_CONFIG_PATH` or "config/pipeline.toml", then apply
    /// env overrides.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_PIPELINE_CONFIG_PATH));

        let mut cfg = match fs::read_to_string(&path) {
            Ok(content) => Self::from_toml_str(&content)
                .with_context(|| format!("parse pipeline config at {}", path.display()))?,
            Err(_) => {
                tracing::info!(target: "config", path = %path.display(), "no pipeline config; using defaults");
                Self::default()
            }
        };
        cfg.apply_env_overrides();
        cfg.sanitize();
        cfg.classifier = cfg.classifier.resolve()?;
        Ok(cfg)
    }

    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let mut cfg: PipelineConfig = toml::from_str(toml_str)?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = parse_env::<usize>(ENV_MIN_SAMPLES) {
            self.clustering.min_samples = v;
        }
        if let Some(v) = parse_env::<f64>(ENV_EPS_KM) {
            self.clustering.eps_km = v;
        }
        if let Some(v) = parse_env::<i64>(ENV_DAYS_BACK) {
            self.window.days_back = v;
        }
        if let Some(v) = parse_env::<f64>(ENV_HYSTERESIS) {
            self.trend.hysteresis = v;
        }
        if let Some(v) = parse_env::<i64>(ENV_RENOTIFY_SECS) {
            self.alerts.renotify_interval_secs = v;
        }
    }

    /// Clamp every knob into a usable range.
    pub fn sanitize(&mut self) {
        let d = PipelineConfig::default();
        self.window.days_back = self.window.days_back.clamp(1, 365);
        self.clustering.min_samples = self.clustering.min_samples.max(1);
        if !(self.clustering.eps_km.is_finite() && self.clustering.eps_km > 0.0) {
            self.clustering.eps_km = d.clustering.eps_km;
        }
        self.clustering.eps_km = self.clustering.eps_km.min(500.0);
        self.clustering.top_k_indicators = self.clustering.top_k_indicators.max(1);
        self.clustering.max_density_points = self.clustering.max_density_points.max(1);
        if !self.trend.hysteresis.is_finite() {
            self.trend.hysteresis = d.trend.hysteresis;
        }
        self.trend.hysteresis = self.trend.hysteresis.clamp(0.0, 1.0);
        self.alerts.renotify_interval_secs = self.alerts.renotify_interval_secs.max(0);
        if !self.signal.disagreement_margin.is_finite() || self.signal.disagreement_margin < 0.0 {
            self.signal.disagreement_margin = d.signal.disagreement_margin;
        }
        if !(0.0..=1.0).contains(&self.signal.model_indicator_threshold) {
            self.signal.model_indicator_threshold = d.signal.model_indicator_threshold;
        }
        self.pipeline.workers = self.pipeline.workers.clamp(1, 256);
        self.pipeline.max_recommendations = self.pipeline.max_recommendations.max(1);
        self.pipeline.hotspot_retention_days = self.pipeline.hotspot_retention_days.clamp(1, 3_650);
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(target: "config", var = name, value = %raw, "ignoring unparsable override");
            None
        }
    }
}
