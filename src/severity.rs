// src/severity.rs
//! Severity and trend scoring for hotspot candidates.
//!
//! Severity weights absolute record density relative to the privacy floor,
//! not a population-normalized rate.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Mutex;

use crate::aggregate::TimeWindow;
use crate::indicator::Indicator;

/// Base multiplier on mean crisis score when no indicator is present.
const BASE_FACTOR: f64 = 0.85;
/// Extra multiplier at a mean indicator weight of 1.0.
const INDICATOR_FACTOR: f64 = 0.3;
/// Maximum bonus for record density above the floor.
const DENSITY_BONUS: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Trend::Increasing => "INCREASING",
            Trend::Decreasing => "DECREASING",
            Trend::Stable => "STABLE",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeverityScorer {
    /// Relative change (vs previous severity, floored at 1.0) needed to leave STABLE.
    pub hysteresis: f64,
    pub min_samples: usize,
}

impl SeverityScorer {
    pub fn new(hysteresis: f64, min_samples: usize) -> Self {
        Self {
            hysteresis: hysteresis.clamp(0.0, 1.0),
            min_samples: min_samples.max(1),
        }
    }

    /// Severity in [0, 10].
    pub fn severity(
        &self,
        mean_crisis: f64,
        indicator_freq: &BTreeMap<Indicator, usize>,
        record_count: usize,
    ) -> f64 {
        let total: usize = indicator_freq.values().sum();
        let mean_weight = if total == 0 {
            0.0
        } else {
            indicator_freq
                .iter()
                .map(|(ind, n)| ind.severity_weight() * *n as f64)
                .sum::<f64>()
                / total as f64
        };

        let floor = self.min_samples as f64;
        let density = ((record_count as f64 - floor) / floor).clamp(0.0, 1.0);

        let s = mean_crisis.max(0.0) * (BASE_FACTOR + INDICATOR_FACTOR * mean_weight)
            + DENSITY_BONUS * density;
        if s.is_finite() {
            s.clamp(0.0, 10.0)
        } else {
            0.0
        }
    }

    /// Compare against the previous window. No prior → STABLE.
    pub fn trend(&self, current: f64, previous: Option<f64>) -> Trend {
        let Some(prev) = previous else {
            return Trend::Stable;
        };
        let margin = self.hysteresis * prev.max(1.0);
        let delta = current - prev;
        if delta > margin {
            Trend::Increasing
        } else if delta < -margin {
            Trend::Decreasing
        } else {
            Trend::Stable
        }
    }
}

/// Per-hotspot severity memory across runs, keyed by window end.
///
/// `previous` answers for the window immediately before `window` (same
/// length, ending the day before it starts). Overlapping windows never
/// count as the prior.
pub trait SeverityHistory: Send + Sync {
    fn previous(&self, hotspot_id: &str, window: &TimeWindow) -> Option<f64>;
    fn record(&self, hotspot_id: &str, window: &TimeWindow, severity: f64);
}

/// Severities one hotspot scored, per window end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityTrail {
    #[serde(default)]
    pub by_window_end: BTreeMap<NaiveDate, f64>,
}

impl SeverityTrail {
    pub fn previous_for(&self, window: &TimeWindow) -> Option<f64> {
        self.by_window_end.get(&window.preceding().end).copied()
    }

    /// Store `severity` for `window` and forget ends older than its
    /// preceding window.
    pub fn record(&mut self, window: &TimeWindow, severity: f64) {
        self.by_window_end.insert(window.end, severity);
        let keep_from = window.preceding().end;
        self.by_window_end.retain(|end, _| *end >= keep_from);
    }
}

#[derive(Debug, Default)]
pub struct InMemorySeverityHistory {
    inner: Mutex<HashMap<String, SeverityTrail>>,
}

impl SeverityHistory for InMemorySeverityHistory {
    fn previous(&self, hotspot_id: &str, window: &TimeWindow) -> Option<f64> {
        let g = self.inner.lock().expect("severity history mutex poisoned");
        g.get(hotspot_id).and_then(|t| t.previous_for(window))
    }

    fn record(&self, hotspot_id: &str, window: &TimeWindow, severity: f64) {
        let mut g = self.inner.lock().expect("severity history mutex poisoned");
        g.entry(hotspot_id.to_string()).or_default().record(window, severity);
    }
}
