// src/alert/mod.rs
//! # Alert Generator
//!
//! Per-hotspot tier state machine over `NoAlert < Info < Warning < Severe < Critical`.
//!
//! - Emits on escalation, or when the re-notify interval has elapsed at an
//!   unchanged tier.
//! - De-escalation stores the lower tier and stays quiet.
//! - Tier state lives in an injected [`TierStateStore`]; writes are versioned.
//! - Delivery is someone else's problem: alerts are created `Pending` and
//!   stay that way until every channel has accepted them.

pub mod state;
pub mod templates;

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::cluster::Hotspot;
use crate::error::{PipelineError, PipelineResult};
use crate::location::LocationDirectory;
use state::{TierState, TierStateStore};

pub const CRITICAL_THRESHOLD: f64 = 8.0;
pub const SEVERE_THRESHOLD: f64 = 6.0;
pub const WARNING_THRESHOLD: f64 = 4.0;

/// Attempts at the read-decide-write cycle before giving up on a hotspot.
const CAS_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertTier {
    NoAlert,
    Info,
    Warning,
    Severe,
    Critical,
}

impl AlertTier {
    /// Exact boundaries: 8.0 is CRITICAL, 7.999 is SEVERE.
    pub fn from_severity(severity: f64) -> Self {
        if severity >= CRITICAL_THRESHOLD {
            AlertTier::Critical
        } else if severity >= SEVERE_THRESHOLD {
            AlertTier::Severe
        } else if severity >= WARNING_THRESHOLD {
            AlertTier::Warning
        } else {
            AlertTier::Info
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertTier::NoAlert => "NO_ALERT",
            AlertTier::Info => "INFO",
            AlertTier::Warning => "WARNING",
            AlertTier::Severe => "SEVERE",
            AlertTier::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for AlertTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitReason {
    Escalation,
    Renotify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Emit(EmitReason),
    /// Same tier inside the re-notify interval.
    Suppress,
    /// Lower tier: state updated, nothing sent.
    DeEscalate,
}

/// Pure transition rule.
pub fn decide(
    prev: Option<&TierState>,
    tier: AlertTier,
    now: DateTime<Utc>,
    renotify: Duration,
) -> Transition {
    let Some(prev) = prev else {
        return if tier > AlertTier::NoAlert {
            Transition::Emit(EmitReason::Escalation)
        } else {
            Transition::Suppress
        };
    };
    if tier > prev.tier {
        return Transition::Emit(EmitReason::Escalation);
    }
    if tier < prev.tier {
        return Transition::DeEscalate;
    }
    if tier == AlertTier::NoAlert {
        return Transition::Suppress;
    }
    match prev.last_alert_at {
        Some(at) if now - at < renotify => Transition::Suppress,
        _ => Transition::Emit(EmitReason::Renotify),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Delivery {
    Pending,
    Delivered { at: DateTime<Utc> },
    /// Below the notify floor; kept for the record only.
    NotRouted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub hotspot_id: String,
    pub tier: AlertTier,
    pub severity: f64,
    pub reason: EmitReason,
    pub message: String,
    pub actions: Vec<String>,
    pub recipients: Vec<String>,
    pub location_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub delivery: Delivery,
    /// Channels that already accepted this alert.
    #[serde(default)]
    pub delivered_channels: BTreeSet<String>,
}

pub struct AlertGenerator {
    states: Arc<dyn TierStateStore>,
    directory: Arc<LocationDirectory>,
    renotify: Duration,
}

impl AlertGenerator {
    pub fn new(
        states: Arc<dyn TierStateStore>,
        directory: Arc<LocationDirectory>,
        renotify_interval_secs: i64,
    ) -> Self {
        Self {
            states,
            directory,
            renotify: Duration::seconds(renotify_interval_secs.max(0)),
        }
    }

    /// Run the tier state machine for one hotspot. `Ok(None)` when nothing
    /// should be sent; `StateConflict` only after repeated lost races.
    pub fn generate_alert(
        &self,
        hotspot: &Hotspot,
        now: DateTime<Utc>,
    ) -> PipelineResult<Option<Alert>> {
        let tier = AlertTier::from_severity(hotspot.severity);
        let mut last_err = None;

        for _ in 0..CAS_ATTEMPTS {
            let prev = self.states.load(&hotspot.id);
            let expected = prev.as_ref().map(|s| s.version).unwrap_or(0);
            let transition = decide(prev.as_ref(), tier, now, self.renotify);

            let next = match transition {
                Transition::Suppress => {
                    tracing::debug!(target: "alert", hotspot = %hotspot.id, tier = %tier, "suppressed inside re-notify interval");
                    return Ok(None);
                }
                Transition::DeEscalate => TierState {
                    tier,
                    version: expected,
                    last_alert_at: prev.as_ref().and_then(|p| p.last_alert_at),
                    last_alert_tier: prev.as_ref().and_then(|p| p.last_alert_tier),
                    updated_at: now,
                },
                Transition::Emit(_) => TierState {
                    tier,
                    version: expected,
                    last_alert_at: Some(now),
                    last_alert_tier: Some(tier),
                    updated_at: now,
                },
            };

            match self.states.compare_and_set(&hotspot.id, expected, next) {
                Ok(_) => {}
                Err(e @ PipelineError::StateConflict { .. }) => {
                    tracing::debug!(target: "alert", hotspot = %hotspot.id, error = %e, "tier state moved; retrying");
                    last_err = Some(e);
                    continue;
                }
                Err(e) => return Err(e),
            }

            return Ok(match transition {
                Transition::Emit(reason) => {
                    let alert = self.build(hotspot, tier, reason, now);
                    counter!("sentinel_alerts_emitted_total", "tier" => tier.as_str()).increment(1);
                    tracing::info!(
                        target: "alert",
                        hotspot = %hotspot.id,
                        tier = %tier,
                        reason = ?reason,
                        severity = hotspot.severity,
                        "alert emitted"
                    );
                    Some(alert)
                }
                Transition::DeEscalate => {
                    tracing::info!(target: "alert", hotspot = %hotspot.id, tier = %tier, "tier lowered; no alert");
                    None
                }
                Transition::Suppress => None,
            });
        }

        Err(last_err.unwrap_or_else(|| PipelineError::StateConflict {
            hotspot_id: hotspot.id.clone(),
            expected: 0,
            found: 0,
        }))
    }

    /// Hotspot no longer detected: drop its tier to NO_ALERT so a comeback
    /// counts as an escalation again.
    pub fn retire(&self, hotspot_id: &str, now: DateTime<Utc>) -> PipelineResult<()> {
        for _ in 0..CAS_ATTEMPTS {
            let Some(prev) = self.states.load(hotspot_id) else {
                return Ok(());
            };
            if prev.tier == AlertTier::NoAlert {
                return Ok(());
            }
            let next = TierState {
                tier: AlertTier::NoAlert,
                updated_at: now,
                ..prev.clone()
            };
            match self.states.compare_and_set(hotspot_id, prev.version, next) {
                Ok(_) => return Ok(()),
                Err(PipelineError::StateConflict { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(PipelineError::StateConflict {
            hotspot_id: hotspot_id.to_string(),
            expected: 0,
            found: 0,
        })
    }

    pub fn build(
        &self,
        hotspot: &Hotspot,
        tier: AlertTier,
        reason: EmitReason,
        now: DateTime<Utc>,
    ) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            hotspot_id: hotspot.id.clone(),
            tier,
            severity: hotspot.severity,
            reason,
            message: templates::message(hotspot, tier, &self.directory),
            actions: templates::actions(hotspot, tier),
            recipients: templates::recipients(hotspot, tier, &self.directory),
            location_ids: hotspot.location_ids.clone(),
            created_at: now,
            delivery: Delivery::Pending,
            delivered_channels: BTreeSet::new(),
        }
    }
}

/// Bounded in-memory alert log; oldest entries are evicted first.
#[derive(Debug)]
pub struct AlertStore {
    inner: Mutex<Vec<Alert>>,
    cap: usize,
}

impl Default for AlertStore {
    fn default() -> Self {
        Self::with_capacity(10_000)
    }
}

impl AlertStore {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: Mutex::new(Vec::new()),
            cap: cap.max(1),
        }
    }

    pub fn push(&self, alert: Alert) {
        let mut v = self.inner.lock().expect("alert store mutex poisoned");
        v.push(alert);
        if v.len() > self.cap {
            let excess = v.len() - self.cap;
            v.drain(0..excess);
        }
    }

    pub fn set_delivery(&self, id: Uuid, delivery: Delivery) -> bool {
        self.update(id, |a| a.delivery = delivery)
    }

    /// Apply `f` to the stored alert with `id`. `false` once it was evicted.
    pub fn update(&self, id: Uuid, f: impl FnOnce(&mut Alert)) -> bool {
        let mut v = self.inner.lock().expect("alert store mutex poisoned");
        match v.iter_mut().find(|a| a.id == id) {
            Some(a) => {
                f(a);
                true
            }
            None => false,
        }
    }

    pub fn pending(&self) -> Vec<Alert> {
        self.inner
            .lock()
            .expect("alert store mutex poisoned")
            .iter()
            .filter(|a| a.delivery == Delivery::Pending)
            .cloned()
            .collect()
    }

    pub fn snapshot(&self) -> Vec<Alert> {
        self.inner.lock().expect("alert store mutex poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("alert store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_boundaries_are_exact() {
        assert_eq!(AlertTier::from_severity(8.0), AlertTier::Critical);
        assert_eq!(AlertTier::from_severity(7.999), AlertTier::Severe);
        assert_eq!(AlertTier::from_severity(6.0), AlertTier::Severe);
        assert_eq!(AlertTier::from_severity(5.999), AlertTier::Warning);
        assert_eq!(AlertTier::from_severity(4.0), AlertTier::Warning);
        assert_eq!(AlertTier::from_severity(3.999), AlertTier::Info);
        assert_eq!(AlertTier::from_severity(0.0), AlertTier::Info);
        assert_eq!(AlertTier::from_severity(10.0), AlertTier::Critical);
    }

    #[test]
    fn transitions() {
        let now = Utc::now();
        let day = Duration::seconds(86_400);
        let st = |tier, ago: i64| TierState {
            tier,
            version: 1,
            last_alert_at: Some(now - Duration::seconds(ago)),
            last_alert_tier: Some(tier),
            updated_at: now,
        };

        assert_eq!(
            decide(None, AlertTier::Warning, now, day),
            Transition::Emit(EmitReason::Escalation)
        );
        assert_eq!(
            decide(Some(&st(AlertTier::Warning, 60)), AlertTier::Critical, now, day),
            Transition::Emit(EmitReason::Escalation)
        );
        assert_eq!(
            decide(Some(&st(AlertTier::Critical, 60)), AlertTier::Critical, now, day),
            Transition::Suppress
        );
        assert_eq!(
            decide(Some(&st(AlertTier::Critical, 86_400)), AlertTier::Critical, now, day),
            Transition::Emit(EmitReason::Renotify)
        );
        assert_eq!(
            decide(Some(&st(AlertTier::Critical, 60)), AlertTier::Severe, now, day),
            Transition::DeEscalate
        );
    }

    #[test]
    fn store_keeps_pending_until_marked() {
        let store = AlertStore::with_capacity(2);
        let mk = |h: &str| Alert {
            id: Uuid::new_v4(),
            hotspot_id: h.into(),
            tier: AlertTier::Warning,
            severity: 4.5,
            reason: EmitReason::Escalation,
            message: String::new(),
            actions: vec![],
            recipients: vec![],
            location_ids: vec![],
            created_at: Utc::now(),
            delivery: Delivery::Pending,
            delivered_channels: Default::default(),
        };
        let a = mk("a");
        let id = a.id;
        store.push(a);
        store.push(mk("b"));
        assert!(store.set_delivery(id, Delivery::Delivered { at: Utc::now() }));
        assert_eq!(store.pending().len(), 1);
        store.push(mk("c"));
        assert_eq!(store.len(), 2);
        assert!(!store.set_delivery(id, Delivery::NotRouted));
    }
}
