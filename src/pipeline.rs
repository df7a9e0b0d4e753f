// src/pipeline.rs
//! # Batch pipeline
//!
//! One run over a trailing window:
//!
//! 1. anonymize + score every raw record in parallel (bounded workers),
//!    upserting results into the event store;
//! 2. barrier: all workers joined;
//! 3. aggregate + cluster + score the window;
//! 4. hotspot lifecycle, tier state machine, notification;
//! 5. resource action plans;
//! 6. retention: events older than the preceding window and long-inactive
//!    hotspots are dropped.
//!
//! A run aborted before step 3 leaves only idempotent event-store writes
//! behind. Tier state is touched in step 4 only.

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::aggregate::TimeWindow;
use crate::alert::state::{InMemoryTierStateStore, JsonFileStateStore, TierStateStore};
use crate::alert::{Alert, AlertGenerator, AlertStore, AlertTier, Delivery};
use crate::anonymize::Anonymizer;
use crate::audit::{AuditEntry, AuditSink, InMemoryAuditLog};
use crate::cluster::{ClusterParams, Hotspot, HotspotDetector};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::location::LocationDirectory;
use crate::metrics::ensure_metrics_described;
use crate::notify::NotifierMux;
use crate::records::{RawRecord, ScoredRecord};
use crate::resources::{ActionPlan, ResourceRecommender, ResourceRegistry};
use crate::severity::{InMemorySeverityHistory, SeverityHistory};
use crate::signal::classifier::{build_classifier_from_config, DynClassifier};
use crate::signal::lexicon::HotReloadLexicon;
use crate::signal::{MergePolicy, SignalDetector};
use crate::store::{EventStore, HotspotStore};

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub window: Option<TimeWindow>,
    pub received: usize,
    pub stored: usize,
    pub duplicates: usize,
    pub validation_errors: usize,
    pub anonymization_violations: usize,
    pub hotspots: Vec<Hotspot>,
    pub deactivated: Vec<String>,
    pub alerts: Vec<Alert>,
    pub plans: Vec<ActionPlan>,
}

enum Outcome {
    Stored,
    Duplicate,
    Invalid,
    Violation,
}

pub struct PipelineBuilder {
    cfg: PipelineConfig,
    directory: Option<Arc<LocationDirectory>>,
    registry: Option<Arc<ResourceRegistry>>,
    lexicon_path: Option<PathBuf>,
    classifier: Option<DynClassifier>,
    states: Option<Arc<dyn TierStateStore>>,
    history: Option<Arc<dyn SeverityHistory>>,
    audit: Option<Arc<dyn AuditSink>>,
    notifier: Option<NotifierMux>,
}

impl PipelineBuilder {
    pub fn directory(mut self, d: Arc<LocationDirectory>) -> Self {
        self.directory = Some(d);
        self
    }

    pub fn registry(mut self, r: Arc<ResourceRegistry>) -> Self {
        self.registry = Some(r);
        self
    }

    pub fn lexicon_path(mut self, p: PathBuf) -> Self {
        self.lexicon_path = Some(p);
        self
    }

    pub fn classifier(mut self, c: DynClassifier) -> Self {
        self.classifier = Some(c);
        self
    }

    pub fn states(mut self, s: Arc<dyn TierStateStore>) -> Self {
        self.states = Some(s);
        self
    }

    pub fn history(mut self, h: Arc<dyn SeverityHistory>) -> Self {
        self.history = Some(h);
        self
    }

    pub fn audit(mut self, a: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(a);
        self
    }

    pub fn notifier(mut self, n: NotifierMux) -> Self {
        self.notifier = Some(n);
        self
    }

    /// Anything not supplied gets an in-memory or empty default; no model.
    pub fn build(self) -> Pipeline {
        let cfg = self.cfg;
        let directory = self.directory.unwrap_or_default();
        let registry = self.registry.unwrap_or_default();
        let lexicon_path = self
            .lexicon_path
            .unwrap_or_else(|| PathBuf::from(&cfg.signal.lexicon_path));

        let states = self
            .states
            .unwrap_or_else(|| Arc::new(InMemoryTierStateStore::default()));
        let history = self
            .history
            .unwrap_or_else(|| Arc::new(InMemorySeverityHistory::default()));

        Pipeline {
            anonymizer: Anonymizer::new(directory.clone()),
            lexicon: HotReloadLexicon::new(Some(lexicon_path.as_path())),
            classifier: self.classifier,
            policy: MergePolicy {
                disagreement_margin: cfg.signal.disagreement_margin,
                model_indicator_threshold: cfg.signal.model_indicator_threshold,
            },
            hotspot_detector: HotspotDetector::new(
                directory.clone(),
                ClusterParams::from(&cfg.clustering),
                cfg.trend.hysteresis,
            ),
            alerts: AlertGenerator::new(states, directory.clone(), cfg.alerts.renotify_interval_secs),
            recommender: ResourceRecommender::new(registry, directory),
            events: Arc::new(EventStore::default()),
            hotspot_store: HotspotStore::default(),
            alert_store: AlertStore::default(),
            history,
            audit: self
                .audit
                .unwrap_or_else(|| Arc::new(InMemoryAuditLog::default())),
            notifier: self.notifier.unwrap_or_default(),
            cfg,
        }
    }
}

pub struct Pipeline {
    cfg: PipelineConfig,
    anonymizer: Anonymizer,
    lexicon: HotReloadLexicon,
    classifier: Option<DynClassifier>,
    policy: MergePolicy,
    hotspot_detector: HotspotDetector,
    alerts: AlertGenerator,
    recommender: ResourceRecommender,
    events: Arc<EventStore>,
    hotspot_store: HotspotStore,
    alert_store: AlertStore,
    history: Arc<dyn SeverityHistory>,
    audit: Arc<dyn AuditSink>,
    notifier: NotifierMux,
}

impl Pipeline {
    pub fn builder(cfg: PipelineConfig) -> PipelineBuilder {
        PipelineBuilder {
            cfg,
            directory: None,
            registry: None,
            lexicon_path: None,
            classifier: None,
            states: None,
            history: None,
            audit: None,
            notifier: None,
        }
    }

    /// Production wiring: data files and state directory from config,
    /// classifier per `[classifier]`, notifiers from env.
    pub fn from_config(cfg: PipelineConfig) -> anyhow::Result<Self> {
        let directory = Arc::new(LocationDirectory::load_from_file(&cfg.pipeline.locations_path));
        if directory.is_empty() {
            tracing::warn!(target: "pipeline", path = %cfg.pipeline.locations_path, "location directory is empty; every record will fail location checks");
        }
        let registry = Arc::new(ResourceRegistry::load_from_file(&cfg.pipeline.resources_path));
        let file_state = Arc::new(JsonFileStateStore::open(&cfg.pipeline.state_dir)?);
        let classifier = build_classifier_from_config(&cfg.classifier);

        Ok(Self::builder(cfg)
            .directory(directory)
            .registry(registry)
            .classifier(classifier)
            .states(file_state.clone())
            .history(file_state)
            .notifier(NotifierMux::from_env())
            .build())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub fn events(&self) -> &EventStore {
        &self.events
    }

    pub fn hotspot_store(&self) -> &HotspotStore {
        &self.hotspot_store
    }

    pub fn alert_store(&self) -> &AlertStore {
        &self.alert_store
    }

    fn signal_detector(&self) -> SignalDetector {
        let lexicon = self.lexicon.current();
        match &self.classifier {
            Some(model) => SignalDetector::with_model(lexicon, model.clone(), self.policy),
            None => SignalDetector::rules_only(lexicon),
        }
    }

    /// Anonymize and score `raws` into the event store. Returns per-record
    /// outcome counts in a partial report.
    pub async fn ingest(&self, raws: Vec<RawRecord>) -> RunReport {
        ensure_metrics_described();
        let mut report = RunReport {
            received: raws.len(),
            ..RunReport::default()
        };
        counter!("sentinel_records_total").increment(raws.len() as u64);

        let detector = self.signal_detector();
        let permits = Arc::new(Semaphore::new(self.cfg.pipeline.workers.max(1)));
        let mut set: JoinSet<Outcome> = JoinSet::new();

        for raw in raws {
            let permits = permits.clone();
            let anonymizer = self.anonymizer.clone();
            let detector = detector.clone();
            let events = self.events.clone();
            let audit = self.audit.clone();

            set.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return Outcome::Invalid;
                };
                match anonymizer.anonymize(&raw) {
                    Ok(rec) => {
                        let scored: ScoredRecord = detector.score(rec).await;
                        if events.upsert(scored) {
                            Outcome::Stored
                        } else {
                            Outcome::Duplicate
                        }
                    }
                    Err(PipelineError::AnonymizationViolation { record_id, patterns }) => {
                        audit.flag(AuditEntry {
                            record_id,
                            source: raw.source_kind(),
                            patterns: patterns.iter().map(|p| p.to_string()).collect(),
                            at: Utc::now(),
                        });
                        Outcome::Violation
                    }
                    Err(e) => {
                        tracing::warn!(
                            target: "pipeline",
                            kind = e.kind(),
                            source = raw.source_kind().as_str(),
                            error = %e,
                            "record skipped"
                        );
                        counter!("sentinel_validation_errors_total").increment(1);
                        Outcome::Invalid
                    }
                }
            });
        }

        // Barrier: nothing downstream starts until every record is settled.
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Outcome::Stored) => report.stored += 1,
                Ok(Outcome::Duplicate) => report.duplicates += 1,
                Ok(Outcome::Invalid) => report.validation_errors += 1,
                Ok(Outcome::Violation) => report.anonymization_violations += 1,
                Err(e) => {
                    tracing::warn!(target: "pipeline", error = %e, "worker task failed");
                    report.validation_errors += 1;
                }
            }
        }
        report
    }

    /// Full run: ingest `raws`, then detect, alert and plan over the window
    /// ending at `now`.
    pub async fn run(&self, raws: Vec<RawRecord>, now: DateTime<Utc>) -> RunReport {
        let started = Instant::now();
        let mut report = self.ingest(raws).await;

        let window = TimeWindow::trailing(now, self.cfg.window.days_back);
        let records = self.events.in_window(&window);
        let known = self.hotspot_store.active();
        let hotspots = self.hotspot_detector.detect(
            &records,
            &window,
            Some(self.history.as_ref()),
            &known,
            now,
        );

        for h in &hotspots {
            self.history.record(&h.id, &window, h.severity);
        }

        let deactivated = self.hotspot_store.refresh(&hotspots, now);
        for id in &deactivated {
            if let Err(e) = self.alerts.retire(id, now) {
                tracing::warn!(target: "alert", hotspot = %id, error = %e, "could not reset tier state");
            }
        }
        gauge!("sentinel_hotspots_active").set(hotspots.len() as f64);

        let mut alerts = Vec::new();
        for h in &hotspots {
            match self.alerts.generate_alert(h, now) {
                Ok(Some(alert)) => alerts.push(self.dispatch(alert).await),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(target: "alert", hotspot = %h.id, kind = e.kind(), error = %e, "tier update skipped");
                }
            }
        }

        let max_n = self.cfg.pipeline.max_recommendations;
        let plans: Vec<ActionPlan> = hotspots
            .iter()
            .map(|h| self.recommender.action_plan(h, max_n))
            .collect();

        trace_plans(&plans);

        let pruned = self.events.prune_before(window.preceding().start);
        let forgotten = self
            .hotspot_store
            .prune_inactive(now - Duration::days(self.cfg.pipeline.hotspot_retention_days));
        if pruned > 0 || forgotten > 0 {
            tracing::debug!(target: "pipeline", events = pruned, hotspots = forgotten, "retention applied");
        }

        let elapsed = started.elapsed().as_millis() as f64;
        histogram!("sentinel_run_ms").record(elapsed);
        tracing::info!(
            target: "pipeline",
            received = report.received,
            stored = report.stored,
            skipped = report.validation_errors,
            violations = report.anonymization_violations,
            hotspots = hotspots.len(),
            alerts = alerts.len(),
            ms = elapsed,
            "run complete"
        );

        report.window = Some(window);
        report.hotspots = hotspots;
        report.deactivated = deactivated;
        report.alerts = alerts;
        report.plans = plans;
        report
    }

    /// Hand the alert to notifiers when it clears the notify floor, record the
    /// outcome and keep it in the alert store either way.
    async fn dispatch(&self, mut alert: Alert) -> Alert {
        if alert.tier < self.cfg.alerts.min_notify_tier.max(AlertTier::Info) {
            alert.delivery = Delivery::NotRouted;
        } else if self.notifier.is_empty() {
            tracing::debug!(target: "notify", alert = %alert.id, "no channels configured; alert left pending");
        } else {
            self.send(&mut alert).await;
        }
        self.alert_store.push(alert.clone());
        alert
    }

    /// One fan-out over the channels that have not accepted `alert` yet.
    /// Returns true once every channel has it.
    async fn send(&self, alert: &mut Alert) -> bool {
        let outcome = self.notifier.deliver(alert).await;
        alert.delivered_channels.extend(outcome.accepted.iter().cloned());
        if let Err(e) = outcome.into_result() {
            tracing::warn!(target: "notify", alert = %alert.id, error = %e, "alert left pending");
        }
        if self.notifier.all_accepted(&alert.delivered_channels) {
            alert.delivery = Delivery::Delivered { at: Utc::now() };
            true
        } else {
            false
        }
    }

    /// Retry pending alerts on the channels that have not accepted them.
    /// Returns how many became fully delivered.
    pub async fn retry_pending(&self) -> usize {
        if self.notifier.is_empty() {
            return 0;
        }
        let mut sent = 0;
        for mut alert in self.alert_store.pending() {
            let done = self.send(&mut alert).await;
            let channels = alert.delivered_channels.clone();
            let delivery = alert.delivery.clone();
            self.alert_store.update(alert.id, |a| {
                a.delivered_channels = channels;
                a.delivery = delivery;
            });
            if done {
                sent += 1;
            }
        }
        sent
    }
}

#[cfg(feature = "debug")]
fn trace_plans(plans: &[ActionPlan]) {
    for plan in plans {
        if let Ok(json) = serde_json::to_string(plan) {
            tracing::debug!(target: "pipeline", plan = %json, "action plan");
        }
    }
}

#[cfg(not(feature = "debug"))]
fn trace_plans(_plans: &[ActionPlan]) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::EmitReason;
    use uuid::Uuid;

    fn alert(tier: AlertTier) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            hotspot_id: "hs-test".into(),
            tier,
            severity: 2.5,
            reason: EmitReason::Escalation,
            message: String::new(),
            actions: vec![],
            recipients: vec![],
            location_ids: vec!["springfield-il".into()],
            created_at: Utc::now(),
            delivery: Delivery::Pending,
            delivered_channels: Default::default(),
        }
    }

    #[tokio::test]
    async fn below_notify_floor_is_recorded_not_routed() {
        let p = Pipeline::builder(PipelineConfig::default()).build();
        let out = p.dispatch(alert(AlertTier::Info)).await;
        assert_eq!(out.delivery, Delivery::NotRouted);
        assert_eq!(p.alert_store().len(), 1);
        assert!(p.alert_store().pending().is_empty());

        let routed = p.dispatch(alert(AlertTier::Warning)).await;
        assert_eq!(routed.delivery, Delivery::Pending);
        assert_eq!(p.alert_store().pending().len(), 1);
    }

    #[tokio::test]
    async fn old_events_are_pruned_after_a_run() {
        use crate::location::{GeoPoint, LocationDirectory, LocationEntry};
        use crate::records::{CounselingSession, LocationRef, RecordHeader};
        use chrono::TimeZone;

        let dir = Arc::new(LocationDirectory::new([LocationEntry {
            id: "decatur-il".into(),
            name: "Decatur".into(),
            region: "IL".into(),
            centroid: GeoPoint::new(39.8403, -88.9548),
            population: 70_000,
        }]));
        let p = Pipeline::builder(PipelineConfig::default()).directory(dir).build();
        let session = |id: &str, day: u32| {
            RawRecord::CounselingSession(CounselingSession {
                header: RecordHeader {
                    event_id: id.into(),
                    location: LocationRef {
                        location_id: Some("decatur-il".into()),
                        ..Default::default()
                    },
                    timestamp: Utc.with_ymd_and_hms(2026, 3, day, 9, 0, 0).unwrap(),
                },
                age: None,
                gender: None,
                session_notes: Some("feeling stressed".into()),
                is_crisis_session: false,
                primary_concern: None,
                metadata: None,
            })
        };

        // Window [03-14..03-20], preceding window starts 03-07.
        let report = p
            .run(
                vec![session("old", 1), session("prior", 10), session("now", 18)],
                Utc.with_ymd_and_hms(2026, 3, 20, 12, 0, 0).unwrap(),
            )
            .await;
        assert_eq!(report.stored, 3);
        assert_eq!(p.events().len(), 2);
    }

    #[tokio::test]
    async fn empty_batch_is_a_quiet_run() {
        let p = Pipeline::builder(PipelineConfig::default()).build();
        let report = p.run(Vec::new(), Utc::now()).await;
        assert_eq!(report.received, 0);
        assert!(report.hotspots.is_empty());
        assert!(report.alerts.is_empty());
        assert!(report.window.is_some());
    }
}
