//! Optional model strategy: provider abstraction + in-memory cache + daily
//! budget.
//!
//! The model path is always optional. Anything that goes wrong surfaces as
//! `PipelineError::ModelUnavailable`, which the detector turns into a
//! rule-only score.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::anonymize::anon_hash;
use crate::config::classifier::ClassifierConfig;
use crate::error::PipelineError;
use crate::indicator::Indicator;

/// What a model says about one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVerdict {
    /// [0, 10]
    pub crisis_score: f64,
    /// [-1, 1]
    pub sentiment: f64,
    /// [0, 1]
    pub confidence: f64,
    /// Per-indicator probability in [0, 1].
    #[serde(default)]
    pub indicator_probs: BTreeMap<Indicator, f64>,
}

impl ModelVerdict {
    /// Clamp every field into range; non-finite values become 0.
    pub fn sanitized(mut self) -> Self {
        fn fix(v: f64, lo: f64, hi: f64) -> f64 {
            if v.is_finite() {
                v.clamp(lo, hi)
            } else {
                0.0
            }
        }
        self.crisis_score = fix(self.crisis_score, 0.0, 10.0);
        self.sentiment = fix(self.sentiment, -1.0, 1.0);
        self.confidence = fix(self.confidence, 0.0, 1.0);
        for p in self.indicator_probs.values_mut() {
            *p = fix(*p, 0.0, 1.0);
        }
        self
    }
}

#[async_trait]
pub trait ClassifierStrategy: Send + Sync {
    async fn classify(&self, text: &str) -> Result<ModelVerdict, PipelineError>;

    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;

    /// `false` for strategies that never answer; the detector skips them
    /// without logging a per-record degradation.
    fn is_enabled(&self) -> bool {
        true
    }
}

pub type DynClassifier = Arc<dyn ClassifierStrategy>;

/// Build a strategy according to config and environment variables.
///
/// * If `CLASSIFIER_TEST_MODE=mock`, returns a deterministic mock behind the budget wrapper.
/// * Else if `config.enabled == false`, returns a disabled strategy.
/// * Else builds the HTTP strategy wrapped with caching + daily limit.
pub fn build_classifier_from_config(config: &ClassifierConfig) -> DynClassifier {
    if std::env::var("CLASSIFIER_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(BudgetedClassifier::new(
            MockClassifier::neutral(),
            config.daily_limit,
        ));
    }

    if !config.enabled {
        return Arc::new(DisabledClassifier);
    }

    match config.provider.as_str() {
        "http" => match HttpClassifier::new(&config.endpoint, &config.api_key, config.timeout_secs) {
            Ok(http) => Arc::new(BudgetedClassifier::new(http, config.daily_limit)),
            Err(e) => {
                tracing::warn!(target: "signal", error = %e, "classifier client build failed; rule-based only");
                Arc::new(DisabledClassifier)
            }
        },
        other => {
            tracing::warn!(target: "signal", provider = other, "unknown classifier provider; rule-based only");
            Arc::new(DisabledClassifier)
        }
    }
}

/// Never answers; selected when the model is switched off.
pub struct DisabledClassifier;

#[async_trait]
impl ClassifierStrategy for DisabledClassifier {
    async fn classify(&self, _text: &str) -> Result<ModelVerdict, PipelineError> {
        Err(PipelineError::ModelUnavailable("classifier disabled".into()))
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
    fn is_enabled(&self) -> bool {
        false
    }
}

/// Fixed-answer strategy for tests and local runs.
#[derive(Debug, Clone)]
pub struct MockClassifier {
    pub fixed: ModelVerdict,
}

impl MockClassifier {
    pub fn neutral() -> Self {
        Self {
            fixed: ModelVerdict {
                crisis_score: 0.0,
                sentiment: 0.0,
                confidence: 0.1,
                indicator_probs: BTreeMap::new(),
            },
        }
    }
}

#[async_trait]
impl ClassifierStrategy for MockClassifier {
    async fn classify(&self, _text: &str) -> Result<ModelVerdict, PipelineError> {
        Ok(self.fixed.clone())
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Remote classifier: POST `{"text": ...}` to `endpoint`, expects a
/// `ModelVerdict` JSON body.
pub struct HttpClassifier {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpClassifier {
    pub fn new(endpoint: &str, api_key: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        if endpoint.trim().is_empty() {
            anyhow::bail!("classifier endpoint is empty");
        }
        let http = reqwest::Client::builder()
            .user_agent("mh-hotspot-sentinel/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl ClassifierStrategy for HttpClassifier {
    async fn classify(&self, text: &str) -> Result<ModelVerdict, PipelineError> {
        #[derive(Serialize)]
        struct Req<'a> {
            text: &'a str,
        }

        let mut req = self.http.post(&self.endpoint).json(&Req { text });
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| PipelineError::ModelUnavailable(format!("request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::ModelUnavailable(format!("HTTP {status}")));
        }
        let verdict: ModelVerdict = resp
            .json()
            .await
            .map_err(|e| PipelineError::ModelUnavailable(format!("bad body: {e}")))?;
        Ok(verdict.sanitized())
    }
    fn name(&self) -> &'static str {
        "http"
    }
}

#[derive(Debug, Clone)]
struct DailyCounter {
    date: NaiveDate,
    count: u32,
}

impl DailyCounter {
    fn today() -> Self {
        Self {
            date: Utc::now().date_naive(),
            count: 0,
        }
    }
}

/// Cache + daily call budget around any strategy. Cache hits do not count.
pub struct BudgetedClassifier<C: ClassifierStrategy> {
    inner: C,
    daily_limit: u32,
    cache: Mutex<HashMap<String, ModelVerdict>>,
    counter: Mutex<DailyCounter>,
}

impl<C: ClassifierStrategy> BudgetedClassifier<C> {
    pub fn new(inner: C, daily_limit: u32) -> Self {
        Self {
            inner,
            daily_limit,
            cache: Mutex::new(HashMap::new()),
            counter: Mutex::new(DailyCounter::today()),
        }
    }

    pub fn calls_today(&self) -> u32 {
        self.counter.lock().map(|g| g.count).unwrap_or(0)
    }
}

#[async_trait]
impl<C: ClassifierStrategy> ClassifierStrategy for BudgetedClassifier<C> {
    async fn classify(&self, text: &str) -> Result<ModelVerdict, PipelineError> {
        let key = anon_hash(text, 16);
        if let Some(hit) = self.cache.lock().ok().and_then(|c| c.get(&key).cloned()) {
            return Ok(hit);
        }

        {
            let mut g = self
                .counter
                .lock()
                .map_err(|_| PipelineError::ModelUnavailable("budget counter poisoned".into()))?;
            let today = Utc::now().date_naive();
            if g.date != today {
                *g = DailyCounter::today();
            }
            if g.count >= self.daily_limit {
                return Err(PipelineError::ModelUnavailable("daily limit reached".into()));
            }
            g.count = g.count.saturating_add(1);
        }

        let verdict = self.inner.classify(text).await?.sanitized();
        if let Ok(mut c) = self.cache.lock() {
            c.insert(key, verdict.clone());
        }
        Ok(verdict)
    }
    fn name(&self) -> &'static str {
        self.inner.name()
    }
    fn is_enabled(&self) -> bool {
        self.inner.is_enabled()
    }
}
