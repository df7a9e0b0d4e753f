// src/config/classifier.rs
use serde::{Deserialize, Serialize};
use std::env;

fn default_provider() -> String {
    "http".to_string()
}
fn default_daily_limit() -> u32 {
    500
}
fn default_timeout_secs() -> u64 {
    10
}

/// `[classifier]` section of `pipeline.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Only "http" is supported (case-insensitive).
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub endpoint: String,
    /// "ENV" means: read from CLASSIFIER_API_KEY.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            endpoint: String::new(),
            api_key: String::new(),
            daily_limit: default_daily_limit(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ClassifierConfig {
    /// Normalize provider, resolve an "ENV" key and sanitize limits.
    pub fn resolve(mut self) -> anyhow::Result<Self> {
        self.provider = self.provider.trim().to_lowercase();

        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = if self.enabled {
                env::var("CLASSIFIER_API_KEY")
                    .map_err(|_| anyhow::anyhow!("Missing CLASSIFIER_API_KEY env var"))?
            } else {
                env::var("CLASSIFIER_API_KEY").unwrap_or_default()
            };
        }

        if self.timeout_secs == 0 {
            self.timeout_secs = default_timeout_secs();
        }
        if self.enabled && self.provider != "http" {
            anyhow::bail!("Unsupported classifier provider in config: {}", self.provider);
        }
        Ok(self)
    }
}
