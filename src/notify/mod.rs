// src/notify/mod.rs
//! Outbound alert delivery channels.
//!
//! Each channel is optional and configured from env. The mux fans one alert
//! out to every configured channel that has not accepted it yet; channels
//! that fail are tried again on the next retry, the others are not.

pub mod discord;
pub mod email;
pub mod slack;

use async_trait::async_trait;
use metrics::counter;
use std::collections::BTreeSet;

use crate::alert::Alert;
use crate::error::PipelineError;

pub use discord::DiscordNotifier;
pub use email::EmailSender;
pub use slack::SlackNotifier;

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, alert: &Alert) -> anyhow::Result<()>;
}

/// Short one-line headline shared by the chat channels.
pub fn headline(alert: &Alert) -> String {
    format!(
        "{} mental health hotspot {} (severity {:.1}/10)",
        alert.tier, alert.hotspot_id, alert.severity
    )
}

#[derive(Default)]
pub struct NotifierMux {
    channels: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    /// Slack if `SLACK_WEBHOOK_URL`, Discord if `DISCORD_WEBHOOK_URL`,
    /// e-mail if `SMTP_HOST` is set and the rest of the SMTP env is valid.
    pub fn from_env() -> Self {
        let mut channels: Vec<Box<dyn Notifier>> = Vec::new();

        if let Some(slack) = SlackNotifier::from_env() {
            channels.push(Box::new(slack));
        }
        if let Ok(url) = std::env::var("DISCORD_WEBHOOK_URL") {
            if !url.trim().is_empty() {
                channels.push(Box::new(DiscordNotifier::new(url)));
            }
        }
        if std::env::var("SMTP_HOST").is_ok() {
            match EmailSender::from_env() {
                Ok(mail) => channels.push(Box::new(mail)),
                Err(e) => tracing::warn!(target: "notify", error = %format!("{e:#}"), "e-mail channel disabled"),
            }
        }

        let names: Vec<&str> = channels.iter().map(|c| c.name()).collect();
        tracing::info!(target: "notify", channels = ?names, "notifier channels configured");
        Self { channels }
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Every channel has accepted this alert.
    pub fn all_accepted(&self, delivered: &BTreeSet<String>) -> bool {
        !self.channels.is_empty() && self.channels.iter().all(|c| delivered.contains(c.name()))
    }

    /// Send to each channel not already in `alert.delivered_channels`.
    pub async fn deliver(&self, alert: &Alert) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for ch in &self.channels {
            if alert.delivered_channels.contains(ch.name()) {
                continue;
            }
            match ch.send(alert).await {
                Ok(()) => {
                    tracing::debug!(target: "notify", channel = ch.name(), alert = %alert.id, "delivered");
                    report.accepted.push(ch.name().to_string());
                }
                Err(e) => {
                    counter!("sentinel_alert_delivery_failures_total", "channel" => ch.name())
                        .increment(1);
                    tracing::warn!(
                        target: "notify",
                        channel = ch.name(),
                        alert = %alert.id,
                        error = %format!("{e:#}"),
                        "delivery failed"
                    );
                    report.failed.push(ch.name().to_string());
                }
            }
        }
        report
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub accepted: Vec<String>,
    pub failed: Vec<String>,
}

impl DeliveryReport {
    pub fn into_result(self) -> Result<Vec<String>, PipelineError> {
        if self.failed.is_empty() {
            Ok(self.accepted)
        } else {
            Err(PipelineError::AlertDelivery(format!(
                "channels failed: {}",
                self.failed.join(", ")
            )))
        }
    }
}
