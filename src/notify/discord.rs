use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::{headline, Notifier};
use crate::alert::{Alert, AlertTier};

/// Discord caps embed descriptions at 4096 characters.
const MAX_DESCRIPTION: usize = 4000;

#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: String,
    client: Client,
    timeout: Duration,
    max_retries: u8,
}

impl DiscordNotifier {
    pub fn new(webhook: String) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_retries(mut self, retries: u8) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    async fn post_with_retries(&self, payload: &DiscordWebhookPayload) -> Result<()> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.webhook)
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) => match rsp.error_for_status_ref() {
                    Ok(_) => return Ok(()),
                    Err(e) => anyhow!("Discord webhook HTTP error: {e}"),
                },
                Err(e) => anyhow!("Discord webhook request failed: {e}"),
            };
            if attempt >= self.max_retries {
                return Err(err);
            }
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }
}

#[async_trait::async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let mut description = alert.message.clone();
        if !alert.actions.is_empty() {
            description.push_str("\n\n**Recommended actions:**\n");
            for (i, a) in alert.actions.iter().enumerate() {
                description.push_str(&format!("{}. {}\n", i + 1, a));
            }
        }
        let description: String = description.chars().take(MAX_DESCRIPTION).collect();

        let payload = DiscordWebhookPayload::embed(&headline(alert), &description, alert.tier);
        self.post_with_retries(&payload).await
    }
}

#[derive(Serialize)]
struct DiscordEmbed {
    title: String,
    description: String,
    color: u32,
}

#[derive(Serialize)]
struct DiscordWebhookPayload {
    content: Option<String>,
    embeds: Vec<DiscordEmbed>,
}

fn tier_color(tier: AlertTier) -> u32 {
    match tier {
        AlertTier::Critical => 0xC0392B,
        AlertTier::Severe => 0xE67E22,
        AlertTier::Warning => 0xF1C40F,
        AlertTier::Info | AlertTier::NoAlert => 0x3498DB,
    }
}

impl DiscordWebhookPayload {
    fn embed(title: &str, description: &str, tier: AlertTier) -> Self {
        Self {
            content: None,
            embeds: vec![DiscordEmbed {
                title: title.to_string(),
                description: description.to_string(),
                color: tier_color(tier),
            }],
        }
    }
}
