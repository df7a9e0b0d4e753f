//! hotspot-sentinel: batch runner.
//!
//! Reads raw records from the inbox directory, runs the pipeline over the
//! trailing window and logs the outcome. `--once` runs a single pass;
//! otherwise it ticks every `SENTINEL_INTERVAL_SECS` (default 3600).

use anyhow::Context;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::time;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mh_hotspot_sentinel::config::PipelineConfig;
use mh_hotspot_sentinel::inbox::{drain_dir, DEFAULT_INBOX_DIR, ENV_INBOX_DIR};
use mh_hotspot_sentinel::metrics::install_from_env;
use mh_hotspot_sentinel::pipeline::Pipeline;

const ENV_INTERVAL_SECS: &str = "SENTINEL_INTERVAL_SECS";
const ENV_LOG_JSON: &str = "SENTINEL_LOG_JSON";

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var(ENV_LOG_JSON).ok().is_some_and(|v| v == "1");
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init();
    }
}

async fn tick(pipeline: &Pipeline, inbox: &Path) -> anyhow::Result<()> {
    let batch = drain_dir(inbox).await?;
    if batch.malformed > 0 {
        tracing::warn!(target: "pipeline", malformed = batch.malformed, "inbox lines skipped");
    }
    let report = pipeline.run(batch.records, Utc::now()).await;

    for h in &report.hotspots {
        tracing::info!(
            target: "pipeline",
            hotspot = %h.id,
            tier = %h.tier,
            severity = h.severity,
            trend = %h.trend,
            locations = h.location_ids.len(),
            "active hotspot"
        );
    }
    let retried = pipeline.retry_pending().await;
    if retried > 0 {
        tracing::info!(target: "notify", retried, "pending alerts delivered");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = PipelineConfig::load().context("load pipeline config")?;
    install_from_env()?;

    let once = std::env::args().any(|a| a == "--once");
    let inbox = std::env::var(ENV_INBOX_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_INBOX_DIR));

    let pipeline = Pipeline::from_config(cfg).context("build pipeline")?;

    if once {
        return tick(&pipeline, &inbox).await;
    }

    let interval_secs: u64 = std::env::var(ENV_INTERVAL_SECS)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3_600)
        .max(1);
    let mut ticker = time::interval(time::Duration::from_secs(interval_secs));
    tracing::info!(target: "pipeline", interval_secs, inbox = %inbox.display(), "scheduler started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = tick(&pipeline, &inbox).await {
                    tracing::warn!(target: "pipeline", error = %format!("{e:#}"), "run failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!(target: "pipeline", "shutdown requested");
                return Ok(());
            }
        }
    }
}
