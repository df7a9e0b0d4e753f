// src/metrics.rs
//! Metric descriptions and Prometheus exporter wiring.

use anyhow::Context;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::net::SocketAddr;

pub const ENV_METRICS_ADDR: &str = "SENTINEL_METRICS_ADDR";

/// One-time metrics registration (so series show up on first scrape).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sentinel_records_total", "Raw records received by the pipeline.");
        describe_counter!(
            "sentinel_validation_errors_total",
            "Records skipped for missing or malformed fields."
        );
        describe_counter!(
            "sentinel_anonymization_violations_total",
            "Records dropped because PII survived scrubbing."
        );
        describe_counter!(
            "sentinel_model_fallback_total",
            "Records scored by rules because the model strategy failed."
        );
        describe_gauge!("sentinel_hotspots_active", "Hotspots detected in the last run.");
        describe_counter!("sentinel_alerts_emitted_total", "Alerts created, by tier.");
        describe_counter!(
            "sentinel_alert_delivery_failures_total",
            "Notifier channel failures, by channel."
        );
        describe_histogram!("sentinel_run_ms", "Pipeline run time in milliseconds.");
    });
}

/// Install a global recorder without a listener (tests, embedding).
pub fn install_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("prometheus: install recorder")?;
    ensure_metrics_described();
    Ok(handle)
}

/// Install the recorder and serve `/metrics` on `addr`. Must run inside a
/// Tokio runtime.
pub fn install_exporter(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("prometheus: listen on {addr}"))?;
    ensure_metrics_described();
    tracing::info!(target: "pipeline", %addr, "prometheus exporter listening");
    Ok(())
}

/// Reads `SENTINEL_METRICS_ADDR`; no-op when unset.
pub fn install_from_env() -> anyhow::Result<()> {
    match std::env::var(ENV_METRICS_ADDR) {
        Ok(raw) if !raw.trim().is_empty() => {
            let addr: SocketAddr = raw
                .trim()
                .parse()
                .with_context(|| format!("{ENV_METRICS_ADDR}={raw} is not a socket address"))?;
            install_exporter(addr)
        }
        _ => {
            ensure_metrics_described();
            Ok(())
        }
    }
}
