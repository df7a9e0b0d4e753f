// tests/config_load.rs
use mh_hotspot_sentinel::config::pipeline::{ENV_CONFIG_PATH, ENV_EPS_KM, ENV_MIN_SAMPLES};
use mh_hotspot_sentinel::config::{ClusterAlgorithm, PipelineConfig};
use mh_hotspot_sentinel::AlertTier;
use std::{env, fs};

fn clear_env() {
    for k in [ENV_CONFIG_PATH, ENV_MIN_SAMPLES, ENV_EPS_KM, "CLASSIFIER_API_KEY"] {
        env::remove_var(k);
    }
}

#[serial_test::serial]
#[test]
fn file_then_env_overrides() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.toml");
    fs::write(
        &path,
        r#"
[clustering]
min_samples = 8
eps_km = 25.0
algorithm = "greedy"

[alerts]
min_notify_tier = "severe"
renotify_interval_secs = 7200
"#,
    )
    .unwrap();

    env::set_var(ENV_CONFIG_PATH, &path);
    env::set_var(ENV_MIN_SAMPLES, "12");
    let cfg = PipelineConfig::load().unwrap();

    assert_eq!(cfg.clustering.min_samples, 12);
    assert_eq!(cfg.clustering.eps_km, 25.0);
    assert_eq!(cfg.clustering.algorithm, ClusterAlgorithm::Greedy);
    assert_eq!(cfg.alerts.min_notify_tier, AlertTier::Severe);
    assert_eq!(cfg.alerts.renotify_interval_secs, 7_200);
    assert_eq!(cfg.window.days_back, 7);
    clear_env();
}

#[serial_test::serial]
#[test]
fn missing_file_gives_defaults_and_bad_override_is_ignored() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    env::set_var(ENV_CONFIG_PATH, dir.path().join("absent.toml"));
    env::set_var(ENV_EPS_KM, "not-a-number");

    let cfg = PipelineConfig::load().unwrap();
    assert_eq!(cfg.clustering.min_samples, 5);
    assert_eq!(cfg.clustering.eps_km, 10.0);
    assert_eq!(cfg.trend.hysteresis, 0.15);
    assert_eq!(cfg.alerts.min_notify_tier, AlertTier::Warning);
    assert!(!cfg.classifier.enabled);
    clear_env();
}

#[serial_test::serial]
#[test]
fn broken_file_is_an_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.toml");
    fs::write(&path, "[clustering\nmin_samples = ").unwrap();
    env::set_var(ENV_CONFIG_PATH, &path);
    assert!(PipelineConfig::load().is_err());
    clear_env();
}

#[serial_test::serial]
#[test]
fn enabled_classifier_needs_its_key() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.toml");
    fs::write(
        &path,
        r#"
[classifier]
enabled = true
endpoint = "http://127.0.0.1:9/classify"
api_key = "ENV"
"#,
    )
    .unwrap();
    env::set_var(ENV_CONFIG_PATH, &path);
    assert!(PipelineConfig::load().is_err());

    env::set_var("CLASSIFIER_API_KEY", "test-key");
    let cfg = PipelineConfig::load().unwrap();
    assert_eq!(cfg.classifier.api_key, "test-key");
    clear_env();
}

#[test]
fn shipped_sample_config_parses() {
    let raw = fs::read_to_string(concat!(env!("CARGO_MANIFEST_DIR"), "/config/pipeline.toml")).unwrap();
    let cfg = PipelineConfig::from_toml_str(&raw).unwrap();
    assert_eq!(cfg.pipeline.max_recommendations, 5);
    assert_eq!(cfg.clustering.algorithm, ClusterAlgorithm::Density);
}
