//! Tests for configuration validation

use std::collections::HashMap;
use std::time::Duration;

use prometheus_concurrency::config::scheduler::{
    ENV_AUTO_START, ENV_CONCURRENCY_LIMIT, ENV_POLL_INTERVAL_MS, ENV_THROW_ON_ERROR,
};
use prometheus_concurrency::SchedulerConfig;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn test_scheduler_config_validation() {
    let valid = SchedulerConfig {
        concurrency_limit: 3,
        poll_interval_ms: 10,
        auto_start: false,
        throw_on_error: true,
    };
    assert!(valid.validate().is_ok());
}

#[test]
fn test_scheduler_config_invalid_limit() {
    let invalid = SchedulerConfig::new().with_concurrency_limit(0);
    assert!(invalid.validate().is_err());
}

#[test]
fn test_scheduler_config_invalid_poll_interval() {
    let invalid = SchedulerConfig::new().with_poll_interval(Duration::ZERO);
    let err = invalid.validate().unwrap_err();
    assert!(err.contains("poll_interval_ms"));
}

#[test]
fn test_config_from_json_partial() {
    let cfg = SchedulerConfig::from_json_str(r#"{"concurrency_limit": 2}"#).unwrap();
    assert_eq!(cfg.concurrency_limit, 2);
    assert_eq!(cfg.poll_interval_ms, 50);
    assert!(cfg.auto_start);
    assert!(!cfg.throw_on_error);
}

#[test]
fn test_config_from_json_full() {
    let json = r#"{
        "concurrency_limit": 8,
        "poll_interval_ms": 20,
        "auto_start": false,
        "throw_on_error": true
    }"#;
    let cfg = SchedulerConfig::from_json_str(json).unwrap();
    assert_eq!(
        cfg,
        SchedulerConfig::new()
            .with_concurrency_limit(8)
            .with_poll_interval_ms(20)
            .with_auto_start(false)
            .with_throw_on_error(true)
    );
}

#[test]
fn test_config_from_json_rejects_invalid() {
    assert!(SchedulerConfig::from_json_str(r#"{"concurrency_limit": 0}"#).is_err());
    assert!(SchedulerConfig::from_json_str("not json").is_err());
}

#[test]
fn test_config_json_roundtrip_keeps_values() {
    let cfg = SchedulerConfig::new().with_concurrency_limit(7);
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(SchedulerConfig::from_json_str(&json).unwrap(), cfg);
}

#[test]
fn test_config_from_env_defaults_when_unset() {
    let cfg = SchedulerConfig::from_env_with(|_| None).unwrap();
    assert_eq!(cfg, SchedulerConfig::default());
}

#[test]
fn test_config_from_env_overrides() {
    let cfg = SchedulerConfig::from_env_with(lookup_from(&[
        (ENV_CONCURRENCY_LIMIT, "12"),
        (ENV_POLL_INTERVAL_MS, " 25 "),
        (ENV_AUTO_START, "false"),
        (ENV_THROW_ON_ERROR, "true"),
    ]))
    .unwrap();
    assert_eq!(cfg.concurrency_limit, 12);
    assert_eq!(cfg.poll_interval_ms, 25);
    assert!(!cfg.auto_start);
    assert!(cfg.throw_on_error);
}

#[test]
fn test_config_from_env_names_bad_variable() {
    let err =
        SchedulerConfig::from_env_with(lookup_from(&[(ENV_CONCURRENCY_LIMIT, "many")])).unwrap_err();
    assert!(err.starts_with(ENV_CONCURRENCY_LIMIT));
    assert!(err.contains("many"));
}

#[test]
fn test_config_from_env_validates() {
    assert!(SchedulerConfig::from_env_with(lookup_from(&[(ENV_CONCURRENCY_LIMIT, "0")])).is_err());
}
