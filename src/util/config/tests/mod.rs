//! 配置加载单元测试

use crate::runtime::dispatch::DispatcherConfig;
use crate::util::config::{
    apply_overrides, load_config, load_config_file, parse_config, save_config_file,
    to_toml_string, ConfigError, ENV_POOL_SLOTS, ENV_SUBMIT_TIMEOUT_MS, ENV_WORKERS,
};
use std::collections::HashMap;
use std::time::Duration;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_parse_partial_config_keeps_defaults() {
    let config = parse_config("num_workers = 3\n").unwrap();
    let defaults = DispatcherConfig::default();
    assert_eq!(config.num_workers, 3);
    assert_eq!(config.pool_slots, defaults.pool_slots);
    assert_eq!(config.thread_name, defaults.thread_name);
}

#[test]
fn test_parse_full_config() {
    let config = parse_config(
        r#"
num_workers = 2
pool_slots = 64
pool_bytes = 8192
submit_timeout_ms = 150
thread_name = "mesh-loader"
stack_size = 524288
"#,
    )
    .unwrap();
    assert_eq!(config.num_workers, 2);
    assert_eq!(config.pool_slots, 64);
    assert_eq!(config.pool_bytes, Some(8192));
    assert_eq!(config.submit_timeout(), Some(Duration::from_millis(150)));
    assert_eq!(config.thread_name, "mesh-loader");
    assert_eq!(config.stack_size, Some(524288));
}

#[test]
fn test_parse_error() {
    let err = parse_config("num_workers = \"many\"").unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
    assert!(err.to_string().starts_with("Config parse error"));
}

#[test]
fn test_toml_output_skips_unset_fields() {
    let text = to_toml_string(&DispatcherConfig::new(4, 8)).unwrap();
    assert!(text.contains("num_workers = 4"));
    assert!(text.contains("pool_slots = 8"));
    assert!(!text.contains("pool_bytes"));
    assert!(!text.contains("submit_timeout_ms"));
}

#[test]
fn test_save_and_load_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("taskdispatch.toml");
    let config = DispatcherConfig::new(6, 32).with_submit_timeout(Duration::from_millis(75));

    save_config_file(&path, &config).unwrap();
    assert_eq!(load_config_file(&path).unwrap(), config);
    assert_eq!(load_config(Some(&path)).unwrap(), config);
}

#[test]
fn test_load_missing_explicit_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config(Some(&dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::IoError(_)));
}

#[test]
fn test_overrides_apply() {
    let mut config = DispatcherConfig::new(1, 16).with_pool_bytes(4096);
    apply_overrides(
        &mut config,
        env(&[
            (ENV_WORKERS, "8"),
            (ENV_POOL_SLOTS, " 256 "),
            (ENV_SUBMIT_TIMEOUT_MS, "40"),
        ]),
    )
    .unwrap();
    assert_eq!(config.num_workers, 8);
    assert_eq!(config.pool_slots, 256);
    assert_eq!(config.pool_bytes, None);
    assert_eq!(config.submit_timeout_ms, Some(40));
}

#[test]
fn test_overrides_absent_leave_config() {
    let mut config = DispatcherConfig::new(3, 12);
    apply_overrides(&mut config, env(&[])).unwrap();
    assert_eq!(config, DispatcherConfig::new(3, 12));
}

#[test]
fn test_overrides_reject_garbage() {
    let mut config = DispatcherConfig::default();
    let err = apply_overrides(&mut config, env(&[(ENV_WORKERS, "lots")])).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::InvalidEnv { var: ENV_WORKERS, .. }
    ));
    assert_eq!(err.to_string(), "Invalid value 'lots' for TASKDISPATCH_WORKERS");
}
