//! Config loading, TOML parsing, and env var override tests.
//!
//! Some tests are `#[ignore]` (they chdir or set env vars and conflict in parallel).
//! Run them with: `cargo test --test config_tests -- --ignored --test-threads=1`

use std::env;
use std::fs;
use tablemux::{Config, DispatchMode, RecordErrorPolicy, RejectPolicy};
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

// Default Configuration Tests
#[test]
fn test_config_default_dispatch() {
    let config = Config::default();
    assert_eq!(config.dispatch.mode, DispatchMode::Inline);
    assert_eq!(config.dispatch.record_error_policy, RecordErrorPolicy::Continue);
    assert_eq!(config.dispatch.reject_policy, RejectPolicy::Error);
    assert_eq!(config.dispatch.worker_queue_depth, 64);
}

#[test]
fn test_config_default_session_has_no_deadline() {
    assert_eq!(Config::default().session.timeout_ms, 0);
}

#[test]
fn test_config_default_logging() {
    let config = Config::default();
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, "text");
}

// File Loading Tests
#[test]
fn test_config_from_full_file() {
    let temp = TempDir::new().unwrap();
    let path = write_config(
        &temp,
        "tablemux.toml",
        r#"
[dispatch]
mode = "per_table_worker"
record_error_policy = "abort_table"
reject_policy = "drop"
worker_queue_depth = 8

[session]
timeout_ms = 2500

[logging]
level = "debug"
format = "json"
"#,
    );

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.dispatch.mode, DispatchMode::PerTableWorker);
    assert_eq!(config.dispatch.record_error_policy, RecordErrorPolicy::AbortTable);
    assert_eq!(config.dispatch.reject_policy, RejectPolicy::Drop);
    assert_eq!(config.dispatch.worker_queue_depth, 8);
    assert_eq!(config.session.timeout_ms, 2500);
    assert_eq!(config.logging.format, "json");
}

#[test]
fn test_config_partial_file_keeps_defaults() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "partial.toml", "[session]\ntimeout_ms = 100\n");

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.session.timeout_ms, 100);
    assert_eq!(config.dispatch, Config::default().dispatch);
    assert_eq!(config.logging, Config::default().logging);
}

#[test]
fn test_config_missing_file_is_default() {
    let temp = TempDir::new().unwrap();
    let config = Config::from_file(temp.path().join("nope.toml")).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_config_rejects_unknown_mode() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "bad.toml", "[dispatch]\nmode = \"threaded\"\n");
    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_config_serialization_roundtrip() {
    let mut config = Config::default();
    config.dispatch.mode = DispatchMode::PerTableWorker;
    config.session.timeout_ms = 42;

    let text = toml::to_string(&config).unwrap();
    let back: Config = toml::from_str(&text).unwrap();
    assert_eq!(back, config);
}

// Layering Tests
#[test]
#[ignore = "Requires --test-threads=1 due to directory change"]
fn test_config_load_local_overrides_base() {
    let temp = TempDir::new().unwrap();
    write_config(
        &temp,
        "tablemux.toml",
        "[dispatch]\nmode = \"per_table_worker\"\nworker_queue_depth = 4\n",
    );
    write_config(&temp, "tablemux.local.toml", "[dispatch]\nworker_queue_depth = 16\n");

    let original_dir = env::current_dir().unwrap();
    env::set_current_dir(temp.path()).unwrap();
    let result = Config::load();
    env::set_current_dir(original_dir).unwrap();

    let config = result.unwrap();
    assert_eq!(config.dispatch.mode, DispatchMode::PerTableWorker);
    assert_eq!(config.dispatch.worker_queue_depth, 16);
}

#[test]
#[ignore = "Requires --test-threads=1 due to env var mutation"]
fn test_config_env_overrides_file() {
    let temp = TempDir::new().unwrap();
    let path = write_config(&temp, "tablemux.toml", "[session]\ntimeout_ms = 100\n");

    env::set_var("TABLEMUX_SESSION__TIMEOUT_MS", "900");
    env::set_var("TABLEMUX_DISPATCH__REJECT_POLICY", "drop");
    let result = Config::from_file(&path);
    env::remove_var("TABLEMUX_SESSION__TIMEOUT_MS");
    env::remove_var("TABLEMUX_DISPATCH__REJECT_POLICY");

    let config = result.unwrap();
    assert_eq!(config.session.timeout_ms, 900);
    assert_eq!(config.dispatch.reject_policy, RejectPolicy::Drop);
}
