//! Integration tests for configuration management
//!
//! Verifies that config files load with defaults, validation rejects bad
//! values, and paths are expanded and created.

use std::fs;
use tempfile::TempDir;

use badi_engine::config::{Config, EmbedderKind, IntentStrategy, Mode};
use badi_sdk::errors::EngineError;

fn write_config(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    let data_dir = dir.path().join("data");
    let contents = format!(
        "[core]\ndata_dir = \"{}\"\n{}",
        data_dir.display().to_string().replace('\\', "\\\\"),
        body
    );
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_full_config_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
log_level = "debug"

[backends]
mode = "cloud"
hybrid_local_max_chars = 120

[backends.openai]
base_url = "https://example.invalid/v1"
model = "gpt-test"
priority = 3
api_key_env = "TEST_OPENAI_KEY"

[memory]
context_window = 4
top_k = 2
similarity_threshold = 0.4
embedder = "ollama"

[intent]
strategy = "backend"

[executor]
step_timeout_secs = 12
max_concurrency = 2

[policy]
allowed_roots = ["/tmp"]
denied_capabilities = ["system_control.organize_by_type"]

[modules]
enabled = ["memory_tools"]
"#,
    );

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.core.log_level, "debug");
    assert_eq!(config.backends.mode, Mode::Cloud);
    assert_eq!(config.backends.hybrid_local_max_chars, 120);
    assert_eq!(config.backends.openai.priority, 3);
    assert_eq!(config.memory.context_window, 4);
    assert_eq!(config.memory.embedder, EmbedderKind::Ollama);
    assert_eq!(config.intent.strategy, IntentStrategy::Backend);
    assert_eq!(config.executor.step_timeout_secs, 12);
    assert_eq!(config.executor.concurrency(), Some(2));
    assert_eq!(config.modules.enabled, vec!["memory_tools".to_string()]);
    assert!(config.core.data_dir.exists());
}

#[test]
fn test_minimal_config_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.backends.mode, Mode::Hybrid);
    assert_eq!(config.memory.context_window, 10);
    assert_eq!(config.memory.top_k, 5);
    assert_eq!(config.executor.step_timeout_secs, 30);
    assert!(config.policy.require_confirmation);
    assert_eq!(config.database_path(), dir.path().join("data").join("badi.db"));
}

#[test]
fn test_invalid_log_level_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "log_level = \"loud\"\n");
    assert!(matches!(Config::load_from_path(&path), Err(EngineError::Config(_))));
}

#[test]
fn test_invalid_mode_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[backends]\nmode = \"sometimes\"\n");
    assert!(Config::load_from_path(&path).is_err());
}

#[test]
fn test_zero_timeout_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[executor]\nstep_timeout_secs = 0\n");
    assert!(matches!(Config::load_from_path(&path), Err(EngineError::Config(_))));
}

#[test]
fn test_unqualified_capability_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[policy]\ndenied_capabilities = [\"scan_directory\"]\n");
    assert!(matches!(Config::load_from_path(&path), Err(EngineError::Config(_))));
}

#[test]
fn test_env_overrides() {
    let mut config = Config::default();
    config
        .apply_env_overrides(|key| match key {
            "BADI_MODE" => Some("local".to_string()),
            "BADI_LOG_LEVEL" => Some("WARN".to_string()),
            _ => None,
        })
        .unwrap();
    assert_eq!(config.backends.mode, Mode::Local);
    assert_eq!(config.core.log_level, "warn");

    let mut config = Config::default();
    assert!(config
        .apply_env_overrides(|key| (key == "BADI_MODE").then(|| "bogus".to_string()))
        .is_err());
}

#[test]
fn test_missing_file_is_error() {
    let dir = TempDir::new().unwrap();
    let err = Config::load_from_path(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}
