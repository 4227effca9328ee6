// ABOUTME: Tests for configuration loading and validation
// ABOUTME: Verifies TOML parsing, env var overrides, and front-end validation

use serial_test::serial;
use std::io::Write;
use std::time::Duration;
use tempfile::TempDir;
use vacbot::config::{Config, FrontendKind};

/// Helper to clear all config-related env vars
fn clear_config_env_vars() {
    std::env::remove_var("VACBOT_CONFIG_PATH");
    std::env::remove_var("VACBOT_WORKER_THREADS");
    std::env::remove_var("VACBOT_FRONTEND");
    std::env::remove_var("VACBOT_METRICS_LISTEN");
    std::env::remove_var("TELEGRAM_BOT_TOKEN");
}

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

#[test]
#[serial]
fn test_config_loads_from_toml_file() {
    clear_config_env_vars();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[dispatcher]
worker_threads = 3
max_workers_multiplier = 4
worker_idle_timeout_secs = 10
max_queued_tasks = 50
graceful_drain_timeout_secs = 5
forced_cancel_timeout_secs = 2

[frontend]
kind = "telegram"

[telegram]
bot_token = "123:abc"
allowed_users = [42]

[metrics]
listen = "127.0.0.1:9464"
"#,
    );
    std::env::set_var("VACBOT_CONFIG_PATH", &path);

    let config = Config::load().unwrap();

    assert_eq!(config.dispatcher.worker_threads, 3);
    assert_eq!(config.frontend.kind, FrontendKind::Telegram);
    let telegram = config.telegram.as_ref().unwrap();
    assert_eq!(telegram.bot_token, "123:abc");
    assert_eq!(telegram.allowed_users, vec![42]);
    assert!(telegram.allowed_chats.is_empty());
    assert_eq!(
        config.metrics.listen,
        Some("127.0.0.1:9464".parse().unwrap())
    );

    let dispatcher = config.dispatcher.to_dispatcher_config();
    assert_eq!(dispatcher.pool.min_workers, 3);
    assert_eq!(dispatcher.pool.max_workers, 12);
    assert_eq!(dispatcher.pool.max_queued_tasks, 50);
    assert_eq!(dispatcher.pool.worker_idle_timeout, Duration::from_secs(10));
    assert_eq!(dispatcher.shutdown.graceful_drain, Duration::from_secs(5));
    assert_eq!(dispatcher.shutdown.forced_cancel, Duration::from_secs(2));

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_explicit_path_wins_over_env() {
    clear_config_env_vars();
    let env_dir = TempDir::new().unwrap();
    let env_path = write_config(&env_dir, "[dispatcher]\nworker_threads = 7\n");
    std::env::set_var("VACBOT_CONFIG_PATH", &env_path);

    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[dispatcher]\nworker_threads = 2\n");

    let config = Config::load_from(Some(&path)).unwrap();
    assert_eq!(config.dispatcher.worker_threads, 2);

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_missing_explicit_path_is_an_error() {
    clear_config_env_vars();
    let dir = TempDir::new().unwrap();

    let result = Config::load_from(Some(&dir.path().join("nope.toml")));
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_env_vars_override_file() {
    clear_config_env_vars();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[dispatcher]\nworker_threads = 2\n");

    std::env::set_var("VACBOT_WORKER_THREADS", "5");
    std::env::set_var("VACBOT_FRONTEND", "telegram");
    std::env::set_var("TELEGRAM_BOT_TOKEN", "from-env");
    std::env::set_var("VACBOT_METRICS_LISTEN", "0.0.0.0:9000");

    let config = Config::load_from(Some(&path)).unwrap();

    assert_eq!(config.dispatcher.worker_threads, 5);
    assert_eq!(config.frontend.kind, FrontendKind::Telegram);
    assert_eq!(config.telegram.as_ref().unwrap().bot_token, "from-env");
    assert_eq!(config.metrics.listen, Some("0.0.0.0:9000".parse().unwrap()));

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_invalid_env_values_are_rejected() {
    clear_config_env_vars();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");

    std::env::set_var("VACBOT_WORKER_THREADS", "many");
    assert!(Config::load_from(Some(&path)).is_err());
    clear_config_env_vars();

    std::env::set_var("VACBOT_FRONTEND", "irc");
    assert!(Config::load_from(Some(&path)).is_err());
    clear_config_env_vars();

    std::env::set_var("VACBOT_METRICS_LISTEN", "localhost");
    assert!(Config::load_from(Some(&path)).is_err());
    clear_config_env_vars();
}

#[test]
#[serial]
fn test_telegram_frontend_requires_token() {
    clear_config_env_vars();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[frontend]\nkind = \"telegram\"\n");

    let err = Config::load_from(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("bot_token"));
}

#[test]
#[serial]
fn test_zero_worker_threads_is_rejected() {
    clear_config_env_vars();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[dispatcher]\nworker_threads = 0\n");

    assert!(Config::load_from(Some(&path)).is_err());
}

#[test]
#[serial]
fn test_malformed_toml_is_an_error() {
    clear_config_env_vars();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[dispatcher\nworker_threads = ");

    let err = Config::load_from(Some(&path)).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse"));
}

#[test]
fn test_telegram_token_is_redacted_in_debug() {
    let config: Config = toml::from_str("[telegram]\nbot_token = \"secret-token\"\n").unwrap();
    let rendered = format!("{:?}", config);
    assert!(!rendered.contains("secret-token"));
    assert!(rendered.contains("REDACTED"));
}
