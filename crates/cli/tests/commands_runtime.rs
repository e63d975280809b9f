use std::env;
use std::sync::{Mutex, OnceLock};

use handoff_cli::commands::{config, migrate, seed, sweep};
use serde_json::Value;

const MEMORY_DB: (&str, &str) = ("HANDOFF_DATABASE_URL", "sqlite::memory:");

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[MEMORY_DB], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_invalid_sla() {
    with_env(&[MEMORY_DB, ("HANDOFF_SLA_DEFAULT_MINUTES", "0")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_lists_demo_directory() {
    with_env(&[MEMORY_DB], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected seed success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().expect("message should be a string");
        assert!(message.starts_with("demo directory loaded (6 users)"), "got: {message}");
        assert_eq!(last_line(message), "  - 6: nadia");
    });
}

#[test]
fn sweep_on_empty_store_escalates_nothing() {
    with_env(&[MEMORY_DB], || {
        let result = sweep::run();
        assert_eq!(result.exit_code, 0, "expected sweep success");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "sweep");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().expect("message should be a string");
        assert!(message.starts_with("escalated 0 request(s)"), "got: {message}");
    });
}

#[test]
fn config_attributes_env_overrides() {
    with_env(&[MEMORY_DB, ("HANDOFF_LOG_LEVEL", "debug")], || {
        let output = config::run();

        assert!(output.contains(
            "- database.url = sqlite::memory: (source: env (HANDOFF_DATABASE_URL))"
        ));
        assert!(output.contains("- logging.level = debug (source: env (HANDOFF_LOG_LEVEL))"));
        assert!(output.contains("- sla.default_minutes = 1440"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn last_line(output: &str) -> &str {
    output.lines().last().unwrap_or_default()
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "HANDOFF_DATABASE_URL",
        "HANDOFF_DATABASE_MAX_CONNECTIONS",
        "HANDOFF_DATABASE_TIMEOUT_SECS",
        "HANDOFF_SERVER_BIND_ADDRESS",
        "HANDOFF_SERVER_PORT",
        "HANDOFF_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "HANDOFF_SLA_DEFAULT_MINUTES",
        "HANDOFF_SLA_SWEEP_INTERVAL_SECS",
        "HANDOFF_SLA_MONITOR_ENABLED",
        "HANDOFF_LOGGING_LEVEL",
        "HANDOFF_LOGGING_FORMAT",
        "HANDOFF_LOG_LEVEL",
        "HANDOFF_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
