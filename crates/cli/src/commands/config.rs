use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use handoff_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// Config file, if any, plus its parsed document for source attribution.
struct ConfigFile {
    path: Option<PathBuf>,
    doc: Option<Value>,
}

impl ConfigFile {
    fn detect() -> Self {
        let path = detect_config_path();
        let doc = load_config_file_doc(path.as_deref());
        Self { path, doc }
    }

    fn line(&self, key: &str, value: impl ToString, env_keys: &[&str]) -> String {
        let source = field_source(key, env_keys, self.doc.as_ref(), self.path.as_deref());
        render_line(key, &value.to_string(), source)
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let file = ConfigFile::detect();

    let lines = vec![
        "effective config (source precedence: env > file > default):".to_string(),
        file.line("database.url", &config.database.url, &["HANDOFF_DATABASE_URL"]),
        file.line(
            "database.max_connections",
            config.database.max_connections,
            &["HANDOFF_DATABASE_MAX_CONNECTIONS"],
        ),
        file.line(
            "database.timeout_secs",
            config.database.timeout_secs,
            &["HANDOFF_DATABASE_TIMEOUT_SECS"],
        ),
        file.line(
            "server.bind_address",
            &config.server.bind_address,
            &["HANDOFF_SERVER_BIND_ADDRESS"],
        ),
        file.line("server.port", config.server.port, &["HANDOFF_SERVER_PORT"]),
        file.line(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs,
            &["HANDOFF_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        file.line(
            "sla.default_minutes",
            config.sla.default_minutes,
            &["HANDOFF_SLA_DEFAULT_MINUTES"],
        ),
        file.line(
            "sla.sweep_interval_secs",
            config.sla.sweep_interval_secs,
            &["HANDOFF_SLA_SWEEP_INTERVAL_SECS"],
        ),
        file.line(
            "sla.monitor_enabled",
            config.sla.monitor_enabled,
            &["HANDOFF_SLA_MONITOR_ENABLED"],
        ),
        file.line(
            "logging.level",
            &config.logging.level,
            &["HANDOFF_LOGGING_LEVEL", "HANDOFF_LOG_LEVEL"],
        ),
        file.line(
            "logging.format",
            config.logging.format.as_str(),
            &["HANDOFF_LOGGING_FORMAT", "HANDOFF_LOG_FORMAT"],
        ),
    ];

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    ["handoff.toml", "config/handoff.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use toml::Value;

    use super::{contains_path, field_source, render_line};

    fn doc() -> Value {
        "[sla]\ndefault_minutes = 90\n".parse::<Value>().expect("toml")
    }

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let doc = doc();
        assert!(contains_path(&doc, "sla.default_minutes"));
        assert!(!contains_path(&doc, "sla.sweep_interval_secs"));
        assert!(!contains_path(&doc, "server.port"));
    }

    #[test]
    fn file_values_are_attributed_to_the_file() {
        let doc = doc();
        let source = field_source(
            "sla.default_minutes",
            &["HANDOFF_TEST_UNSET_SOURCE_KEY"],
            Some(&doc),
            Some(Path::new("handoff.toml")),
        );
        assert_eq!(source, "file (handoff.toml)");

        let fallback = field_source("server.port", &[], Some(&doc), None);
        assert_eq!(fallback, "default");
        assert_eq!(
            render_line("server.port", "8080", fallback),
            "- server.port = 8080 (source: default)"
        );
    }
}
