use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use deptflow_core::config::{AppConfig, LoadOptions};
use toml::Value;

const CONFIG_CANDIDATES: [&str; 2] = ["deptflow.toml", "config/deptflow.toml"];

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = detect_config_path();
    let file_doc = load_config_file_doc(file_path.as_deref());
    let sources = SourceLookup { file_doc: file_doc.as_ref(), file_path: file_path.as_deref() };

    let entries = [
        ("database.url", config.database.url.clone(), &["DEPTFLOW_DATABASE_URL"][..]),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["DEPTFLOW_DATABASE_MAX_CONNECTIONS"][..],
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["DEPTFLOW_DATABASE_TIMEOUT_SECS"][..],
        ),
        (
            "server.bind_address",
            config.server.bind_address.clone(),
            &["DEPTFLOW_SERVER_BIND_ADDRESS"][..],
        ),
        ("server.port", config.server.port.to_string(), &["DEPTFLOW_SERVER_PORT"][..]),
        (
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            &["DEPTFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS"][..],
        ),
        (
            "orchestrator.confidence_threshold",
            config.orchestrator.confidence_threshold.to_string(),
            &["DEPTFLOW_ORCHESTRATOR_CONFIDENCE_THRESHOLD"][..],
        ),
        (
            "orchestrator.step_timeout_secs",
            config.orchestrator.step_timeout_secs.to_string(),
            &["DEPTFLOW_ORCHESTRATOR_STEP_TIMEOUT_SECS"][..],
        ),
        (
            "orchestrator.simulated_latency_ms",
            config.orchestrator.simulated_latency_ms.to_string(),
            &["DEPTFLOW_ORCHESTRATOR_SIMULATED_LATENCY_MS"][..],
        ),
        (
            "orchestrator.strict_policies",
            config.orchestrator.strict_policies.to_string(),
            &["DEPTFLOW_ORCHESTRATOR_STRICT_POLICIES"][..],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            &["DEPTFLOW_LOGGING_LEVEL", "DEPTFLOW_LOG_LEVEL"][..],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["DEPTFLOW_LOGGING_FORMAT", "DEPTFLOW_LOG_FORMAT"][..],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        entries
            .iter()
            .map(|(key, value, env_keys)| render_line(key, value, sources.source(key, env_keys))),
    );
    lines.join("\n")
}

struct SourceLookup<'a> {
    file_doc: Option<&'a Value>,
    file_path: Option<&'a Path>,
}

impl SourceLookup<'_> {
    fn source(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = self.file_doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .file_path
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn detect_config_path() -> Option<PathBuf> {
    CONFIG_CANDIDATES.iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
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
