use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::policy::PolicyMode;

#[derive(Clone, Debug, Serialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub orchestrator: OrchestratorConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct OrchestratorConfig {
    /// Classifications at or below this confidence ask for clarification.
    pub confidence_threshold: f64,
    pub step_timeout_secs: u64,
    /// Delay applied while an agent holds its turn: once per delegated action and
    /// once per internship step.
    pub simulated_latency_ms: u64,
    pub strict_policies: bool,
}

impl OrchestratorConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn simulated_latency(&self) -> Duration {
        Duration::from_millis(self.simulated_latency_ms)
    }

    pub fn policy_mode(&self) -> PolicyMode {
        if self.strict_policies {
            PolicyMode::Strict
        } else {
            PolicyMode::Lenient
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub server_port: Option<u16>,
    pub confidence_threshold: Option<f64>,
    pub simulated_latency_ms: Option<u64>,
    pub strict_policies: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://deptflow.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            orchestrator: OrchestratorConfig {
                confidence_threshold: 0.8,
                step_timeout_secs: 30,
                simulated_latency_ms: 250,
                strict_policies: false,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("deptflow.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            merge(&mut self.database.url, database.url);
            merge(&mut self.database.max_connections, database.max_connections);
            merge(&mut self.database.timeout_secs, database.timeout_secs);
        }
        if let Some(server) = patch.server {
            merge(&mut self.server.bind_address, server.bind_address);
            merge(&mut self.server.port, server.port);
            merge(&mut self.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
        }
        if let Some(orchestrator) = patch.orchestrator {
            let target = &mut self.orchestrator;
            merge(&mut target.confidence_threshold, orchestrator.confidence_threshold);
            merge(&mut target.step_timeout_secs, orchestrator.step_timeout_secs);
            merge(&mut target.simulated_latency_ms, orchestrator.simulated_latency_ms);
            merge(&mut target.strict_policies, orchestrator.strict_policies);
        }
        if let Some(logging) = patch.logging {
            merge(&mut self.logging.level, logging.level);
            merge(&mut self.logging.format, logging.format);
        }
    }

    /// `DEPTFLOW_<SECTION>_<FIELD>`; logging also accepts the short `DEPTFLOW_LOG_*` names.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        merge(&mut self.database.url, env_value(&["DEPTFLOW_DATABASE_URL"])?);
        merge(
            &mut self.database.max_connections,
            env_value(&["DEPTFLOW_DATABASE_MAX_CONNECTIONS"])?,
        );
        merge(&mut self.database.timeout_secs, env_value(&["DEPTFLOW_DATABASE_TIMEOUT_SECS"])?);

        merge(&mut self.server.bind_address, env_value(&["DEPTFLOW_SERVER_BIND_ADDRESS"])?);
        merge(&mut self.server.port, env_value(&["DEPTFLOW_SERVER_PORT"])?);
        merge(
            &mut self.server.graceful_shutdown_secs,
            env_value(&["DEPTFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS"])?,
        );

        let orchestrator = &mut self.orchestrator;
        merge(
            &mut orchestrator.confidence_threshold,
            env_value(&["DEPTFLOW_ORCHESTRATOR_CONFIDENCE_THRESHOLD"])?,
        );
        merge(
            &mut orchestrator.step_timeout_secs,
            env_value(&["DEPTFLOW_ORCHESTRATOR_STEP_TIMEOUT_SECS"])?,
        );
        merge(
            &mut orchestrator.simulated_latency_ms,
            env_value(&["DEPTFLOW_ORCHESTRATOR_SIMULATED_LATENCY_MS"])?,
        );
        merge(
            &mut orchestrator.strict_policies,
            env_value(&["DEPTFLOW_ORCHESTRATOR_STRICT_POLICIES"])?,
        );

        merge(
            &mut self.logging.level,
            env_value(&["DEPTFLOW_LOGGING_LEVEL", "DEPTFLOW_LOG_LEVEL"])?,
        );
        merge(
            &mut self.logging.format,
            env_value(&["DEPTFLOW_LOGGING_FORMAT", "DEPTFLOW_LOG_FORMAT"])?,
        );
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        merge(&mut self.database.url, overrides.database_url);
        merge(&mut self.logging.level, overrides.log_level);
        merge(&mut self.server.port, overrides.server_port);
        merge(&mut self.orchestrator.confidence_threshold, overrides.confidence_threshold);
        merge(&mut self.orchestrator.simulated_latency_ms, overrides.simulated_latency_ms);
        merge(&mut self.orchestrator.strict_policies, overrides.strict_policies);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_orchestrator(&self.orchestrator)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("deptflow.toml"), PathBuf::from("config/deptflow.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_orchestrator(orchestrator: &OrchestratorConfig) -> Result<(), ConfigError> {
    let threshold = orchestrator.confidence_threshold;
    if !(threshold > 0.0 && threshold <= 1.0) {
        return Err(ConfigError::Validation(format!(
            "orchestrator.confidence_threshold must be in range (0, 1], got {threshold}"
        )));
    }

    if orchestrator.step_timeout_secs == 0 || orchestrator.step_timeout_secs > 3600 {
        return Err(ConfigError::Validation(
            "orchestrator.step_timeout_secs must be in range 1..=3600".to_string(),
        ));
    }

    if orchestrator.simulated_latency_ms >= orchestrator.step_timeout_secs * 1000 {
        return Err(ConfigError::Validation(
            "orchestrator.simulated_latency_ms must be shorter than the step timeout".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn merge<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

/// First non-blank variable among `keys`, parsed. Blank values count as unset.
fn env_value<T: FromStr>(keys: &[&str]) -> Result<Option<T>, ConfigError> {
    let Some((key, raw)) = keys
        .iter()
        .find_map(|key| env::var(key).ok().filter(|v| !v.trim().is_empty()).map(|v| (*key, v)))
    else {
        return Ok(None);
    };
    match raw.trim().parse::<T>() {
        Ok(value) => Ok(Some(value)),
        Err(_) => Err(ConfigError::InvalidEnvOverride { key: key.to_string(), value: raw }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    orchestrator: Option<OrchestratorPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct OrchestratorPatch {
    confidence_threshold: Option<f64>,
    step_timeout_secs: Option<u64>,
    simulated_latency_ms: Option<u64>,
    strict_policies: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};

    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::domain::policy::PolicyMode;

    /// Runs `body` with exactly `vars` set among the variables it touches, restoring
    /// the previous values afterwards.
    fn with_env<T>(vars: &[(&str, &str)], body: impl FnOnce() -> T) -> T {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        let _guard = match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let saved: Vec<(&str, Option<String>)> =
            vars.iter().map(|(key, _)| (*key, env::var(key).ok())).collect();
        for (key, value) in vars {
            env::set_var(key, value);
        }
        let result = body();
        for (key, previous) in saved {
            match previous {
                Some(value) => env::set_var(key, value),
                None => env::remove_var(key),
            }
        }
        result
    }

    fn config_file(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("deptflow.toml");
        fs::write(&path, contents).expect("write config file");
        path
    }

    fn load_from(path: PathBuf, overrides: ConfigOverrides) -> Result<AppConfig, ConfigError> {
        AppConfig::load(LoadOptions { config_path: Some(path), require_file: true, overrides })
    }

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().expect("defaults validate");
        assert_eq!(config.orchestrator.confidence_threshold, 0.8);
        assert_eq!(config.orchestrator.step_timeout().as_secs(), 30);
        assert_eq!(config.orchestrator.policy_mode(), PolicyMode::Lenient);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn file_values_support_env_interpolation() {
        let dir = TempDir::new().expect("tempdir");
        let path = config_file(
            &dir,
            r#"
[database]
url = "sqlite://${TEST_DEPTFLOW_DB_PATH}"

[orchestrator]
strict_policies = true
"#,
        );

        let config = with_env(&[("TEST_DEPTFLOW_DB_PATH", "interpolated.db")], || {
            load_from(path, ConfigOverrides::default())
        })
        .expect("config loads");

        assert_eq!(config.database.url, "sqlite://interpolated.db");
        assert_eq!(config.orchestrator.policy_mode(), PolicyMode::Strict);
    }

    #[test]
    fn unset_interpolation_variable_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let path = config_file(&dir, "[database]\nurl = \"sqlite://${TEST_DEPTFLOW_UNSET_VAR}\"\n");

        let error = load_from(path, ConfigOverrides::default()).expect_err("interpolation fails");
        assert!(matches!(
            error,
            ConfigError::MissingEnvInterpolation { ref var } if var == "TEST_DEPTFLOW_UNSET_VAR"
        ));
    }

    #[test]
    fn short_logging_aliases_apply() {
        let config = with_env(&[("DEPTFLOW_LOG_LEVEL", "warn"), ("DEPTFLOW_LOG_FORMAT", "json")], || {
            AppConfig::load(LoadOptions::default())
        })
        .expect("config loads");

        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn overrides_beat_env_which_beats_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = config_file(
            &dir,
            r#"
[database]
url = "sqlite://from-file.db"

[orchestrator]
confidence_threshold = 0.9
simulated_latency_ms = 10

[logging]
level = "warn"
"#,
        );

        let config = with_env(
            &[
                ("DEPTFLOW_DATABASE_URL", "sqlite://from-env.db"),
                ("DEPTFLOW_ORCHESTRATOR_CONFIDENCE_THRESHOLD", "0.7"),
            ],
            || {
                load_from(
                    path,
                    ConfigOverrides {
                        database_url: Some("sqlite://from-override.db".to_string()),
                        log_level: Some("debug".to_string()),
                        ..ConfigOverrides::default()
                    },
                )
            },
        )
        .expect("config loads");

        assert_eq!(config.database.url, "sqlite://from-override.db");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.orchestrator.confidence_threshold, 0.7);
        assert_eq!(config.orchestrator.simulated_latency_ms, 10);
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let config = with_env(&[("DEPTFLOW_SERVER_PORT", "  ")], || {
            AppConfig::load(LoadOptions::default())
        })
        .expect("config loads");
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn unparsable_env_value_names_the_variable() {
        let error = with_env(&[("DEPTFLOW_ORCHESTRATOR_STEP_TIMEOUT_SECS", "soon")], || {
            AppConfig::load(LoadOptions::default())
        })
        .expect_err("override rejected");

        assert!(matches!(
            error,
            ConfigError::InvalidEnvOverride { ref key, ref value }
                if key == "DEPTFLOW_ORCHESTRATOR_STEP_TIMEOUT_SECS" && value == "soon"
        ));
    }

    #[test]
    fn threshold_must_lie_in_unit_interval() {
        for threshold in [0.0, 1.5, f64::NAN] {
            let mut config = AppConfig::default();
            config.orchestrator.confidence_threshold = threshold;
            let error = config.validate().expect_err("threshold rejected");
            assert!(error.to_string().contains("confidence_threshold"), "{error}");
        }

        let mut config = AppConfig::default();
        config.orchestrator.confidence_threshold = 1.0;
        config.validate().expect("upper bound is inclusive");
    }

    #[test]
    fn simulated_latency_must_fit_inside_the_step_timeout() {
        let mut config = AppConfig::default();
        config.orchestrator.step_timeout_secs = 1;
        config.orchestrator.simulated_latency_ms = 1_000;
        let error = config.validate().expect_err("latency rejected");
        assert!(error.to_string().contains("simulated_latency_ms"));
    }

    #[test]
    fn non_sqlite_database_is_rejected() {
        let mut config = AppConfig::default();
        config.database.url = "postgres://campus".to_string();
        let error = config.validate().expect_err("url rejected");
        assert!(error.to_string().contains("database.url"));
    }

    #[test]
    fn missing_required_file_is_reported() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("absent.toml");

        let error = load_from(path.clone(), ConfigOverrides::default()).expect_err("missing file");
        assert!(matches!(error, ConfigError::MissingConfigFile(ref missing) if missing == &path));
    }
}
