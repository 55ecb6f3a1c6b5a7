use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::monitoring::{AlertThresholds, HealthWeights};
use crate::qualification::DecisionWeights;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub orchestrator: OrchestratorConfig,
    pub scoring: ScoringConfig,
    pub profile: ProfileConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct RetrievalConfig {
    pub max_fragments: usize,
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Extra attempts granted to a step after a retryable failure.
    pub step_max_retries: u32,
}

#[derive(Clone, Debug, Default)]
pub struct ScoringConfig {
    pub decision: DecisionWeights,
    pub health: HealthWeights,
    pub alerts: AlertThresholds,
}

#[derive(Clone, Debug)]
pub struct ProfileConfig {
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
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
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub profile_path: Option<PathBuf>,
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
                url: "sqlite://dealforge.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                api_key: None,
                base_url: "https://openrouter.ai/api/v1".to_string(),
                model: "qwen/qwen3-30b-a3b".to_string(),
                timeout_secs: 60,
                max_retries: 2,
            },
            retrieval: RetrievalConfig { max_fragments: 10 },
            orchestrator: OrchestratorConfig { step_max_retries: 1 },
            scoring: ScoringConfig::default(),
            profile: ProfileConfig { path: PathBuf::from("company_profile.json") },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("dealforge.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(retrieval) = patch.retrieval {
            if let Some(max_fragments) = retrieval.max_fragments {
                self.retrieval.max_fragments = max_fragments;
            }
        }

        if let Some(orchestrator) = patch.orchestrator {
            if let Some(step_max_retries) = orchestrator.step_max_retries {
                self.orchestrator.step_max_retries = step_max_retries;
            }
        }

        if let Some(scoring) = patch.scoring {
            if let Some(value) = scoring.capability_weight {
                self.scoring.decision.capability = value;
            }
            if let Some(value) = scoring.coverage_weight {
                self.scoring.decision.coverage = value;
            }
            if let Some(value) = scoring.gap_penalty_weight {
                self.scoring.decision.gap_penalty = value;
            }
            if let Some(value) = scoring.go_threshold {
                self.scoring.decision.go_threshold = value;
            }
            if let Some(value) = scoring.conditional_threshold {
                self.scoring.decision.conditional_threshold = value;
            }
            if let Some(value) = scoring.sentiment_weight {
                self.scoring.health.sentiment_weight = value;
            }
            if let Some(value) = scoring.health_decay {
                self.scoring.health.decay = value;
            }
            if let Some(value) = scoring.sentiment_drop_threshold {
                self.scoring.alerts.sentiment_drop = value;
            }
            if let Some(value) = scoring.sentiment_critical_threshold {
                self.scoring.alerts.sentiment_critical = value;
            }
            if let Some(value) = scoring.positive_update_threshold {
                self.scoring.alerts.positive_update = value;
            }
            if let Some(value) = scoring.alert_health_floor {
                self.scoring.alerts.health_floor = value;
            }
        }

        if let Some(profile) = patch.profile {
            if let Some(path) = profile.path {
                self.profile.path = PathBuf::from(path);
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("DEALFORGE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("DEALFORGE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("DEALFORGE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("DEALFORGE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("DEALFORGE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DEALFORGE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("DEALFORGE_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("DEALFORGE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("DEALFORGE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("DEALFORGE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("DEALFORGE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("DEALFORGE_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("DEALFORGE_RETRIEVAL_MAX_FRAGMENTS") {
            self.retrieval.max_fragments =
                parse_u32("DEALFORGE_RETRIEVAL_MAX_FRAGMENTS", &value)? as usize;
        }
        if let Some(value) = read_env("DEALFORGE_ORCHESTRATOR_STEP_MAX_RETRIES") {
            self.orchestrator.step_max_retries =
                parse_u32("DEALFORGE_ORCHESTRATOR_STEP_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("DEALFORGE_PROFILE_PATH") {
            self.profile.path = PathBuf::from(value);
        }

        if let Some(value) = read_env("DEALFORGE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("DEALFORGE_SERVER_PORT") {
            self.server.port = parse_u16("DEALFORGE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("DEALFORGE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("DEALFORGE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("DEALFORGE_LOGGING_LEVEL").or_else(|| read_env("DEALFORGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("DEALFORGE_LOGGING_FORMAT").or_else(|| read_env("DEALFORGE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(profile_path) = overrides.profile_path {
            self.profile.path = profile_path;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_retrieval(&self.retrieval)?;
        validate_scoring(&self.scoring)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("dealforge.toml"), PathBuf::from("config/dealforge.toml")]
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

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if llm.base_url.trim().is_empty() {
        return Err(ConfigError::Validation("llm.base_url must not be empty".to_string()));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if let Some(api_key) = &llm.api_key {
        if api_key.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "llm.api_key must not be blank when set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_retrieval(retrieval: &RetrievalConfig) -> Result<(), ConfigError> {
    if retrieval.max_fragments == 0 {
        return Err(ConfigError::Validation(
            "retrieval.max_fragments must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_scoring(scoring: &ScoringConfig) -> Result<(), ConfigError> {
    let weights = &scoring.decision;
    for (name, value) in [
        ("scoring.capability_weight", weights.capability),
        ("scoring.coverage_weight", weights.coverage),
        ("scoring.gap_penalty_weight", weights.gap_penalty),
        ("scoring.go_threshold", weights.go_threshold),
        ("scoring.conditional_threshold", weights.conditional_threshold),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::Validation(format!("{name} must be in range 0.0..=1.0")));
        }
    }
    if weights.conditional_threshold > weights.go_threshold {
        return Err(ConfigError::Validation(
            "scoring.conditional_threshold must not exceed scoring.go_threshold".to_string(),
        ));
    }

    if !(0.0..1.0).contains(&scoring.health.decay) {
        return Err(ConfigError::Validation(
            "scoring.health_decay must be in range 0.0..1.0".to_string(),
        ));
    }
    if scoring.health.sentiment_weight < 0.0 {
        return Err(ConfigError::Validation(
            "scoring.sentiment_weight must not be negative".to_string(),
        ));
    }

    if scoring.alerts.sentiment_critical > scoring.alerts.sentiment_drop {
        return Err(ConfigError::Validation(
            "scoring.sentiment_critical_threshold must not exceed scoring.sentiment_drop_threshold"
                .to_string(),
        ));
    }
    if scoring.alerts.health_floor > 100 {
        return Err(ConfigError::Validation(
            "scoring.alert_health_floor must be in range 0..=100".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation(
            "server.port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
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

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    retrieval: Option<RetrievalPatch>,
    orchestrator: Option<OrchestratorPatch>,
    scoring: Option<ScoringPatch>,
    profile: Option<ProfilePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RetrievalPatch {
    max_fragments: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct OrchestratorPatch {
    step_max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ScoringPatch {
    capability_weight: Option<f64>,
    coverage_weight: Option<f64>,
    gap_penalty_weight: Option<f64>,
    go_threshold: Option<f64>,
    conditional_threshold: Option<f64>,
    sentiment_weight: Option<f64>,
    health_decay: Option<f64>,
    sentiment_drop_threshold: Option<f64>,
    sentiment_critical_threshold: Option<f64>,
    positive_update_threshold: Option<f64>,
    alert_health_floor: Option<u8>,
}

#[derive(Debug, Default, Deserialize)]
struct ProfilePatch {
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
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
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_cleanly() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;
        ensure(config.orchestrator.step_max_retries == 1, "default retry bound should be 1")?;
        ensure(config.retrieval.max_fragments == 10, "default fragment cap should be 10")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_OPENROUTER_KEY", "sk-or-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("dealforge.toml");
            fs::write(
                &path,
                r#"
[llm]
api_key = "${TEST_OPENROUTER_KEY}"
model = "from-file"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let api_key = config.llm.api_key.ok_or("api key should be set")?;
            ensure(
                api_key.expose_secret() == "sk-or-from-env",
                "api key should be loaded from environment",
            )?;
            ensure(config.llm.model == "from-file", "model should come from the file")?;
            Ok(())
        })();

        clear_vars(&["TEST_OPENROUTER_KEY"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DEALFORGE_DATABASE_URL", "sqlite://from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("dealforge.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-env.db",
                "env database url should win over the file",
            )?;
            ensure(config.logging.level == "debug", "override log level should win")?;
            Ok(())
        })();

        clear_vars(&["DEALFORGE_DATABASE_URL"]);
        result
    }

    #[test]
    fn scoring_thresholds_are_validated() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("dealforge.toml");
        fs::write(
            &path,
            r#"
[scoring]
go_threshold = 0.3
conditional_threshold = 0.5
"#,
        )
        .map_err(|err| err.to_string())?;

        let error =
            match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
            {
                Ok(_) => return Err("expected validation failure".to_string()),
                Err(error) => error,
            };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("conditional_threshold")
        );
        ensure(has_message, "validation failure should mention conditional_threshold")
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DEALFORGE_LOG_LEVEL", "warn");
        env::set_var("DEALFORGE_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warn log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["DEALFORGE_LOG_LEVEL", "DEALFORGE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DEALFORGE_LLM_API_KEY", "sk-or-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");
            ensure(
                !debug.contains("sk-or-secret-value"),
                "debug output should not contain the api key",
            )
        })();

        clear_vars(&["DEALFORGE_LLM_API_KEY"]);
        result
    }
}
