use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const INSTANCE_CONNECTION_NAME_ENV: &str = "INSTANCE_CONNECTION_NAME";
pub const DB_NAME_ENV: &str = "DB_NAME";
pub const DB_USER_ENV: &str = "DB_USER";
pub const DB_PASSWORD_ENV: &str = "DB_PASSWORD";
pub const SLACK_BOT_TOKEN_ENV: &str = "SLACK_BOT_TOKEN";
pub const SLACK_SIGNING_SECRET_ENV: &str = "SLACK_SIGNING_SECRET";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub slack: SlackConfig,
    pub openai: OpenAiConfig,
    pub qa: QaConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Cloud SQL settings. The four identity fields stay optional until
/// [`DatabaseConfig::target`] resolves them so a missing one can be named.
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub instance_connection_name: Option<String>,
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<SecretString>,
    pub socket_root: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub bot_token: SecretString,
    pub signing_secret: SecretString,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub embedding_model: String,
    pub timeout_secs: u64,
}

/// Explicit construction arguments of the retrieval QA chain.
#[derive(Clone, Debug, PartialEq)]
pub struct QaConfig {
    pub model: String,
    pub temperature: f32,
    pub chain_type: ChainType,
    pub retriever: RetrieverConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetrieverConfig {
    pub collection: String,
    pub top_k: usize,
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
pub enum ChainType {
    Stuff,
}

impl ChainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stuff => "stuff",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Resolved Cloud SQL unix-socket target.
///
/// `Display` renders the connection string with the password redacted.
#[derive(Clone, Debug)]
pub struct CloudSqlTarget {
    pub socket_path: String,
    pub database: String,
    pub user: String,
    pub password: SecretString,
}

impl fmt::Display for CloudSqlTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "postgresql://{}:***@/{}?host={}",
            urlencoding::encode(&self.user),
            self.database,
            self.socket_path
        )
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub instance_connection_name: Option<String>,
    pub database_name: Option<String>,
    pub database_user: Option<String>,
    pub database_password: Option<String>,
    pub database_socket_root: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_signing_secret: Option<String>,
    pub slack_api_base_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub qa_model: Option<String>,
    pub qa_collection: Option<String>,
    pub log_level: Option<String>,
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
    #[error("required setting `{key}` is missing (set the `{var}` environment variable)")]
    MissingSetting { key: &'static str, var: &'static str },
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                instance_connection_name: None,
                name: None,
                user: None,
                password: None,
                socket_root: "/cloudsql".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            slack: SlackConfig {
                bot_token: String::new().into(),
                signing_secret: String::new().into(),
                api_base_url: "https://slack.com/api".to_string(),
            },
            openai: OpenAiConfig {
                api_key: String::new().into(),
                base_url: "https://api.openai.com/v1".to_string(),
                embedding_model: "text-embedding-ada-002".to_string(),
                timeout_secs: 60,
            },
            qa: QaConfig {
                model: "gpt-4".to_string(),
                temperature: 0.0,
                chain_type: ChainType::Stuff,
                retriever: RetrieverConfig { collection: "pages".to_string(), top_k: 4 },
            },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 8080,
                graceful_shutdown_secs: 10,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for ChainType {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stuff" => Ok(Self::Stuff),
            other => Err(ConfigError::Validation(format!(
                "unsupported chain type `{other}` (expected stuff)"
            ))),
        }
    }
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

impl DatabaseConfig {
    /// Builds the Cloud SQL target, failing on the first missing identity
    /// field. Performs no I/O.
    pub fn target(&self) -> Result<CloudSqlTarget, ConfigError> {
        let instance = required(
            "database.instance_connection_name",
            INSTANCE_CONNECTION_NAME_ENV,
            self.instance_connection_name.as_deref(),
        )?;
        let database = required("database.name", DB_NAME_ENV, self.name.as_deref())?;
        let user = required("database.user", DB_USER_ENV, self.user.as_deref())?;
        let password = self
            .password
            .as_ref()
            .filter(|value| !value.expose_secret().trim().is_empty())
            .cloned()
            .ok_or(ConfigError::MissingSetting { key: "database.password", var: DB_PASSWORD_ENV })?;

        let socket_root = self.socket_root.trim_end_matches('/');
        Ok(CloudSqlTarget {
            socket_path: format!("{socket_root}/{instance}"),
            database: database.to_string(),
            user: user.to_string(),
            password,
        })
    }
}

fn required<'a>(
    key: &'static str,
    var: &'static str,
    value: Option<&'a str>,
) -> Result<&'a str, ConfigError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::MissingSetting { key, var })
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("pagebot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if database.instance_connection_name.is_some() {
                self.database.instance_connection_name = database.instance_connection_name;
            }
            if database.name.is_some() {
                self.database.name = database.name;
            }
            if database.user.is_some() {
                self.database.user = database.user;
            }
            if let Some(password) = database.password {
                self.database.password = Some(secret_value(password));
            }
            if let Some(socket_root) = database.socket_root {
                self.database.socket_root = socket_root;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(slack) = patch.slack {
            if let Some(bot_token) = slack.bot_token {
                self.slack.bot_token = secret_value(bot_token);
            }
            if let Some(signing_secret) = slack.signing_secret {
                self.slack.signing_secret = secret_value(signing_secret);
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
        }

        if let Some(openai) = patch.openai {
            if let Some(api_key) = openai.api_key {
                self.openai.api_key = secret_value(api_key);
            }
            if let Some(base_url) = openai.base_url {
                self.openai.base_url = base_url;
            }
            if let Some(embedding_model) = openai.embedding_model {
                self.openai.embedding_model = embedding_model;
            }
            if let Some(timeout_secs) = openai.timeout_secs {
                self.openai.timeout_secs = timeout_secs;
            }
        }

        if let Some(qa) = patch.qa {
            if let Some(model) = qa.model {
                self.qa.model = model;
            }
            if let Some(temperature) = qa.temperature {
                self.qa.temperature = temperature;
            }
            if let Some(chain_type) = qa.chain_type {
                self.qa.chain_type = chain_type.parse()?;
            }
            if let Some(collection) = qa.collection {
                self.qa.retriever.collection = collection;
            }
            if let Some(top_k) = qa.top_k {
                self.qa.retriever.top_k = top_k;
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

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env(INSTANCE_CONNECTION_NAME_ENV) {
            self.database.instance_connection_name = Some(value);
        }
        if let Some(value) = read_env(DB_NAME_ENV) {
            self.database.name = Some(value);
        }
        if let Some(value) = read_env(DB_USER_ENV) {
            self.database.user = Some(value);
        }
        if let Some(value) = read_env(DB_PASSWORD_ENV) {
            self.database.password = Some(secret_value(value));
        }
        if let Some(value) = read_env("PAGEBOT_DATABASE_SOCKET_ROOT") {
            self.database.socket_root = value;
        }
        if let Some(value) = read_env("PAGEBOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("PAGEBOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PAGEBOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PAGEBOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env(SLACK_BOT_TOKEN_ENV) {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env(SLACK_SIGNING_SECRET_ENV) {
            self.slack.signing_secret = secret_value(value);
        }
        if let Some(value) = read_env("PAGEBOT_SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }

        if let Some(value) = read_env(OPENAI_API_KEY_ENV) {
            self.openai.api_key = secret_value(value);
        }
        if let Some(value) = read_env("PAGEBOT_OPENAI_BASE_URL") {
            self.openai.base_url = value;
        }
        if let Some(value) = read_env("PAGEBOT_OPENAI_EMBEDDING_MODEL") {
            self.openai.embedding_model = value;
        }
        if let Some(value) = read_env("PAGEBOT_OPENAI_TIMEOUT_SECS") {
            self.openai.timeout_secs = parse_u64("PAGEBOT_OPENAI_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PAGEBOT_QA_MODEL") {
            self.qa.model = value;
        }
        if let Some(value) = read_env("PAGEBOT_QA_TEMPERATURE") {
            self.qa.temperature = parse_f32("PAGEBOT_QA_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("PAGEBOT_QA_CHAIN_TYPE") {
            self.qa.chain_type = value.parse()?;
        }
        if let Some(value) = read_env("PAGEBOT_QA_COLLECTION") {
            self.qa.retriever.collection = value;
        }
        if let Some(value) = read_env("PAGEBOT_QA_TOP_K") {
            self.qa.retriever.top_k = parse_usize("PAGEBOT_QA_TOP_K", &value)?;
        }

        if let Some(value) = read_env("PAGEBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        // PORT is injected by the hosting runtime; the prefixed name wins when both are set.
        if let Some(value) = read_env("PAGEBOT_SERVER_PORT").or_else(|| read_env("PORT")) {
            self.server.port = parse_u16("PAGEBOT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PAGEBOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PAGEBOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("PAGEBOT_LOGGING_LEVEL").or_else(|| read_env("PAGEBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PAGEBOT_LOGGING_FORMAT").or_else(|| read_env("PAGEBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if overrides.instance_connection_name.is_some() {
            self.database.instance_connection_name = overrides.instance_connection_name;
        }
        if overrides.database_name.is_some() {
            self.database.name = overrides.database_name;
        }
        if overrides.database_user.is_some() {
            self.database.user = overrides.database_user;
        }
        if let Some(password) = overrides.database_password {
            self.database.password = Some(secret_value(password));
        }
        if let Some(socket_root) = overrides.database_socket_root {
            self.database.socket_root = socket_root;
        }
        if let Some(bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(bot_token);
        }
        if let Some(signing_secret) = overrides.slack_signing_secret {
            self.slack.signing_secret = secret_value(signing_secret);
        }
        if let Some(api_base_url) = overrides.slack_api_base_url {
            self.slack.api_base_url = api_base_url;
        }
        if let Some(api_key) = overrides.openai_api_key {
            self.openai.api_key = secret_value(api_key);
        }
        if let Some(base_url) = overrides.openai_base_url {
            self.openai.base_url = base_url;
        }
        if let Some(model) = overrides.qa_model {
            self.qa.model = model;
        }
        if let Some(collection) = overrides.qa_collection {
            self.qa.retriever.collection = collection;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_slack(&self.slack)?;
        validate_openai(&self.openai)?;
        validate_qa(&self.qa)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("pagebot.toml"), PathBuf::from("config/pagebot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

pub fn detect_config_path() -> Option<PathBuf> {
    resolve_config_path(None)
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
    database.target()?;

    if !database.socket_root.starts_with('/') {
        return Err(ConfigError::Validation(
            "database.socket_root must be an absolute directory path".to_string(),
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

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::MissingSetting {
            key: "slack.bot_token",
            var: SLACK_BOT_TOKEN_ENV,
        });
    }
    if !bot_token.starts_with("xoxb-") {
        return Err(ConfigError::Validation(
            "slack.bot_token must start with `xoxb-`. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions".to_string(),
        ));
    }

    if slack.signing_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::MissingSetting {
            key: "slack.signing_secret",
            var: SLACK_SIGNING_SECRET_ENV,
        });
    }

    validate_http_url("slack.api_base_url", &slack.api_base_url)
}

fn validate_openai(openai: &OpenAiConfig) -> Result<(), ConfigError> {
    if openai.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::MissingSetting {
            key: "openai.api_key",
            var: OPENAI_API_KEY_ENV,
        });
    }

    if openai.embedding_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "openai.embedding_model must not be empty".to_string(),
        ));
    }

    if openai.timeout_secs == 0 || openai.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "openai.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    validate_http_url("openai.base_url", &openai.base_url)
}

fn validate_qa(qa: &QaConfig) -> Result<(), ConfigError> {
    if qa.model.trim().is_empty() {
        return Err(ConfigError::Validation("qa.model must not be empty".to_string()));
    }

    if !(0.0..=2.0).contains(&qa.temperature) {
        return Err(ConfigError::Validation(
            "qa.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if qa.retriever.collection.trim().is_empty() {
        return Err(ConfigError::Validation("qa.collection must not be empty".to_string()));
    }

    if qa.retriever.top_k == 0 {
        return Err(ConfigError::Validation("qa.top_k must be greater than zero".to_string()));
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

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{key} must start with http:// or https://")))
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.trim().parse::<f32>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    slack: Option<SlackPatch>,
    openai: Option<OpenAiPatch>,
    qa: Option<QaPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    instance_connection_name: Option<String>,
    name: Option<String>,
    user: Option<String>,
    password: Option<String>,
    socket_root: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    bot_token: Option<String>,
    signing_secret: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    embedding_model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct QaPatch {
    model: Option<String>,
    temperature: Option<f32>,
    chain_type: Option<String>,
    collection: Option<String>,
    top_k: Option<usize>,
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

    use super::{
        AppConfig, ChainType, ConfigError, ConfigOverrides, DatabaseConfig, LoadOptions,
        LogFormat,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const REQUIRED_VARS: &[(&str, &str)] = &[
        ("INSTANCE_CONNECTION_NAME", "proj:asia-northeast1:docs"),
        ("DB_NAME", "vectors"),
        ("DB_USER", "bot"),
        ("DB_PASSWORD", "p@ss word"),
        ("SLACK_BOT_TOKEN", "xoxb-test"),
        ("SLACK_SIGNING_SECRET", "signing-secret"),
        ("OPENAI_API_KEY", "sk-test"),
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn set_vars(vars: &[(&str, &str)]) {
        for (key, value) in vars {
            env::set_var(key, value);
        }
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn clear_required() {
        let keys: Vec<&str> = REQUIRED_VARS.iter().map(|(key, _)| *key).collect();
        clear_vars(&keys);
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    fn database_config() -> DatabaseConfig {
        DatabaseConfig {
            instance_connection_name: Some("proj:region:inst".to_string()),
            name: Some("vectors".to_string()),
            user: Some("bot".to_string()),
            password: Some("secret".to_string().into()),
            socket_root: "/cloudsql".to_string(),
            max_connections: 5,
            timeout_secs: 30,
        }
    }

    #[test]
    fn target_builds_cloud_sql_socket_path_and_connection_string() {
        let mut database = database_config();
        database.user = Some("bot".to_string());
        database.password = Some("p@ss word".to_string().into());
        database.socket_root = "/cloudsql/".to_string();

        let target = database.target().expect("target should resolve");

        assert_eq!(target.socket_path, "/cloudsql/proj:region:inst");
        assert_eq!(target.password.expose_secret(), "p@ss word");
        assert_eq!(
            target.to_string(),
            "postgresql://bot:***@/vectors?host=/cloudsql/proj:region:inst"
        );
    }

    #[test]
    fn target_fails_naming_each_missing_variable() {
        let cases: [(&str, fn(&mut DatabaseConfig)); 4] = [
            ("INSTANCE_CONNECTION_NAME", |db| db.instance_connection_name = None),
            ("DB_NAME", |db| db.name = None),
            ("DB_USER", |db| db.user = Some("  ".to_string())),
            ("DB_PASSWORD", |db| db.password = None),
        ];

        for (expected_var, clear) in cases {
            let mut database = database_config();
            clear(&mut database);

            match database.target() {
                Err(ConfigError::MissingSetting { var, .. }) => assert_eq!(var, expected_var),
                other => panic!("expected missing {expected_var}, got {other:?}"),
            }
        }
    }

    #[test]
    fn load_reads_well_known_environment_names() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_vars(REQUIRED_VARS);

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let target = config.database.target().map_err(|err| err.to_string())?;

            ensure(target.database == "vectors", "database name should come from DB_NAME")?;
            ensure(target.user == "bot", "database user should come from DB_USER")?;
            ensure(
                config.slack.signing_secret.expose_secret() == "signing-secret",
                "signing secret should come from SLACK_SIGNING_SECRET",
            )?;
            ensure(config.qa.model == "gpt-4", "default model should be gpt-4")?;
            ensure(config.qa.temperature == 0.0, "default temperature should be zero")?;
            ensure(config.qa.chain_type == ChainType::Stuff, "default chain should be stuff")?;
            ensure(config.qa.retriever.collection == "pages", "default collection is pages")?;
            Ok(())
        })();

        clear_required();
        result
    }

    #[test]
    fn load_fails_when_a_database_variable_is_missing() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_vars(REQUIRED_VARS);
        env::remove_var("DB_PASSWORD");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected missing DB_PASSWORD failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::MissingSetting { var: "DB_PASSWORD", .. }),
                "error should name DB_PASSWORD",
            )
        })();

        clear_required();
        result
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_vars(REQUIRED_VARS);
        env::set_var("TEST_PAGEBOT_COLLECTION", "handbook");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("pagebot.toml");
            fs::write(
                &path,
                r#"
[qa]
collection = "${TEST_PAGEBOT_COLLECTION}"
top_k = 6
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.qa.retriever.collection == "handbook",
                "collection should be interpolated from environment",
            )?;
            ensure(config.qa.retriever.top_k == 6, "top_k should be read from file")?;
            Ok(())
        })();

        clear_vars(&["TEST_PAGEBOT_COLLECTION"]);
        clear_required();
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_vars(REQUIRED_VARS);
        env::set_var("PAGEBOT_QA_MODEL", "gpt-4-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("pagebot.toml");
            fs::write(
                &path,
                r#"
[database]
name = "from-file"

[qa]
model = "gpt-4-from-file"

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
                config.database.name.as_deref() == Some("vectors"),
                "env database name should win over file",
            )?;
            ensure(config.qa.model == "gpt-4-from-env", "env model should win over file")?;
            ensure(config.logging.level == "debug", "override log level should win")?;
            Ok(())
        })();

        clear_vars(&["PAGEBOT_QA_MODEL"]);
        clear_required();
        result
    }

    #[test]
    fn unsupported_chain_type_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_vars(REQUIRED_VARS);
        env::set_var("PAGEBOT_QA_CHAIN_TYPE", "map_reduce");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected chain type validation failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::Validation(ref message) if message.contains("map_reduce")
                ),
                "error should mention the rejected chain type",
            )
        })();

        clear_vars(&["PAGEBOT_QA_CHAIN_TYPE"]);
        clear_required();
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        set_vars(REQUIRED_VARS);

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("p@ss word"), "debug output should not contain db password")?;
            ensure(!debug.contains("signing-secret"), "debug output should not contain secret")?;
            ensure(!debug.contains("sk-test"), "debug output should not contain api key")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_required();
        result
    }
}
