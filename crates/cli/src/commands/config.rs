use std::env;
use std::fs;
use std::path::Path;

use pagebot_core::config::{
    detect_config_path, AppConfig, LoadOptions, DB_NAME_ENV, DB_PASSWORD_ENV, DB_USER_ENV,
    INSTANCE_CONNECTION_NAME_ENV, OPENAI_API_KEY_ENV, SLACK_BOT_TOKEN_ENV,
    SLACK_SIGNING_SECRET_ENV,
};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::{CommandResult, EXIT_CONFIG};

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    let target = match config.database.target() {
        Ok(target) => target.to_string(),
        Err(error) => format!("<unresolved: {error}>"),
    };
    lines.push(render_line("database.target", &target, "derived".to_string()));

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let database = &config.database;
    let password =
        if database.password.is_some() { "<redacted>".to_string() } else { "<unset>".to_string() };

    vec![
        Field {
            key: "database.instance_connection_name",
            value: optional(database.instance_connection_name.as_deref()),
            env_keys: &[INSTANCE_CONNECTION_NAME_ENV],
        },
        Field {
            key: "database.name",
            value: optional(database.name.as_deref()),
            env_keys: &[DB_NAME_ENV],
        },
        Field {
            key: "database.user",
            value: optional(database.user.as_deref()),
            env_keys: &[DB_USER_ENV],
        },
        Field { key: "database.password", value: password, env_keys: &[DB_PASSWORD_ENV] },
        Field {
            key: "database.socket_root",
            value: database.socket_root.clone(),
            env_keys: &["PAGEBOT_DATABASE_SOCKET_ROOT"],
        },
        Field {
            key: "database.max_connections",
            value: database.max_connections.to_string(),
            env_keys: &["PAGEBOT_DATABASE_MAX_CONNECTIONS"],
        },
        Field {
            key: "database.timeout_secs",
            value: database.timeout_secs.to_string(),
            env_keys: &["PAGEBOT_DATABASE_TIMEOUT_SECS"],
        },
        Field {
            key: "slack.bot_token",
            value: redact_token(config.slack.bot_token.expose_secret()),
            env_keys: &[SLACK_BOT_TOKEN_ENV],
        },
        Field {
            key: "slack.signing_secret",
            value: "<redacted>".to_string(),
            env_keys: &[SLACK_SIGNING_SECRET_ENV],
        },
        Field {
            key: "slack.api_base_url",
            value: config.slack.api_base_url.clone(),
            env_keys: &["PAGEBOT_SLACK_API_BASE_URL"],
        },
        Field {
            key: "openai.api_key",
            value: redact_token(config.openai.api_key.expose_secret()),
            env_keys: &[OPENAI_API_KEY_ENV],
        },
        Field {
            key: "openai.base_url",
            value: config.openai.base_url.clone(),
            env_keys: &["PAGEBOT_OPENAI_BASE_URL"],
        },
        Field {
            key: "openai.embedding_model",
            value: config.openai.embedding_model.clone(),
            env_keys: &["PAGEBOT_OPENAI_EMBEDDING_MODEL"],
        },
        Field { key: "qa.model", value: config.qa.model.clone(), env_keys: &["PAGEBOT_QA_MODEL"] },
        Field {
            key: "qa.temperature",
            value: config.qa.temperature.to_string(),
            env_keys: &["PAGEBOT_QA_TEMPERATURE"],
        },
        Field {
            key: "qa.chain_type",
            value: config.qa.chain_type.as_str().to_string(),
            env_keys: &["PAGEBOT_QA_CHAIN_TYPE"],
        },
        Field {
            key: "qa.retriever.collection",
            value: config.qa.retriever.collection.clone(),
            env_keys: &["PAGEBOT_QA_COLLECTION"],
        },
        Field {
            key: "qa.retriever.top_k",
            value: config.qa.retriever.top_k.to_string(),
            env_keys: &["PAGEBOT_QA_TOP_K"],
        },
        Field {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["PAGEBOT_SERVER_BIND_ADDRESS"],
        },
        Field {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["PAGEBOT_SERVER_PORT", "PORT"],
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["PAGEBOT_LOGGING_LEVEL", "PAGEBOT_LOG_LEVEL"],
        },
        Field {
            key: "logging.format",
            value: format!("{:?}", config.logging.format).to_lowercase(),
            env_keys: &["PAGEBOT_LOGGING_FORMAT", "PAGEBOT_LOG_FORMAT"],
        },
    ]
}

fn optional(value: Option<&str>) -> String {
    value.map(str::to_string).unwrap_or_else(|| "<unset>".to_string())
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

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
