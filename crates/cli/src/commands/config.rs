use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use deckbot_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, env_keys, value) in effective_values(&config) {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

/// Key path, environment variables that can set it, and the rendered value.
type Field = (&'static str, &'static [&'static str], String);

/// Every reported field. Secrets are redacted.
fn effective_values(config: &AppConfig) -> Vec<Field> {
    let fields: [Field; 16] = [
        ("database.url", &["DECKBOT_DATABASE_URL"], config.database.url.clone()),
        (
            "database.max_connections",
            &["DECKBOT_DATABASE_MAX_CONNECTIONS"],
            config.database.max_connections.to_string(),
        ),
        (
            "database.timeout_secs",
            &["DECKBOT_DATABASE_TIMEOUT_SECS"],
            config.database.timeout_secs.to_string(),
        ),
        (
            "server.bind_address",
            &["DECKBOT_SERVER_BIND_ADDRESS"],
            config.server.bind_address.clone(),
        ),
        ("server.port", &["DECKBOT_SERVER_PORT"], config.server.port.to_string()),
        (
            "server.graceful_shutdown_secs",
            &["DECKBOT_SERVER_GRACEFUL_SHUTDOWN_SECS"],
            config.server.graceful_shutdown_secs.to_string(),
        ),
        ("line.api_base_url", &["DECKBOT_LINE_API_BASE_URL"], config.line.api_base_url.clone()),
        (
            "bus.endpoint",
            &["DECKBOT_BUS_ENDPOINT"],
            config.bus.endpoint.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        ("bus.bus_name", &["DECKBOT_BUS_NAME"], config.bus.bus_name.clone()),
        (
            "bus.api_key",
            &["DECKBOT_BUS_API_KEY"],
            if config.bus.api_key.is_some() { "<redacted>" } else { "<unset>" }.to_string(),
        ),
        ("bus.timeout_secs", &["DECKBOT_BUS_TIMEOUT_SECS"], config.bus.timeout_secs.to_string()),
        ("webhook.mode", &["DECKBOT_WEBHOOK_MODE"], config.webhook.mode.as_str().to_string()),
        (
            "webhook.slide_command",
            &["DECKBOT_WEBHOOK_SLIDE_COMMAND"],
            config.webhook.slide_command.clone(),
        ),
        (
            "slides.channel_id",
            &["DECKBOT_SLIDES_CHANNEL_ID"],
            config.slides.channel_id.to_string(),
        ),
        (
            "logging.level",
            &["DECKBOT_LOGGING_LEVEL", "DECKBOT_LOG_LEVEL"],
            config.logging.level.clone(),
        ),
        (
            "logging.format",
            &["DECKBOT_LOGGING_FORMAT", "DECKBOT_LOG_FORMAT"],
            format!("{:?}", config.logging.format).to_lowercase(),
        ),
    ];
    fields.into()
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("deckbot.toml"), PathBuf::from("config/deckbot.toml")]
        .into_iter()
        .find(|path| path.exists())
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
