use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use tripdesk_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// `(key path, rendered value, env override)` for every inspected field.
type Field = (&'static str, String, &'static str);

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in fields(&config) {
        let source =
            field_source(key, env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        ("database.url", config.database.url.clone(), "TRIPDESK_DATABASE_URL"),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            "TRIPDESK_DATABASE_MAX_CONNECTIONS",
        ),
        (
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "TRIPDESK_DATABASE_TIMEOUT_SECS",
        ),
        ("server.bind_address", config.server.bind_address.clone(), "TRIPDESK_SERVER_BIND_ADDRESS"),
        (
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            "TRIPDESK_SERVER_HEALTH_CHECK_PORT",
        ),
        (
            "identity.admin_handle",
            config.identity.admin_handle.clone(),
            "TRIPDESK_IDENTITY_ADMIN_HANDLE",
        ),
        (
            "identity.admin_password",
            redact_secret(Some(config.identity.admin_password.expose_secret())),
            "TRIPDESK_IDENTITY_ADMIN_PASSWORD",
        ),
        ("pricing.enabled", config.pricing.enabled.to_string(), "TRIPDESK_PRICING_ENABLED"),
        ("pricing.base_url", config.pricing.base_url.clone(), "TRIPDESK_PRICING_BASE_URL"),
        (
            "pricing.api_key",
            redact_secret(config.pricing.api_key.as_ref().map(|key| key.expose_secret())),
            "TRIPDESK_PRICING_API_KEY",
        ),
        ("pricing.currency", config.pricing.currency.clone(), "TRIPDESK_PRICING_CURRENCY"),
        (
            "reporting.utc_offset",
            config.reporting.utc_offset.to_string(),
            "TRIPDESK_REPORTING_UTC_OFFSET",
        ),
        ("logging.level", config.logging.level.clone(), "TRIPDESK_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "TRIPDESK_LOGGING_FORMAT"),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("tripdesk.toml"), PathBuf::from("config/tripdesk.toml")]
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
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
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

fn redact_secret(secret: Option<&str>) -> String {
    match secret.map(str::trim) {
        None => "<unset>".to_string(),
        Some("") => "<empty>".to_string(),
        Some(_) => "<redacted>".to_string(),
    }
}
