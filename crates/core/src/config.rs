use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{FixedOffset, Offset, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub identity: IdentityConfig,
    pub pricing: PricingConfig,
    pub reporting: ReportingConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct IdentityConfig {
    pub admin_handle: String,
    pub admin_password: SecretString,
}

#[derive(Clone, Debug)]
pub struct PricingConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
    pub currency: String,
    pub language: String,
}

#[derive(Clone, Debug)]
pub struct ReportingConfig {
    /// Offset of the desk's local clock; day-granular filters and monthly buckets use it.
    pub utc_offset: FixedOffset,
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
    pub admin_password: Option<String>,
    pub pricing_enabled: Option<bool>,
    pub pricing_api_key: Option<String>,
    pub utc_offset: Option<String>,
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

pub const DEFAULT_UTC_OFFSET_SECS: i32 = 8 * 3600;

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://tripdesk.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            identity: IdentityConfig {
                admin_handle: "admin".to_string(),
                admin_password: String::new().into(),
            },
            pricing: PricingConfig {
                enabled: false,
                base_url: "https://serpapi.com/search.json".to_string(),
                api_key: None,
                timeout_secs: 10,
                currency: "CNY".to_string(),
                language: "zh-cn".to_string(),
            },
            reporting: ReportingConfig { utc_offset: default_offset() },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn default_offset() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
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

/// Parses `+HH:MM`, `-HH:MM`, `+HHMM`, `+HH` or `Z`.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset, ConfigError> {
    let invalid = || {
        ConfigError::Validation(format!(
            "reporting.utc_offset `{raw}` must look like +08:00 or -05:30"
        ))
    };

    let value = raw.trim();
    if value.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, rest) = if let Some(rest) = value.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = value.strip_prefix('-') {
        (-1, rest)
    } else {
        return Err(invalid());
    };
    let digits: String = rest.chars().filter(|ch| *ch != ':').collect();
    if !(digits.len() == 2 || digits.len() == 4) || !digits.chars().all(|ch| ch.is_ascii_digit())
    {
        return Err(invalid());
    }

    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = if digits.len() == 4 { digits[2..].parse().map_err(|_| invalid())? } else { 0 };
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("tripdesk.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides)?;
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
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

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(identity) = patch.identity {
            if let Some(admin_handle) = identity.admin_handle {
                self.identity.admin_handle = admin_handle;
            }
            if let Some(admin_password) = identity.admin_password {
                self.identity.admin_password = secret_value(admin_password);
            }
        }

        if let Some(pricing) = patch.pricing {
            if let Some(enabled) = pricing.enabled {
                self.pricing.enabled = enabled;
            }
            if let Some(base_url) = pricing.base_url {
                self.pricing.base_url = base_url;
            }
            if let Some(api_key) = pricing.api_key {
                self.pricing.api_key = Some(secret_value(api_key));
            }
            if let Some(timeout_secs) = pricing.timeout_secs {
                self.pricing.timeout_secs = timeout_secs;
            }
            if let Some(currency) = pricing.currency {
                self.pricing.currency = currency;
            }
            if let Some(language) = pricing.language {
                self.pricing.language = language;
            }
        }

        if let Some(reporting) = patch.reporting {
            if let Some(utc_offset) = reporting.utc_offset {
                self.reporting.utc_offset = parse_utc_offset(&utc_offset)?;
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
        if let Some(value) = read_env("TRIPDESK_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TRIPDESK_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("TRIPDESK_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TRIPDESK_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TRIPDESK_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TRIPDESK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TRIPDESK_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("TRIPDESK_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("TRIPDESK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("TRIPDESK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("TRIPDESK_IDENTITY_ADMIN_HANDLE") {
            self.identity.admin_handle = value;
        }
        if let Some(value) = read_env("TRIPDESK_IDENTITY_ADMIN_PASSWORD") {
            self.identity.admin_password = secret_value(value);
        }

        if let Some(value) = read_env("TRIPDESK_PRICING_ENABLED") {
            self.pricing.enabled = parse_bool("TRIPDESK_PRICING_ENABLED", &value)?;
        }
        if let Some(value) = read_env("TRIPDESK_PRICING_BASE_URL") {
            self.pricing.base_url = value;
        }
        if let Some(value) = read_env("TRIPDESK_PRICING_API_KEY") {
            self.pricing.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TRIPDESK_PRICING_TIMEOUT_SECS") {
            self.pricing.timeout_secs = parse_u64("TRIPDESK_PRICING_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TRIPDESK_PRICING_CURRENCY") {
            self.pricing.currency = value;
        }
        if let Some(value) = read_env("TRIPDESK_PRICING_LANGUAGE") {
            self.pricing.language = value;
        }

        if let Some(value) = read_env("TRIPDESK_REPORTING_UTC_OFFSET") {
            self.reporting.utc_offset = parse_utc_offset(&value).map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "TRIPDESK_REPORTING_UTC_OFFSET".to_string(),
                    value: value.clone(),
                }
            })?;
        }

        let log_level =
            read_env("TRIPDESK_LOGGING_LEVEL").or_else(|| read_env("TRIPDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TRIPDESK_LOGGING_FORMAT").or_else(|| read_env("TRIPDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) -> Result<(), ConfigError> {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(admin_password) = overrides.admin_password {
            self.identity.admin_password = secret_value(admin_password);
        }
        if let Some(enabled) = overrides.pricing_enabled {
            self.pricing.enabled = enabled;
        }
        if let Some(api_key) = overrides.pricing_api_key {
            self.pricing.api_key = Some(secret_value(api_key));
        }
        if let Some(utc_offset) = overrides.utc_offset {
            self.reporting.utc_offset = parse_utc_offset(&utc_offset)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_identity(&self.identity)?;
        validate_pricing(&self.pricing)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("tripdesk.toml"), PathBuf::from("config/tripdesk.toml")]
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
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_identity(identity: &IdentityConfig) -> Result<(), ConfigError> {
    if identity.admin_handle.trim().is_empty() {
        return Err(ConfigError::Validation(
            "identity.admin_handle must not be empty".to_string(),
        ));
    }

    if identity.admin_password.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "identity.admin_password is required (set TRIPDESK_IDENTITY_ADMIN_PASSWORD)"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    if !pricing.base_url.starts_with("http://") && !pricing.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "pricing.base_url must start with http:// or https://".to_string(),
        ));
    }

    if pricing.timeout_secs == 0 || pricing.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "pricing.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if pricing.enabled {
        let missing = pricing
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "pricing.api_key is required when pricing.enabled is true".to_string(),
            ));
        }
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

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    identity: Option<IdentityPatch>,
    pricing: Option<PricingPatch>,
    reporting: Option<ReportingPatch>,
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
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct IdentityPatch {
    admin_handle: Option<String>,
    admin_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    enabled: Option<bool>,
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
    currency: Option<String>,
    language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReportingPatch {
    utc_offset: Option<String>,
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

    use super::{parse_utc_offset, AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

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
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_TRIPDESK_ADMIN_PASSWORD", "from-env");
        env::set_var("TEST_TRIPDESK_PRICING_KEY", "serp-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("tripdesk.toml");
            fs::write(
                &path,
                r#"
[identity]
admin_password = "${TEST_TRIPDESK_ADMIN_PASSWORD}"

[pricing]
enabled = true
api_key = "${TEST_TRIPDESK_PRICING_KEY}"

[reporting]
utc_offset = "+05:30"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.identity.admin_password.expose_secret() == "from-env",
                "admin password should be loaded from environment",
            )?;
            ensure(
                config.pricing.api_key.as_ref().map(|key| key.expose_secret() == "serp-from-env")
                    == Some(true),
                "pricing key should be loaded from environment",
            )?;
            ensure(
                config.reporting.utc_offset.local_minus_utc() == 5 * 3600 + 30 * 60,
                "reporting offset should come from the file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_TRIPDESK_ADMIN_PASSWORD", "TEST_TRIPDESK_PRICING_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TRIPDESK_IDENTITY_ADMIN_PASSWORD", "admin123");
        env::set_var("TRIPDESK_LOG_LEVEL", "warn");
        env::set_var("TRIPDESK_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            ensure(config.identity.admin_handle == "admin", "admin handle defaults to admin")?;
            ensure(
                config.reporting.utc_offset.local_minus_utc() == 8 * 3600,
                "reporting offset defaults to +08:00",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "TRIPDESK_IDENTITY_ADMIN_PASSWORD",
            "TRIPDESK_LOG_LEVEL",
            "TRIPDESK_LOG_FORMAT",
        ]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TRIPDESK_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("TRIPDESK_IDENTITY_ADMIN_PASSWORD", "env-password");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("tripdesk.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[identity]
admin_handle = "desk-admin"
admin_password = "file-password"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.identity.admin_handle == "desk-admin", "file admin handle should apply")?;
            ensure(
                config.identity.admin_password.expose_secret() == "env-password",
                "env admin password should win over the file",
            )?;
            Ok(())
        })();

        clear_vars(&["TRIPDESK_DATABASE_URL", "TRIPDESK_IDENTITY_ADMIN_PASSWORD"]);
        result
    }

    #[test]
    fn validation_fails_fast_without_admin_password() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["TRIPDESK_IDENTITY_ADMIN_PASSWORD"]);

        let error = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => return Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => error,
        };
        let has_message = matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("identity.admin_password")
        );
        ensure(has_message, "validation failure should mention identity.admin_password")
    }

    #[test]
    fn enabled_pricing_requires_api_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                admin_password: Some("admin123".to_string()),
                pricing_enabled: Some(true),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        ensure(
            matches!(result, Err(ConfigError::Validation(ref message)) if message.contains("pricing.api_key")),
            "enabled pricing without a key should fail validation",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TRIPDESK_IDENTITY_ADMIN_PASSWORD", "hunter2-admin-secret");
        env::set_var("TRIPDESK_PRICING_API_KEY", "serp-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("hunter2-admin-secret"),
                "debug output should not contain admin password",
            )?;
            ensure(
                !debug.contains("serp-secret-value"),
                "debug output should not contain pricing key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["TRIPDESK_IDENTITY_ADMIN_PASSWORD", "TRIPDESK_PRICING_API_KEY"]);
        result
    }

    #[test]
    fn utc_offset_parsing_accepts_common_shapes() {
        let cases = [("+08:00", 8 * 3600), ("-05:30", -(5 * 3600 + 30 * 60)), ("+0100", 3600), ("Z", 0)];
        for (raw, seconds) in cases {
            let offset = parse_utc_offset(raw).expect("valid offset");
            assert_eq!(offset.local_minus_utc(), seconds, "{raw}");
        }

        assert!(parse_utc_offset("08:00").is_err());
        assert!(parse_utc_offset("+25:00").is_err());
    }
}
