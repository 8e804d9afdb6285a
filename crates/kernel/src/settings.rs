use std::path::PathBuf;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV: &str = "local";
const ENV_VAR_NAME: &str = "BOOKSHELF_ENV";
const CONFIG_DIR_ENV: &str = "BOOKSHELF_CONFIG_DIR";

/// Plain environment variables honoured on top of the `BOOKSHELF_*` layer,
/// mapped to the configuration key they override.
const PLAIN_ENV_OVERRIDES: &[(&str, &str)] = &[
    ("DB_SERVER", "database.host"),
    ("DB_PORT", "database.port"),
    ("DB_USER", "database.user"),
    ("DB_PASSWORD", "database.password"),
    ("DB_DATABASE", "database.name"),
    ("PORT", "server.port"),
];

/// Deployment environment the application is running in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Local,
    Staging,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "local" => Ok(Environment::Local),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(anyhow!(
                "unsupported environment '{}'; expected local/staging/production",
                other
            )),
        }
    }
}

/// Top-level configuration structure loaded from layered sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
}

impl Settings {
    /// Load configuration by layering `.env`, base file, environment overlay,
    /// `BOOKSHELF_*` variables and finally the plain `DB_*` / `PORT` variables.
    pub fn load() -> anyhow::Result<Self> {
        // Allow missing `.env` files without failing.
        let _ = dotenvy::dotenv();

        let environment = std::env::var(ENV_VAR_NAME).unwrap_or_else(|_| DEFAULT_ENV.to_string());
        let config_dir = match std::env::var(CONFIG_DIR_ENV) {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => std::env::current_dir()
                .context("unable to resolve current directory")?
                .join("config"),
        };

        let base_path = config_dir.join("base.toml");
        let environment_path = config_dir.join(format!("{}.toml", environment));

        let mut builder = config::Config::builder()
            .add_source(config::File::from(base_path).required(false))
            .add_source(config::File::from(environment_path).required(false))
            .add_source(
                config::Environment::with_prefix("BOOKSHELF")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        for (var, key) in PLAIN_ENV_OVERRIDES {
            builder = builder
                .set_override_option(*key, std::env::var(var).ok())
                .with_context(|| format!("failed to apply {} override", var))?;
        }

        let cfg = builder
            .build()
            .with_context(|| "failed to build configuration")?;

        let mut settings: Settings = cfg
            .try_deserialize()
            .with_context(|| "failed to deserialize configuration")?;

        settings.environment = environment.parse()?;

        Ok(settings)
    }

    /// Copy of the settings safe to print: secrets replaced.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.database.password.is_some() {
            copy.database.password = Some("********".to_string());
        }
        copy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "ServerSettings::default_host")]
    pub host: String,
    #[serde(default = "ServerSettings::default_port")]
    pub port: u16,
    #[serde(default = "ServerSettings::default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl ServerSettings {
    fn default_host() -> String {
        "0.0.0.0".to_string()
    }

    fn default_port() -> u16 {
        5050
    }

    fn default_request_timeout_ms() -> u64 {
        15000
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            request_timeout_ms: Self::default_request_timeout_ms(),
        }
    }
}

/// Connection and pool settings for the relational store.
///
/// `host`, `user`, `password` and `name` have no defaults; the connection
/// manager refuses to start without them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "DatabaseSettings::default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "DatabaseSettings::default_max_connections")]
    pub max_connections: u32,
    #[serde(default)]
    pub min_connections: u32,
    #[serde(default = "DatabaseSettings::default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    #[serde(default = "DatabaseSettings::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "DatabaseSettings::default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
}

impl DatabaseSettings {
    fn default_port() -> u16 {
        5432
    }

    fn default_max_connections() -> u32 {
        10
    }

    fn default_idle_timeout_ms() -> u64 {
        30000
    }

    fn default_connect_timeout_ms() -> u64 {
        15000
    }

    fn default_statement_timeout_ms() -> u64 {
        15000
    }

    /// `host:port/name` for log lines; never includes credentials.
    pub fn endpoint(&self) -> String {
        format!(
            "{}:{}/{}",
            self.host.as_deref().unwrap_or("<unset>"),
            self.port,
            self.name.as_deref().unwrap_or("<unset>")
        )
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: Self::default_port(),
            user: None,
            password: None,
            name: None,
            max_connections: Self::default_max_connections(),
            min_connections: 0,
            idle_timeout_ms: Self::default_idle_timeout_ms(),
            connect_timeout_ms: Self::default_connect_timeout_ms(),
            statement_timeout_ms: Self::default_statement_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySettings {
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default = "TelemetrySettings::default_log_filter")]
    pub log_filter: String,
    #[serde(default = "TelemetrySettings::default_metrics_enabled")]
    pub metrics_enabled: bool,
}

impl TelemetrySettings {
    fn default_log_filter() -> String {
        "info".to_string()
    }

    fn default_metrics_enabled() -> bool {
        true
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Pretty,
            log_filter: Self::default_log_filter(),
            metrics_enabled: Self::default_metrics_enabled(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Per-client request budget over a sliding window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "RateLimitSettings::default_enabled")]
    pub enabled: bool,
    #[serde(default = "RateLimitSettings::default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "RateLimitSettings::default_max_requests")]
    pub max_requests: usize,
}

impl RateLimitSettings {
    fn default_enabled() -> bool {
        true
    }

    fn default_window_secs() -> u64 {
        15 * 60
    }

    fn default_max_requests() -> usize {
        20
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            window_secs: Self::default_window_secs(),
            max_requests: Self::default_max_requests(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_environment_is_local() {
        let settings = Settings::default();
        assert_eq!(settings.environment, Environment::Local);
    }

    #[test]
    fn default_database_has_no_credentials() {
        let settings = Settings::default();
        assert!(settings.database.host.is_none());
        assert!(settings.database.user.is_none());
        assert!(settings.database.password.is_none());
        assert_eq!(settings.database.port, 5432);
        assert_eq!(settings.database.max_connections, 10);
        assert_eq!(settings.database.min_connections, 0);
    }

    #[test]
    fn default_rate_limit_is_twenty_per_fifteen_minutes() {
        let settings = RateLimitSettings::default();
        assert!(settings.enabled);
        assert_eq!(settings.window_secs, 900);
        assert_eq!(settings.max_requests, 20);
    }

    #[test]
    fn environment_parses_known_names_only() {
        assert_eq!("staging".parse::<Environment>().unwrap(), Environment::Staging);
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn redacted_hides_password() {
        let mut settings = Settings::default();
        settings.database.password = Some("hunter2".to_string());
        let redacted = settings.redacted();
        assert_eq!(redacted.database.password.as_deref(), Some("********"));
        assert_eq!(settings.database.password.as_deref(), Some("hunter2"));
    }

    #[test]
    fn endpoint_omits_credentials() {
        let database = DatabaseSettings {
            host: Some("db.internal".to_string()),
            user: Some("reader".to_string()),
            password: Some("secret".to_string()),
            name: Some("library".to_string()),
            ..DatabaseSettings::default()
        };
        assert_eq!(database.endpoint(), "db.internal:5432/library");
    }
}
