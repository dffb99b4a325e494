use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const CONFIG_DIR: &str = "config";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_MIN_CONNECTIONS: u32 = 1;
const DEFAULT_EVENT_BUFFER: usize = 256;

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_min_connections() -> u32 {
    DEFAULT_MIN_CONNECTIONS
}

fn default_event_buffer() -> usize {
    DEFAULT_EVENT_BUFFER
}

/// Database pool configuration
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct DatabaseConfig {
    #[serde(default = "default_max_connections")]
    #[validate(range(min = 1, max = 1024))]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            auto_migrate: false,
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Database pool settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Buffered capacity of the in-process event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Builds whose defect_count meets or exceeds this value emit a
    /// DefectThresholdExceeded event. None disables the alert.
    #[serde(default)]
    pub defect_alert_threshold: Option<i32>,
}

impl AppConfig {
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Loads configuration from `config/default.toml`, an environment-specific
/// overlay (`config/{environment}.toml`), and `APP_`-prefixed environment
/// variables, in increasing priority order.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let environment = env::var("APP_ENVIRONMENT").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let mut builder = Config::builder()
        .set_default("environment", environment.clone())?
        .add_source(File::from(Path::new(CONFIG_DIR).join("default")).required(false))
        .add_source(File::from(Path::new(CONFIG_DIR).join(&environment)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"));

    // DATABASE_URL wins over file-based settings when present, matching how
    // deployments inject credentials.
    if let Ok(url) = env::var("DATABASE_URL") {
        builder = builder.set_override("database_url", url)?;
    }

    let config: AppConfig = builder.build()?.try_deserialize()?;
    config.validate()?;

    info!(
        "Configuration loaded: environment={}, log_level={}",
        config.environment, config.log_level
    );

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_defaults_are_sane() {
        let db = DatabaseConfig::default();
        assert_eq!(db.max_connections, 10);
        assert_eq!(db.min_connections, 1);
        assert!(!db.auto_migrate);
    }

    #[test]
    fn validation_rejects_empty_database_url() {
        let config = AppConfig {
            database_url: String::new(),
            environment: "test".to_string(),
            log_level: "info".to_string(),
            log_json: false,
            database: DatabaseConfig::default(),
            event_buffer: 16,
            defect_alert_threshold: None,
        };
        assert!(config.validate().is_err());
    }
}
