//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `greenhub.toml` in the working directory (or the file named by
//! `GREENHUB_CONFIG`). Every field has a sensible default so the file is
//! optional. Environment variables take precedence over file values.

use std::time::Duration;

use serde::Deserialize;

use greenhub_adapter_mqtt::MqttConfig;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Message bus settings.
    pub mqtt: MqttConfig,
    /// Ingestion queue sizes.
    pub ingestion: IngestionConfig,
    pub shutdown: ShutdownConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
    pub max_connections: u32,
    /// Wait on a locked database before a query fails.
    pub busy_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Pending messages per device worker.
    pub device_queue_capacity: usize,
    /// Pending discovery payloads.
    pub discovery_queue_capacity: usize,
    /// Pending telemetry history records.
    pub history_queue_capacity: usize,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time granted to in-flight work once shutdown starts.
    pub grace_period_secs: u64,
}

impl Config {
    /// Load configuration from `greenhub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("GREENHUB_CONFIG").unwrap_or_else(|_| "greenhub.toml".to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("GREENHUB_HOST") {
            self.server.host = val;
        }
        if let Some(port) = var("GREENHUB_PORT").and_then(|val| val.parse().ok()) {
            self.server.port = port;
        }
        if let Some(val) = var("GREENHUB_BIND")
            && let Some((host, port)) = val.rsplit_once(':')
        {
            self.server.host = host.to_string();
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Some(val) = var("GREENHUB_DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = var("GREENHUB_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("GREENHUB_MQTT_HOST") {
            self.mqtt.broker_host = val;
        }
        if let Some(port) = var("GREENHUB_MQTT_PORT").and_then(|val| val.parse().ok()) {
            self.mqtt.broker_port = port;
        }
        if let Some(val) = var("GREENHUB_MQTT_BASE_TOPIC") {
            self.mqtt.base_topic = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database max_connections must be non-zero".to_string(),
            ));
        }
        if self.mqtt.broker_port == 0 {
            return Err(ConfigError::Validation(
                "mqtt broker port must be non-zero".to_string(),
            ));
        }
        if self.mqtt.base_topic.trim().is_empty() {
            return Err(ConfigError::Validation(
                "mqtt base topic must not be empty".to_string(),
            ));
        }
        if self.mqtt.max_initial_attempts == 0 || self.mqtt.request_capacity == 0 {
            return Err(ConfigError::Validation(
                "mqtt connection attempts and request capacity must be non-zero".to_string(),
            ));
        }
        let ingestion = &self.ingestion;
        if ingestion.device_queue_capacity == 0
            || ingestion.discovery_queue_capacity == 0
            || ingestion.history_queue_capacity == 0
        {
            return Err(ConfigError::Validation(
                "queue capacities must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Settings of the storage adapter.
    #[must_use]
    pub fn storage(&self) -> greenhub_adapter_storage_sqlite_sqlx::Config {
        greenhub_adapter_storage_sqlite_sqlx::Config::new(self.database.url.as_str())
            .with_max_connections(self.database.max_connections)
            .with_busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
    }

    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown.grace_period_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:greenhub.db?mode=rwc".to_string(),
            max_connections: 4,
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "greenhubd=info,greenhub=info,tower_http=debug".to_string(),
        }
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            device_queue_capacity: 64,
            discovery_queue_capacity: 8,
            history_queue_capacity: 256,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 5,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.url, "sqlite:greenhub.db?mode=rwc");
        assert_eq!(config.mqtt.base_topic, "zigbee2mqtt");
        assert_eq!(config.mqtt.permit_join_secs, 50);
        assert_eq!(config.grace_period(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.ingestion.device_queue_capacity, 64);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [server]
            host = '127.0.0.1'
            port = 9090

            [database]
            url = 'sqlite:test.db'
            max_connections = 8

            [logging]
            filter = 'debug'

            [mqtt]
            broker_host = 'broker.local'
            base_topic = 'z2m'
            permit_join_secs = 120

            [ingestion]
            device_queue_capacity = 16
            history_queue_capacity = 32

            [shutdown]
            grace_period_secs = 2
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.database.url, "sqlite:test.db");
        assert_eq!(config.storage().max_connections, 8);
        assert_eq!(config.storage().busy_timeout, Duration::from_secs(5));
        assert_eq!(config.logging.filter, "debug");
        assert_eq!(config.mqtt.broker_host, "broker.local");
        assert_eq!(config.mqtt.base_topic, "z2m");
        assert_eq!(config.mqtt.permit_join_secs, 120);
        assert_eq!(config.ingestion.device_queue_capacity, 16);
        assert_eq!(config.ingestion.discovery_queue_capacity, 8);
        assert_eq!(config.ingestion.history_queue_capacity, 32);
        assert_eq!(config.grace_period(), Duration::from_secs(2));
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn should_apply_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(overrides(&[
            ("GREENHUB_PORT", "8080"),
            ("GREENHUB_DATABASE_URL", "sqlite::memory:"),
            ("GREENHUB_MQTT_HOST", "10.0.0.2"),
            ("GREENHUB_MQTT_PORT", "1884"),
            ("GREENHUB_MQTT_BASE_TOPIC", "garden"),
            ("GREENHUB_LOG", "trace"),
        ]));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage().database_url, "sqlite::memory:");
        assert_eq!(config.mqtt.broker_host, "10.0.0.2");
        assert_eq!(config.mqtt.broker_port, 1884);
        assert_eq!(config.mqtt.base_topic, "garden");
        assert_eq!(config.logging.filter, "trace");
    }

    #[test]
    fn should_split_bind_override_into_host_and_port() {
        let mut config = Config::default();
        config.apply_overrides(overrides(&[("GREENHUB_BIND", "127.0.0.1:4000")]));
        assert_eq!(config.bind_addr(), "127.0.0.1:4000");
    }

    #[test]
    fn should_prefer_rust_log_over_greenhub_log() {
        let mut config = Config::default();
        config.apply_overrides(overrides(&[("GREENHUB_LOG", "info"), ("RUST_LOG", "debug")]));
        assert_eq!(config.logging.filter, "debug");
    }

    #[test]
    fn should_ignore_unparsable_port_override() {
        let mut config = Config::default();
        config.apply_overrides(overrides(&[("GREENHUB_PORT", "http")]));
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn should_reject_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_empty_connection_pool() {
        let mut config = Config::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_empty_base_topic() {
        let mut config = Config::default();
        config.mqtt.base_topic = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_reject_zero_queue_capacity() {
        let mut config = Config::default();
        config.ingestion.history_queue_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }
}
