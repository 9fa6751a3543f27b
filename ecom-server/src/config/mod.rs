//! Configuration module for ecom-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;

use crate::config::file::FileConfig;
use ecom_core::bus::AmqpConfig;
use ecom_core::config::{ProjectorConfig, RelayConfig};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Which service this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ServiceRole {
    Catalog,
    Customers,
    Orders,
}

impl ServiceRole {
    pub fn name(self) -> &'static str {
        match self {
            ServiceRole::Catalog => "catalog",
            ServiceRole::Customers => "customers",
            ServiceRole::Orders => "orders",
        }
    }

    fn default_request_timeout(self) -> Duration {
        match self {
            ServiceRole::Catalog | ServiceRole::Customers => Duration::from_secs(2),
            ServiceRole::Orders => Duration::from_secs(3),
        }
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,

    #[error("AMQP_URL environment variable not set")]
    MissingAmqpUrl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Fully resolved and validated configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub bus: AmqpConfig,
    pub relay: RelayConfig,
    pub projector: ProjectorConfig,
}

/// Secrets taken from the environment when the file does not set them.
#[derive(Debug, Clone, Default)]
pub struct EnvUrls {
    pub database_url: Option<String>,
    pub amqp_url: Option<String>,
}

impl EnvUrls {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            amqp_url: std::env::var("AMQP_URL").ok(),
        }
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    listen_override: Option<SocketAddr>,
    role: ServiceRole,
}

impl ConfigLoader {
    pub fn new(
        config_path: impl AsRef<Path>,
        listen_override: Option<SocketAddr>,
        role: ServiceRole,
    ) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
            role,
        }
    }

    /// Read the file, apply CLI and environment overrides, validate.
    ///
    /// A missing file is not an error; every setting has a default.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let file_config = match std::fs::read_to_string(&self.config_path) {
            Ok(content) => toml::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = ?self.config_path, "Config file not found, using defaults");
                FileConfig::default()
            }
            Err(e) => return Err(e.into()),
        };
        resolve(file_config, self.role, self.listen_override, EnvUrls::from_env())
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }
}

fn resolve(
    file: FileConfig,
    role: ServiceRole,
    listen_override: Option<SocketAddr>,
    env: EnvUrls,
) -> Result<LoadedConfig, ConfigError> {
    validate(&file)?;

    let database_url = file
        .database
        .url
        .or(env.database_url)
        .ok_or(ConfigError::MissingDatabaseUrl)?;
    let amqp_url = file.bus.url.or(env.amqp_url).ok_or(ConfigError::MissingAmqpUrl)?;
    validate_amqp_url(&amqp_url)?;

    Ok(LoadedConfig {
        server: ServerConfig {
            listen: listen_override.unwrap_or(file.server.listen),
            request_timeout: file
                .server
                .request_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| role.default_request_timeout()),
        },
        database: DatabaseConfig {
            url: database_url,
            max_connections: file.database.max_connections,
        },
        bus: AmqpConfig {
            url: amqp_url,
            exchange: file.bus.exchange,
            publish_timeout: Duration::from_millis(file.bus.publish_timeout_ms),
            prefetch: file.bus.prefetch,
        },
        relay: RelayConfig {
            interval: Duration::from_millis(file.relay.interval_ms),
            batch_limit: file.relay.batch_limit,
        },
        projector: ProjectorConfig {
            upsert_timeout: Duration::from_millis(file.projector.upsert_timeout_ms),
        },
    })
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let positive = [
        ("server.request_timeout_ms", config.server.request_timeout_ms.unwrap_or(1)),
        ("bus.publish_timeout_ms", config.bus.publish_timeout_ms),
        ("relay.interval_ms", config.relay.interval_ms),
        ("projector.upsert_timeout_ms", config.projector.upsert_timeout_ms),
    ];
    for (name, value) in positive {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!("{name} must be positive")));
        }
    }
    if config.relay.batch_limit == 0 {
        return Err(ConfigError::ValidationError(
            "relay.batch_limit must be positive".to_string(),
        ));
    }
    if config.database.max_connections == 0 {
        return Err(ConfigError::ValidationError(
            "database.max_connections must be positive".to_string(),
        ));
    }
    if config.bus.exchange.is_empty() {
        return Err(ConfigError::ValidationError(
            "bus.exchange must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_amqp_url(raw: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| ConfigError::ValidationError(format!("invalid bus url: {e}")))?;
    match parsed.scheme() {
        "amqp" | "amqps" => Ok(()),
        other => Err(ConfigError::ValidationError(format!(
            "bus url scheme must be amqp or amqps, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> EnvUrls {
        EnvUrls {
            database_url: Some("postgres://localhost/ecom".to_string()),
            amqp_url: Some("amqp://localhost:5672".to_string()),
        }
    }

    #[test]
    fn test_role_default_request_timeouts() {
        let catalog = resolve(FileConfig::default(), ServiceRole::Catalog, None, env()).unwrap();
        let orders = resolve(FileConfig::default(), ServiceRole::Orders, None, env()).unwrap();
        assert_eq!(catalog.server.request_timeout, Duration::from_secs(2));
        assert_eq!(orders.server.request_timeout, Duration::from_secs(3));
        assert_eq!(orders.relay, RelayConfig::default());
    }

    #[test]
    fn test_file_urls_override_env_and_listen_override_wins() {
        let mut file = FileConfig::default();
        file.database.url = Some("postgres://file/ecom".to_string());
        let listen: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        let loaded = resolve(file, ServiceRole::Catalog, Some(listen), env()).unwrap();
        assert_eq!(loaded.database.url, "postgres://file/ecom");
        assert_eq!(loaded.bus.url, "amqp://localhost:5672");
        assert_eq!(loaded.server.listen, listen);
    }

    #[test]
    fn test_missing_urls_are_errors() {
        let err = resolve(
            FileConfig::default(),
            ServiceRole::Catalog,
            None,
            EnvUrls::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingDatabaseUrl));

        let err = resolve(
            FileConfig::default(),
            ServiceRole::Catalog,
            None,
            EnvUrls {
                amqp_url: None,
                ..env()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingAmqpUrl));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut file = FileConfig::default();
        file.relay.batch_limit = 0;
        assert!(matches!(
            resolve(file, ServiceRole::Catalog, None, env()),
            Err(ConfigError::ValidationError(_))
        ));

        let mut file = FileConfig::default();
        file.relay.interval_ms = 0;
        assert!(resolve(file, ServiceRole::Catalog, None, env()).is_err());

        let mut file = FileConfig::default();
        file.bus.url = Some("http://localhost:5672".to_string());
        assert!(resolve(file, ServiceRole::Catalog, None, env()).is_err());
    }
}
