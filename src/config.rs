//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use crate::payments::types::ProviderName;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for a callback token's lifetime.
pub const MAX_CALLBACK_TTL_SECS: u64 = 3600;
/// Retries for idempotent gateway calls; backoff doubles per attempt.
pub const MAX_GATEWAY_RETRIES: u32 = 5;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: Option<DatabaseConfig>,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
    pub callback: CallbackConfig,
    pub gateway: GatewayConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_url: String,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// 3-D callback tokens
#[derive(Debug, Clone)]
pub struct CallbackConfig {
    /// Externally reachable base URL the bank redirects the browser to.
    pub public_base_url: String,
    pub ttl_secs: u64,
    /// How long an expired token keeps answering "expired" before it is purged.
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
}

/// Outbound gateway calls and enabled providers
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub enabled_providers: Vec<ProviderName>,
    pub default_provider: ProviderName,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env_optional()?,
            cache: CacheConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            callback: CallbackConfig::from_env()?,
            gateway: GatewayConfig::from_env()?,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if let Some(database) = &self.database {
            database.validate()?;
        }
        self.cache.validate()?;
        self.logging.validate()?;
        self.callback.validate()?;
        self.gateway.validate()?;

        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("SERVER_PORT", "8000")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?,
            max_connections: parse_var("DB_MAX_CONNECTIONS", "20")?,
            min_connections: parse_var("DB_MIN_CONNECTIONS", "5")?,
            connection_timeout: parse_var("DB_CONNECTION_TIMEOUT", "30")?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
        })
    }

    /// `None` when `DATABASE_URL` is unset; the audit log then stays in memory.
    pub fn from_env_optional() -> Result<Option<Self>, ConfigError> {
        if env::var("DATABASE_URL").is_err() {
            return Ok(None);
        }
        Self::from_env().map(Some)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::InvalidValue("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl CacheConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(CacheConfig {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            max_connections: parse_var("CACHE_MAX_CONNECTIONS", "10")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis_url.is_empty() {
            return Err(ConfigError::InvalidValue("REDIS_URL".to_string()));
        }

        if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://") {
            return Err(ConfigError::InvalidValue(
                "REDIS_URL must start with redis:// or rediss://".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            format: LogFormat::Plain,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            public_base_url: "http://127.0.0.1:8000".to_string(),
            ttl_secs: 900,
            retention_secs: 3600,
            sweep_interval_secs: 60,
        }
    }
}

impl CallbackConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(CallbackConfig {
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8000".to_string())
                .trim_end_matches('/')
                .to_string(),
            ttl_secs: parse_var("CALLBACK_TTL_SECS", "900")?,
            retention_secs: parse_var("CALLBACK_RETENTION_SECS", "3600")?,
            sweep_interval_secs: parse_var("CALLBACK_SWEEP_INTERVAL_SECS", "60")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl_secs == 0 || self.ttl_secs > MAX_CALLBACK_TTL_SECS {
            return Err(ConfigError::ValidationFailed(format!(
                "CALLBACK_TTL_SECS must be between 1 and {}",
                MAX_CALLBACK_TTL_SECS
            )));
        }

        if !self.public_base_url.starts_with("http://")
            && !self.public_base_url.starts_with("https://")
        {
            return Err(ConfigError::InvalidValue(
                "PUBLIC_BASE_URL must be a valid URL".to_string(),
            ));
        }

        if self.public_base_url.ends_with('/') {
            return Err(ConfigError::InvalidValue(
                "PUBLIC_BASE_URL must not end with '/'".to_string(),
            ));
        }

        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "CALLBACK_SWEEP_INTERVAL_SECS".to_string(),
            ));
        }

        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 2,
            enabled_providers: ProviderName::all().to_vec(),
            default_provider: ProviderName::Estpos,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let enabled_raw = env::var("ENABLED_PAYMENT_PROVIDERS")
            .unwrap_or_else(|_| "estpos,paylink,turkpay".to_string());
        let mut enabled_providers = Vec::new();
        for part in enabled_raw.split(',') {
            let value = part.trim();
            if value.is_empty() {
                continue;
            }
            enabled_providers.push(ProviderName::from_str(value).map_err(|_| {
                ConfigError::InvalidValue(format!("ENABLED_PAYMENT_PROVIDERS: {}", value))
            })?);
        }

        let default_raw =
            env::var("DEFAULT_PAYMENT_PROVIDER").unwrap_or_else(|_| "estpos".to_string());
        let default_provider = ProviderName::from_str(&default_raw)
            .map_err(|_| ConfigError::InvalidValue("DEFAULT_PAYMENT_PROVIDER".to_string()))?;

        Ok(GatewayConfig {
            timeout_secs: parse_var("GATEWAY_TIMEOUT_SECS", "30")?,
            max_retries: parse_var("GATEWAY_MAX_RETRIES", "2")?,
            enabled_providers,
            default_provider,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("GATEWAY_TIMEOUT_SECS".to_string()));
        }

        if self.max_retries > MAX_GATEWAY_RETRIES {
            return Err(ConfigError::ValidationFailed(format!(
                "GATEWAY_MAX_RETRIES must not exceed {}",
                MAX_GATEWAY_RETRIES
            )));
        }

        if self.enabled_providers.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "at least one payment provider must be enabled".to_string(),
            ));
        }

        if !self.enabled_providers.contains(&self.default_provider) {
            return Err(ConfigError::ValidationFailed(
                "default provider must be enabled".to_string(),
            ));
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn callback_ttl_is_bounded() {
        let mut config = CallbackConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ttl(), Duration::from_secs(900));

        config.ttl_secs = 0;
        assert!(config.validate().is_err());

        config.ttl_secs = MAX_CALLBACK_TTL_SECS + 1;
        assert!(config.validate().is_err());

        config.ttl_secs = MAX_CALLBACK_TTL_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn callback_base_url_must_be_absolute_without_trailing_slash() {
        let mut config = CallbackConfig {
            public_base_url: "shop.example".to_string(),
            ..CallbackConfig::default()
        };
        assert!(config.validate().is_err());

        config.public_base_url = "https://pay.shop.example/".to_string();
        assert!(config.validate().is_err());

        config.public_base_url = "https://pay.shop.example".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn default_provider_must_be_enabled() {
        let config = GatewayConfig {
            enabled_providers: vec![ProviderName::Paylink],
            default_provider: ProviderName::Estpos,
            ..GatewayConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(GatewayConfig::default().validate().is_ok());
    }

    #[test]
    fn gateway_retries_are_capped() {
        let mut config = GatewayConfig {
            max_retries: MAX_GATEWAY_RETRIES,
            ..GatewayConfig::default()
        };
        assert!(config.validate().is_ok());

        config.max_retries = MAX_GATEWAY_RETRIES + 1;
        assert!(config.validate().is_err());

        config.max_retries = 64;
        assert!(config.validate().is_err());
    }

    #[test]
    fn log_level_is_checked() {
        let mut config = LoggingConfig::default();
        assert!(config.validate().is_ok());
        config.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }
}
