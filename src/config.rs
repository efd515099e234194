//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Deadline for a single transfer attempt
    pub transfer_timeout: Duration,

    /// Retries after a database lock conflict
    pub transfer_max_retries: u32,

    /// `LOG_FORMAT`, defaulting to JSON when `ENVIRONMENT=production`
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let transfer_timeout_ms: u64 = env::var("TRANSFER_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("TRANSFER_TIMEOUT_MS"))?;
        if transfer_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue("TRANSFER_TIMEOUT_MS"));
        }

        let transfer_max_retries = env::var("TRANSFER_MAX_RETRIES")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("TRANSFER_MAX_RETRIES"))?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let log_format = resolve_log_format(env::var("LOG_FORMAT").ok().as_deref(), &environment)?;

        Ok(Self {
            database_url,
            database_max_connections,
            transfer_timeout: Duration::from_millis(transfer_timeout_ms),
            transfer_max_retries,
            log_format,
        })
    }
}

/// Explicit `LOG_FORMAT` wins; otherwise production logs JSON
fn resolve_log_format(value: Option<&str>, environment: &str) -> Result<LogFormat, ConfigError> {
    match value {
        Some("json") => Ok(LogFormat::Json),
        Some("pretty") => Ok(LogFormat::Pretty),
        Some(_) => Err(ConfigError::InvalidValue("LOG_FORMAT")),
        None if environment == "production" => Ok(LogFormat::Json),
        None => Ok(LogFormat::Pretty),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
