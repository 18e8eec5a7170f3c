// src/config.rs
use std::{env, fmt::Display, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown storage backend {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub env: String,
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout: Duration,
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup; `load` uses the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage: StorageBackend = try_load(&lookup, "STORAGE", "postgres")?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.is_empty());

        if storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let config = Self {
            port: try_load(&lookup, "PORT", "3030")?,
            env: try_load(&lookup, "APP_ENV", "development")?,
            storage,
            database_url,
            db_max_connections: try_load(&lookup, "DB_MAX_CONNECTIONS", "5")?,
            db_timeout: Duration::from_secs(try_load(&lookup, "DB_TIMEOUT_SECS", "3")?),
            default_page_size: try_load(&lookup, "DEFAULT_PAGE_SIZE", "20")?,
            max_page_size: try_load(&lookup, "MAX_PAGE_SIZE", "100")?,
        };

        if config.max_page_size < 1 {
            return Err(invalid("MAX_PAGE_SIZE", config.max_page_size, "must be positive"));
        }
        if !(1..=config.max_page_size).contains(&config.default_page_size) {
            return Err(invalid(
                "DEFAULT_PAGE_SIZE",
                config.default_page_size,
                "must be between 1 and MAX_PAGE_SIZE",
            ));
        }

        Ok(config)
    }
}

fn invalid(key: &'static str, value: impl Display, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn try_load<T, F>(lookup: &F, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.parse().map_err(|e: T::Err| {
        warn!("Invalid {key} value: {e}");
        invalid(key, &value, &e.to_string())
    })
}
