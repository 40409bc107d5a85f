use std::env;
use std::fmt::Display;
use std::str::FromStr;

use thiserror::Error;

use crate::admission::DEFAULT_CAPACITY;
use crate::tracker::DEFAULT_BATCH_SIZE;

const MAX_BATCH_SIZE: usize = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {0} is required")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres { url: String, max_connections: u32 },
    Redis { url: String },
    Memory,
}

impl StoreBackend {
    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::Postgres { .. } => "postgres",
            StoreBackend::Redis { .. } => "redis",
            StoreBackend::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub store: StoreBackend,
    pub admission_capacity: usize,
    pub stream_batch_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = match lookup("STORE_BACKEND").as_deref().unwrap_or("postgres") {
            "postgres" => StoreBackend::Postgres {
                url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            },
            "redis" => StoreBackend::Redis {
                url: lookup("REDIS_URL").ok_or(ConfigError::Missing("REDIS_URL"))?,
            },
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    key: "STORE_BACKEND",
                    value: other.to_string(),
                    reason: "expected postgres, redis or memory".into(),
                });
            }
        };

        let admission_capacity = parse_or(&lookup, "ADMISSION_CAPACITY", DEFAULT_CAPACITY)?;
        if admission_capacity == 0 {
            return Err(invalid("ADMISSION_CAPACITY", "0", "must be at least 1"));
        }

        let stream_batch_size = parse_or(&lookup, "STREAM_BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        if stream_batch_size == 0 || stream_batch_size > MAX_BATCH_SIZE {
            return Err(invalid(
                "STREAM_BATCH_SIZE",
                &stream_batch_size.to_string(),
                &format!("must be between 1 and {MAX_BATCH_SIZE}"),
            ));
        }

        let api_base_uri = lookup("API_BASE_URI").unwrap_or_else(|| "/api".into());
        if !api_base_uri.is_empty() && !api_base_uri.starts_with('/') {
            return Err(invalid("API_BASE_URI", &api_base_uri, "must start with '/'"));
        }

        Ok(Config {
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            server_port: parse_or(&lookup, "SERVER_PORT", 8980)?,
            api_base_uri,
            store,
            admission_capacity,
            stream_batch_size,
        })
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, &raw, &e.to_string())),
    }
}
