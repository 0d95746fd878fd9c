//! Configuration for the engine TCP server.
//!
//! Defaults, overridable via environment variables:
//!
//! - `ENGINE_BIND_ADDR`          (default: "0.0.0.0")
//! - `ENGINE_PORT`               (default: "9000")
//! - `ENGINE_MAX_CLIENTS`        (default: "1024")
//! - `ENGINE_PERSIST_TIMEOUT_MS` (default: "2000")

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid value {value:?} for {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// IP address / interface to bind to (e.g. "0.0.0.0" or "127.0.0.1").
    pub bind_addr: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Maximum number of simultaneously connected clients.
    pub max_clients: usize,

    /// How long a coordinator waits for the store before rolling back.
    pub persist_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: "0.0.0.0".to_string(),
            port: 9000,
            max_clients: 1024,
            persist_timeout: Duration::from_millis(2000),
        }
    }
}

impl Config {
    /// Construct a `Config` from environment variables, falling back
    /// to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let bind_addr = lookup("ENGINE_BIND_ADDR").unwrap_or(defaults.bind_addr);
        let port = parse_or("ENGINE_PORT", &lookup, defaults.port)?;
        let max_clients = parse_or("ENGINE_MAX_CLIENTS", &lookup, defaults.max_clients)?;
        let persist_timeout_ms = parse_or(
            "ENGINE_PERSIST_TIMEOUT_MS",
            &lookup,
            defaults.persist_timeout.as_millis() as u64,
        )?;

        if persist_timeout_ms == 0 {
            return Err(ConfigError {
                key: "ENGINE_PERSIST_TIMEOUT_MS",
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        Ok(Config {
            bind_addr,
            port,
            max_clients,
            persist_timeout: Duration::from_millis(persist_timeout_ms),
        })
    }

    /// Convenience: `addr:port` socket string.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn parse_or<T>(
    key: &'static str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(value) => value.trim().parse::<T>().map_err(|e| ConfigError {
            key,
            reason: e.to_string(),
            value,
        }),
        None => Ok(default),
    }
}
