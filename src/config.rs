//! Application configuration loaded from environment variables.

use crate::error::{AppError, Result};
use std::env;

/// Read an environment variable and parse it, falling back to a default on missing or invalid values.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Listener host
    pub host: String,

    /// Listener port
    pub port: u16,

    /// Cache directory override. Defaults to the ecosystem's directory.
    pub cache_dir: Option<String>,

    /// Upstream origin override. Defaults to the ecosystem's registry.
    pub upstream: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| AppError::Config("DATABASE_URL not set".into()))?,
            host: env::var("BIND_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_parse("BIND_PORT", 8080),
            cache_dir: env::var("CACHE_DIR").ok(),
            upstream: env::var("UPSTREAM_URL").ok(),
        })
    }

    /// The listener's `host:port` bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The address clients are steered to by metadata rewriting.
    pub fn proxy_addr(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}
