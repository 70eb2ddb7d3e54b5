//! Typed configuration from environment variables and TOML files.
//!
//! Loads once at startup, fails fast on values that do not parse.

pub mod map;

pub use map::{MapConfig, available_parallelism, effective_pool_size};

use crate::error::Result;

/// Process-level configuration for the `para` binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub map: MapConfig,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            map: MapConfig::from_env()?,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}
